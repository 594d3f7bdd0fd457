//! cardframed
//!
//! Brings up the configured card-frame hierarchy at startup and serves the
//! operator console that routes payloads to serial ports.

pub mod config;
pub mod console;
pub mod dispatcher;
pub mod lifecycle;
pub mod link_monitor;
pub mod registration;

pub use config::RuntimeConfig;
pub use console::{Console, ConsoleAction};
pub use dispatcher::{DispatchOutcome, PortDispatcher};
pub use lifecycle::{DaemonLifecycle, LifecycleHandler, ProcessEvent};
pub use link_monitor::{LinkEvent, LinkMonitor};
pub use registration::{DeviceRegistrationFacade, StartupReport};
