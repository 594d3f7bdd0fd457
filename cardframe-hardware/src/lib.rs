//! cardframe-hardware
//!
//! Device hierarchy and serial transport for card-frame hardware. A
//! [`Registry`] owns chassis, chassis own expansion cards by slot, and cards
//! own their serial ports by 1-based index.
//
//! Public API:
//! - `registry::Registry` - chassis lookup, connectivity routing, port dispatch
//! - `chassis::Chassis`, `card::ExpansionCard`, `serial_port::SerialPort`
//! - `host::RegistrationHost` - registration handshake, with `SystemHost` and `MockHost`
//! - `serial_driver::SerialDriver` - tokio-serial backed transport

pub mod card;
pub mod chassis;
pub mod device;
pub mod host;
pub mod mock;
pub mod registry;
pub mod serial_driver;
pub mod serial_port;

pub use card::ExpansionCard;
pub use chassis::Chassis;
pub use device::{ConnectivityCallback, ConnectivityObservers, DeviceHandle, SubscriptionHandle};
pub use host::{RegistrationHost, SystemHost};
pub use mock::{MockHost, MockLink, MockTransport};
pub use registry::{DeviceStatus, Registry};
pub use serial_driver::{SerialDriver, SerialTransport};
pub use serial_port::SerialPort;
