//! Configuration types for the card-frame daemon
//!
//! [`StaticConfig`] describes the link settings, the operator console, and
//! the device hierarchy to bring up at startup. It is read once and never
//! modified while the daemon runs.

mod paths;
mod static_config;

pub use paths::default_config_path;
pub use static_config::{
    CardConfig, ChassisConfig, ConsoleConfig, LinkConfig, PortConfig, StaticConfig,
};
