//! CardFrame Core Library
//!
//! Shared types, command grammar, and configuration for the card-frame
//! serial dispatch project. This crate performs no I/O and is used by both
//! the hardware crate and the daemon.

pub mod command;
pub mod config;
pub mod error;
pub mod port_spec;
pub mod types;

// Re-export commonly used types
pub use command::{attempted_port_index, parse_command, ParsedCommand, SendRequest};
pub use config::{
    default_config_path, CardConfig, ChassisConfig, ConsoleConfig, LinkConfig, PortConfig,
    StaticConfig,
};
pub use error::*;
pub use port_spec::*;
pub use types::*;
