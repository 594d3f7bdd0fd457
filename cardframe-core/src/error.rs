//! Error types for the card-frame system

use thiserror::Error;

use crate::types::ConnectivityState;

/// Broad failure categories used when reporting to the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad port spec, double configure, register before configure
    Configuration,
    /// A device or sub-device failed to register
    Registration,
    /// Unknown or absent device, out-of-range port index
    AddressResolution,
    /// Malformed command token or missing flag value
    Parse,
    /// Send refused by the port or by the physical link
    Transport,
}

impl ErrorKind {
    /// Get a string representation for log output
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Registration => "registration",
            ErrorKind::AddressResolution => "address-resolution",
            ErrorKind::Parse => "parse",
            ErrorKind::Transport => "transport",
        }
    }
}

/// Core error type for card-frame operations
#[derive(Error, Debug)]
pub enum CardFrameError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serial port specification rejected by validation
    #[error("Invalid port specification: {0}")]
    InvalidSpec(String),

    /// Port configured a second time
    #[error("{0} is already configured")]
    AlreadyConfigured(String),

    /// Port registered before it was configured
    #[error("{0} must be configured before registration")]
    NotConfigured(String),

    /// Connectivity state machine refused a transition
    #[error("{device}: invalid state transition {from} -> {to}")]
    InvalidTransition {
        device: String,
        from: ConnectivityState,
        to: ConnectivityState,
    },

    /// Registration handshake failed
    #[error("Registration of {device} failed: {reason}")]
    Registration { device: String, reason: String },

    /// A device with the same address already exists in this scope
    #[error("Device already exists: {0}")]
    AlreadyExists(String),

    /// Child created against a parent that is not online
    #[error("{device} cannot be created: parent is {state}")]
    InvalidParentState {
        device: String,
        state: ConnectivityState,
    },

    /// Address outside [1, 255]
    #[error("Invalid device address: {0} (must be 1-255)")]
    InvalidAddress(u32),

    /// No device known at this address
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Device exists but its registration failed
    #[error("Device not present: {0}")]
    DeviceAbsent(String),

    /// Port index unset, zero, or past the last port
    #[error("Port index out of range: {index} (card has {port_count} ports)")]
    PortIndexOutOfRange { index: u32, port_count: usize },

    /// Command parsing errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Send attempted against a port that never registered
    #[error("Port not registered: {0}")]
    PortNotRegistered(String),

    /// Send attempted against an offline port
    #[error("Port offline: {0}")]
    PortOffline(String),

    /// Serial transport errors
    #[error("Transport error: {0}")]
    Transport(String),

    /// Transport write did not complete in time
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Link dropped underneath an open transport
    #[error("Device disconnected: {0}")]
    DeviceDisconnected(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CardFrameError {
    /// Classify this error into its operator-facing category
    pub fn kind(&self) -> ErrorKind {
        match self {
            CardFrameError::Config(_)
            | CardFrameError::InvalidSpec(_)
            | CardFrameError::AlreadyConfigured(_)
            | CardFrameError::NotConfigured(_)
            | CardFrameError::InvalidTransition { .. } => ErrorKind::Configuration,
            CardFrameError::Registration { .. } | CardFrameError::AlreadyExists(_) => {
                ErrorKind::Registration
            }
            CardFrameError::InvalidParentState { .. }
            | CardFrameError::InvalidAddress(_)
            | CardFrameError::DeviceNotFound(_)
            | CardFrameError::DeviceAbsent(_)
            | CardFrameError::PortIndexOutOfRange { .. } => ErrorKind::AddressResolution,
            CardFrameError::Parse(_) => ErrorKind::Parse,
            CardFrameError::PortNotRegistered(_)
            | CardFrameError::PortOffline(_)
            | CardFrameError::Transport(_)
            | CardFrameError::Timeout(_)
            | CardFrameError::DeviceDisconnected(_)
            | CardFrameError::Io(_) => ErrorKind::Transport,
        }
    }
}

/// Result type alias for card-frame operations
pub type Result<T> = std::result::Result<T, CardFrameError>;
