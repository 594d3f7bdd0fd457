//! Device identity and connectivity types
//!
//! Every device in the hierarchy is identified by a [`DeviceId`] that walks
//! from the owning chassis down to the card slot and port index. Addresses
//! are unique within their registration scope only, so a bare address is
//! never enough to name a card or a port.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CardFrameError, Result};

/// Numeric device address, valid range [1, 255]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct DeviceAddress(u8);

/// Chassis address used by the default configuration
pub const DEFAULT_CHASSIS_ADDRESS: DeviceAddress = DeviceAddress(0x03);

/// Card address used by the default configuration
pub const DEFAULT_CARD_ADDRESS: DeviceAddress = DeviceAddress(0x10);

impl DeviceAddress {
    /// Create an address, rejecting 0 and anything above 255
    pub fn new(value: u32) -> Result<Self> {
        match u8::try_from(value) {
            Ok(v) if v != 0 => Ok(Self(v)),
            _ => Err(CardFrameError::InvalidAddress(value)),
        }
    }

    /// Get the raw address value
    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u32> for DeviceAddress {
    type Error = CardFrameError;

    fn try_from(value: u32) -> Result<Self> {
        Self::new(value)
    }
}

impl From<DeviceAddress> for u32 {
    fn from(address: DeviceAddress) -> Self {
        address.0 as u32
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

impl FromStr for DeviceAddress {
    type Err = CardFrameError;

    /// Parse a decimal (`3`) or hex (`0x03`) address
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let value = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u32::from_str_radix(hex, 16),
            None => s.parse::<u32>(),
        }
        .map_err(|e| CardFrameError::Parse(format!("Invalid address '{}': {}", s, e)))?;
        Self::new(value)
    }
}

/// Hierarchical identity of a chassis, card, or port
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeviceId {
    /// Top-level enclosure
    Chassis(DeviceAddress),
    /// Card seated in a chassis slot
    Card { chassis: DeviceAddress, slot: u8 },
    /// 1-based serial port on a card
    Port {
        chassis: DeviceAddress,
        slot: u8,
        index: u32,
    },
}

impl DeviceId {
    /// Address of the chassis this device lives in
    pub fn chassis(&self) -> DeviceAddress {
        match *self {
            DeviceId::Chassis(chassis)
            | DeviceId::Card { chassis, .. }
            | DeviceId::Port { chassis, .. } => chassis,
        }
    }

    /// Id of the card at `slot` in this chassis
    pub fn card(chassis: DeviceAddress, slot: u8) -> Self {
        DeviceId::Card { chassis, slot }
    }

    /// Id of port `index` on the card at `slot`
    pub fn port(chassis: DeviceAddress, slot: u8, index: u32) -> Self {
        DeviceId::Port {
            chassis,
            slot,
            index,
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceId::Chassis(chassis) => write!(f, "chassis {}", chassis),
            DeviceId::Card { chassis, slot } => write!(f, "chassis {}/slot {}", chassis, slot),
            DeviceId::Port {
                chassis,
                slot,
                index,
            } => write!(f, "chassis {}/slot {}/port {}", chassis, slot, index),
        }
    }
}

impl FromStr for DeviceId {
    type Err = CardFrameError;

    /// Parse `chassis`, `chassis/slot`, or `chassis/slot/port`
    ///
    /// # Examples
    ///
    /// ```
    /// use cardframe_core::{DeviceAddress, DeviceId};
    ///
    /// let id: DeviceId = "0x03/1/2".parse().unwrap();
    /// assert_eq!(id, DeviceId::port(DeviceAddress::new(3).unwrap(), 1, 2));
    /// ```
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('/').collect();
        let parse_num = |part: &str, what: &str| {
            part.trim()
                .parse::<u32>()
                .map_err(|e| CardFrameError::Parse(format!("Invalid {} '{}': {}", what, part, e)))
        };
        let parse_slot = |part: &str| {
            let slot = parse_num(part, "slot")?;
            u8::try_from(slot)
                .map_err(|_| CardFrameError::Parse(format!("Slot out of range: {}", slot)))
        };

        match parts.as_slice() {
            [chassis] => Ok(DeviceId::Chassis(chassis.parse()?)),
            [chassis, slot] => Ok(DeviceId::card(chassis.parse()?, parse_slot(slot)?)),
            [chassis, slot, index] => Ok(DeviceId::port(
                chassis.parse()?,
                parse_slot(slot)?,
                parse_num(index, "port index")?,
            )),
            _ => Err(CardFrameError::Parse(format!(
                "Invalid device id '{}'. Expected chassis[/slot[/port]]",
                s
            ))),
        }
    }
}

/// Connectivity state machine
///
/// Unknown → Registering → {Online | Offline | RegistrationFailed}, then
/// Online ⇄ Offline. RegistrationFailed is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectivityState {
    Unknown,
    Registering,
    Online,
    Offline,
    RegistrationFailed,
}

impl ConnectivityState {
    /// Get a string representation for console output
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectivityState::Unknown => "unknown",
            ConnectivityState::Registering => "registering",
            ConnectivityState::Online => "online",
            ConnectivityState::Offline => "offline",
            ConnectivityState::RegistrationFailed => "registration-failed",
        }
    }

    /// Whether the state machine permits moving from `self` to `next`
    ///
    /// Repeating Online or Offline is allowed so that every link event
    /// lands regardless of the previous reading.
    pub fn can_transition_to(self, next: ConnectivityState) -> bool {
        use ConnectivityState::*;
        matches!(
            (self, next),
            (Unknown, Registering)
                | (Registering, Online)
                | (Registering, Offline)
                | (Registering, RegistrationFailed)
                | (Online, Online)
                | (Online, Offline)
                | (Offline, Online)
                | (Offline, Offline)
        )
    }

    /// Registration completed (the device is either online or offline)
    pub fn is_registered(self) -> bool {
        matches!(self, ConnectivityState::Online | ConnectivityState::Offline)
    }

    /// Device is online
    pub fn is_online(self) -> bool {
        self == ConnectivityState::Online
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
