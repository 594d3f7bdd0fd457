//! Static configuration loaded once at startup
//!
//! This configuration is read-only after the daemon starts.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{CardFrameError, Result};
use crate::port_spec::{PortSpecOverride, SerialPortSpec};
use crate::types::{DeviceAddress, DEFAULT_CARD_ADDRESS, DEFAULT_CHASSIS_ADDRESS};

/// Serial link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Write timeout in milliseconds
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    /// Poll open transports for link loss
    #[serde(default = "default_true")]
    pub enable_heartbeat: bool,
    /// Heartbeat interval in seconds
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    /// Log every transmitted payload
    #[serde(default)]
    pub debug_uart: bool,
}

fn default_write_timeout_ms() -> u64 {
    1000
}

fn default_heartbeat_interval_secs() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

impl LinkConfig {
    /// Timings must be non-zero; the interval only matters with the heartbeat on
    pub fn validate(&self) -> Result<()> {
        if self.write_timeout_ms == 0 {
            return Err(CardFrameError::Config(
                "link.write_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.enable_heartbeat && self.heartbeat_interval_secs == 0 {
            return Err(CardFrameError::Config(
                "link.heartbeat_interval_secs must be greater than 0 when the heartbeat is enabled"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            write_timeout_ms: default_write_timeout_ms(),
            enable_heartbeat: true,
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            debug_uart: false,
        }
    }
}

/// Operator console configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Prompt printed before each command
    #[serde(default = "default_prompt")]
    pub prompt: String,
    /// Chassis addressed when a command has no `-i:` flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_chassis: Option<DeviceAddress>,
}

fn default_prompt() -> String {
    "cardframe> ".to_string()
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            prompt: default_prompt(),
            default_chassis: None,
        }
    }
}

/// One serial port on a card
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortConfig {
    /// Host device node backing this port (e.g. `/dev/ttyUSB0`)
    pub device: String,
    /// Fields that differ from the card's `default_port`
    #[serde(flatten)]
    pub overrides: PortSpecOverride,
}

impl PortConfig {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            overrides: PortSpecOverride::default(),
        }
    }
}

/// Expansion card seated in a chassis slot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardConfig {
    /// Physical slot number, unique per chassis
    pub slot: u8,
    pub address: DeviceAddress,
    #[serde(default = "default_card_model")]
    pub model: String,
    /// Spec applied to every port unless overridden
    #[serde(default)]
    pub default_port: SerialPortSpec,
    /// Ports in discovery order; index 1 is the first entry
    pub ports: Vec<PortConfig>,
}

fn default_card_model() -> String {
    "C3COM-3".to_string()
}

impl CardConfig {
    /// Effective spec of every port, in port-index order
    pub fn port_specs(&self) -> Vec<SerialPortSpec> {
        self.ports
            .iter()
            .map(|port| port.overrides.apply(&self.default_port))
            .collect()
    }
}

/// Card-frame chassis and the cards it hosts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChassisConfig {
    pub address: DeviceAddress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub cards: Vec<CardConfig>,
}

/// Static configuration for the card-frame daemon.
///
/// This is loaded once at startup and remains immutable during runtime.
/// Located at `~/.config/cardframe/config.toml` by default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticConfig {
    #[serde(default)]
    pub link: LinkConfig,

    #[serde(default)]
    pub console: ConsoleConfig,

    /// Device hierarchy brought up at startup
    #[serde(default)]
    pub chassis: Vec<ChassisConfig>,
}

impl Default for StaticConfig {
    /// One chassis at 0x03 with a three-port card in slot 1
    fn default() -> Self {
        let chassis = DEFAULT_CHASSIS_ADDRESS;
        let card = DEFAULT_CARD_ADDRESS;

        Self {
            link: LinkConfig::default(),
            console: ConsoleConfig {
                default_chassis: Some(chassis),
                ..Default::default()
            },
            chassis: vec![ChassisConfig {
                address: chassis,
                description: Some("Card frame".to_string()),
                cards: vec![CardConfig {
                    slot: 1,
                    address: card,
                    model: default_card_model(),
                    default_port: SerialPortSpec::default(),
                    ports: (0..3)
                        .map(|n| PortConfig::new(format!("/dev/ttyUSB{}", n)))
                        .collect(),
                }],
            }],
        }
    }
}

impl StaticConfig {
    /// Parse StaticConfig from TOML string.
    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Serialize StaticConfig to TOML string.
    pub fn to_toml(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Parse and validate in one step
    pub fn parse(content: &str) -> Result<Self> {
        let config = Self::from_toml(content)
            .map_err(|e| CardFrameError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check link timings, address and slot uniqueness, and every port spec
    pub fn validate(&self) -> Result<()> {
        self.link.validate()?;

        let mut addresses = HashSet::new();

        for chassis in &self.chassis {
            if !addresses.insert(chassis.address) {
                return Err(CardFrameError::Config(format!(
                    "Duplicate chassis address {}",
                    chassis.address
                )));
            }

            let mut slots = HashSet::new();
            let mut card_addresses = HashSet::new();
            for card in &chassis.cards {
                if !slots.insert(card.slot) {
                    return Err(CardFrameError::Config(format!(
                        "Chassis {}: slot {} is assigned twice",
                        chassis.address, card.slot
                    )));
                }
                if !card_addresses.insert(card.address) {
                    return Err(CardFrameError::Config(format!(
                        "Chassis {} slot {}: card address {} is already in use",
                        chassis.address, card.slot, card.address
                    )));
                }

                if card.ports.is_empty() {
                    return Err(CardFrameError::Config(format!(
                        "Chassis {} slot {}: card '{}' has no ports",
                        chassis.address, card.slot, card.model
                    )));
                }

                for (idx, spec) in card.port_specs().iter().enumerate() {
                    spec.validate().map_err(|e| {
                        CardFrameError::Config(format!(
                            "Chassis {} slot {} port {}: {}",
                            chassis.address,
                            card.slot,
                            idx + 1,
                            e
                        ))
                    })?;
                }
            }
        }

        if let Some(default) = self.console.default_chassis {
            if !addresses.contains(&default) {
                return Err(CardFrameError::Config(format!(
                    "Default chassis {} is not configured",
                    default
                )));
            }
        }

        Ok(())
    }
}
