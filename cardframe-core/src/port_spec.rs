//! Static serial line configuration
//!
//! A [`SerialPortSpec`] is applied to a port exactly once, before the port
//! registers, and never changes afterwards. Cards carry a default spec and
//! individual ports may override any subset of its fields through a
//! [`PortSpecOverride`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CardFrameError, Result};

/// Baud rates accepted by the card's UARTs
pub const STANDARD_BAUD_RATES: [u32; 10] = [
    300, 600, 1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200,
];

/// Number of data bits per character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DataBits {
    #[serde(rename = "7")]
    Seven,
    #[default]
    #[serde(rename = "8")]
    Eight,
}

/// Parity checking mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

impl Parity {
    pub fn label(&self) -> &'static str {
        match self {
            Parity::None => "N",
            Parity::Odd => "O",
            Parity::Even => "E",
        }
    }
}

/// Number of stop bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StopBits {
    #[default]
    #[serde(rename = "1")]
    One,
    #[serde(rename = "2")]
    Two,
}

/// Electrical signalling of the line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Rs232,
    Rs422,
    Rs485,
}

impl Protocol {
    pub fn label(&self) -> &'static str {
        match self {
            Protocol::Rs232 => "RS-232",
            Protocol::Rs422 => "RS-422",
            Protocol::Rs485 => "RS-485",
        }
    }
}

/// Hardware (modem control line) handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HardwareHandshake {
    #[default]
    None,
    Rts,
    Cts,
    RtsCts,
}

/// Software (XON/XOFF) handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SoftwareHandshake {
    #[default]
    None,
    Xon,
    XonTransmit,
    XonReceive,
}

/// Complete static configuration of one serial line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialPortSpec {
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default)]
    pub data_bits: DataBits,
    #[serde(default)]
    pub parity: Parity,
    #[serde(default)]
    pub stop_bits: StopBits,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default)]
    pub hardware_handshake: HardwareHandshake,
    #[serde(default)]
    pub software_handshake: SoftwareHandshake,
}

fn default_baud_rate() -> u32 {
    9600
}

impl Default for SerialPortSpec {
    /// 9600 8N1, RS-232, no handshake
    fn default() -> Self {
        Self {
            baud_rate: default_baud_rate(),
            data_bits: DataBits::default(),
            parity: Parity::default(),
            stop_bits: StopBits::default(),
            protocol: Protocol::default(),
            hardware_handshake: HardwareHandshake::default(),
            software_handshake: SoftwareHandshake::default(),
        }
    }
}

impl SerialPortSpec {
    /// Check the spec against what the card's UARTs can actually do
    pub fn validate(&self) -> Result<()> {
        if !STANDARD_BAUD_RATES.contains(&self.baud_rate) {
            return Err(CardFrameError::InvalidSpec(format!(
                "Unsupported baud rate {}. Valid rates: {:?}",
                self.baud_rate, STANDARD_BAUD_RATES
            )));
        }

        if self.hardware_handshake != HardwareHandshake::None
            && self.software_handshake != SoftwareHandshake::None
        {
            return Err(CardFrameError::InvalidSpec(
                "Hardware and software handshake are mutually exclusive".to_string(),
            ));
        }

        // RS-485 is half duplex; there is no CTS line to honour
        if self.protocol == Protocol::Rs485
            && matches!(
                self.hardware_handshake,
                HardwareHandshake::Cts | HardwareHandshake::RtsCts
            )
        {
            return Err(CardFrameError::InvalidSpec(
                "RS-485 does not support CTS handshake".to_string(),
            ));
        }

        Ok(())
    }
}

impl fmt::Display for SerialPortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data_bits = match self.data_bits {
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        };
        let stop_bits = match self.stop_bits {
            StopBits::One => 1,
            StopBits::Two => 2,
        };
        write!(
            f,
            "{} {}{}{} {}",
            self.baud_rate,
            data_bits,
            self.parity.label(),
            stop_bits,
            self.protocol.label()
        )
    }
}

/// Per-port overrides applied on top of a card's default spec
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpecOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baud_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_bits: Option<DataBits>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parity: Option<Parity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_bits: Option<StopBits>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware_handshake: Option<HardwareHandshake>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub software_handshake: Option<SoftwareHandshake>,
}

impl PortSpecOverride {
    /// Resolve the effective spec for a port
    pub fn apply(&self, base: &SerialPortSpec) -> SerialPortSpec {
        SerialPortSpec {
            baud_rate: self.baud_rate.unwrap_or(base.baud_rate),
            data_bits: self.data_bits.unwrap_or(base.data_bits),
            parity: self.parity.unwrap_or(base.parity),
            stop_bits: self.stop_bits.unwrap_or(base.stop_bits),
            protocol: self.protocol.unwrap_or(base.protocol),
            hardware_handshake: self.hardware_handshake.unwrap_or(base.hardware_handshake),
            software_handshake: self.software_handshake.unwrap_or(base.software_handshake),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_spec() {
        let spec = SerialPortSpec::default();
        assert_eq!(spec.baud_rate, 9600);
        assert_eq!(spec.parity, Parity::None);
        assert_eq!(spec.to_string(), "9600 8N1 RS-232");
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_unsupported_baud_rate() {
        let spec = SerialPortSpec {
            baud_rate: 12345,
            ..Default::default()
        };
        assert!(matches!(
            spec.validate(),
            Err(CardFrameError::InvalidSpec(_))
        ));
    }

    #[test]
    fn test_handshakes_mutually_exclusive() {
        let spec = SerialPortSpec {
            hardware_handshake: HardwareHandshake::RtsCts,
            software_handshake: SoftwareHandshake::Xon,
            ..Default::default()
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_rs485_rejects_cts() {
        let spec = SerialPortSpec {
            protocol: Protocol::Rs485,
            hardware_handshake: HardwareHandshake::Cts,
            ..Default::default()
        };
        assert!(spec.validate().is_err());

        let spec = SerialPortSpec {
            protocol: Protocol::Rs485,
            hardware_handshake: HardwareHandshake::Rts,
            ..Default::default()
        };
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_override_only_touches_set_fields() {
        let base = SerialPortSpec::default();
        let overrides = PortSpecOverride {
            baud_rate: Some(115200),
            parity: Some(Parity::Even),
            ..Default::default()
        };

        let spec = overrides.apply(&base);
        assert_eq!(spec.baud_rate, 115200);
        assert_eq!(spec.parity, Parity::Even);
        assert_eq!(spec.stop_bits, base.stop_bits);
        assert_eq!(spec.protocol, base.protocol);
        assert_eq!(spec.to_string(), "115200 8E1 RS-232");
    }

    #[test]
    fn test_empty_override_is_identity() {
        let base = SerialPortSpec {
            baud_rate: 19200,
            stop_bits: StopBits::Two,
            ..Default::default()
        };
        assert_eq!(PortSpecOverride::default().apply(&base), base);
    }
}
