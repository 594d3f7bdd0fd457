//! Serial driver for low-level hardware communication
//!
//! Provides async, fire-and-forget writes to one serial line of a card.

use async_trait::async_trait;
use cardframe_core::{
    CardFrameError, DataBits, HardwareHandshake, Parity, Result, SerialPortSpec,
    SoftwareHandshake, StopBits,
};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, error, warn};

/// Trait for serial transport abstraction
///
/// This trait enables testing of the device hierarchy without real hardware
/// by allowing mock implementations.
#[async_trait]
pub trait SerialTransport: Send {
    /// Write a payload; returns once the transport accepted it
    async fn write_payload(&mut self, payload: &[u8]) -> Result<()>;

    /// Check if the underlying link is still up
    fn is_connected(&self) -> bool;

    /// Get the device path, if the transport has one
    fn port_path(&self) -> Option<&str>;
}

/// Serial driver backed by a host serial device
pub struct SerialDriver {
    port: SerialStream,
    port_path: String,
    timeout_duration: Duration,
    debug_uart: bool,
    link_lost: bool,
}

impl SerialDriver {
    /// Open a serial device with the given line configuration
    ///
    /// # Arguments
    /// * `port_path` - Path to the serial device (e.g., "/dev/ttyUSB0")
    /// * `spec` - Static line configuration
    /// * `timeout_ms` - Timeout in milliseconds for write operations
    /// * `debug_uart` - Log every transmitted payload
    pub fn open(
        port_path: &str,
        spec: &SerialPortSpec,
        timeout_ms: u64,
        debug_uart: bool,
    ) -> Result<Self> {
        debug!("Opening serial port: {} ({})", port_path, spec);

        // The electrical layer (RS-232/422/485) is set by the card, not the UART
        let port = tokio_serial::new(port_path, spec.baud_rate)
            .timeout(Duration::from_millis(timeout_ms))
            .data_bits(data_bits(spec.data_bits))
            .parity(parity(spec.parity))
            .stop_bits(stop_bits(spec.stop_bits))
            .flow_control(flow_control(spec))
            .open_native_async()
            .map_err(|e| {
                error!("Failed to open serial port {}: {}", port_path, e);
                CardFrameError::Transport(format!("Failed to open serial port: {}", e))
            })?;

        debug!("Serial port {} opened successfully", port_path);

        Ok(Self {
            port,
            port_path: port_path.to_string(),
            timeout_duration: Duration::from_millis(timeout_ms),
            debug_uart,
            link_lost: false,
        })
    }

    async fn write_all(&mut self, payload: &[u8]) -> Result<()> {
        if self.debug_uart {
            debug!("TX {}: {:?}", self.port_path, String::from_utf8_lossy(payload));
        }

        timeout(self.timeout_duration, self.port.write_all(payload))
            .await
            .map_err(|_| {
                error!("Write timeout on {}", self.port_path);
                CardFrameError::Timeout("Write operation timed out".to_string())
            })?
            .map_err(|e| {
                error!("Write failed on {}: {}", self.port_path, e);
                CardFrameError::Transport(format!("Write failed: {}", e))
            })?;

        // Flush to ensure data is sent
        timeout(self.timeout_duration, self.port.flush())
            .await
            .map_err(|_| CardFrameError::Timeout("Flush operation timed out".to_string()))?
            .map_err(|e| CardFrameError::Transport(format!("Flush failed: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl SerialTransport for SerialDriver {
    async fn write_payload(&mut self, payload: &[u8]) -> Result<()> {
        let result = self.write_all(payload).await;
        if let Err(ref e) = result {
            if is_disconnect_error(e) {
                warn!("Serial link {} lost: {}", self.port_path, e);
                self.link_lost = true;
            }
        }
        result
    }

    fn is_connected(&self) -> bool {
        if self.link_lost {
            return false;
        }
        // USB serial nodes vanish when the adapter is unplugged
        if cfg!(unix) {
            std::path::Path::new(&self.port_path).exists()
        } else {
            true
        }
    }

    fn port_path(&self) -> Option<&str> {
        Some(&self.port_path)
    }
}

fn data_bits(bits: DataBits) -> tokio_serial::DataBits {
    match bits {
        DataBits::Seven => tokio_serial::DataBits::Seven,
        DataBits::Eight => tokio_serial::DataBits::Eight,
    }
}

fn parity(parity: Parity) -> tokio_serial::Parity {
    match parity {
        Parity::None => tokio_serial::Parity::None,
        Parity::Odd => tokio_serial::Parity::Odd,
        Parity::Even => tokio_serial::Parity::Even,
    }
}

fn stop_bits(bits: StopBits) -> tokio_serial::StopBits {
    match bits {
        StopBits::One => tokio_serial::StopBits::One,
        StopBits::Two => tokio_serial::StopBits::Two,
    }
}

/// Map the handshake pair onto the UART's single flow-control setting
fn flow_control(spec: &SerialPortSpec) -> tokio_serial::FlowControl {
    match (spec.hardware_handshake, spec.software_handshake) {
        (HardwareHandshake::None, SoftwareHandshake::None) => tokio_serial::FlowControl::None,
        (HardwareHandshake::None, _) => tokio_serial::FlowControl::Software,
        // RTS-only keying is driven by the card's line driver
        (HardwareHandshake::Rts, _) => tokio_serial::FlowControl::None,
        _ => tokio_serial::FlowControl::Hardware,
    }
}

/// Determine if an error indicates the link went away
///
/// Returns `true` if the error suggests the device has been disconnected
/// (adapter unplugged, card pulled) rather than a transient error.
pub fn is_disconnect_error(err: &CardFrameError) -> bool {
    match err {
        CardFrameError::DeviceDisconnected(_) => true,
        CardFrameError::Transport(msg) => {
            let msg_lower = msg.to_lowercase();
            msg_lower.contains("broken pipe")
                || msg_lower.contains("no such device")
                || msg_lower.contains("device disconnected")
                || msg_lower.contains("device not configured")
                || msg_lower.contains("input/output error")
        }
        CardFrameError::Io(e) => matches!(
            e.kind(),
            std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::NotConnected
        ),
        // Timeouts are typically transient, not disconnection
        CardFrameError::Timeout(_) => false,
        _ => false,
    }
}
