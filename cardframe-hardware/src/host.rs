//! Registration handshake with the owning host
//!
//! Registration is what makes a device addressable. The device hierarchy
//! drives the state machine; a [`RegistrationHost`] performs the actual
//! handshake and, for ports, hands back an open transport.

use async_trait::async_trait;
use cardframe_core::{DeviceId, LinkConfig, Result, SerialPortSpec};
use tracing::debug;

use crate::serial_driver::{SerialDriver, SerialTransport};

/// Host side of the registration handshake
#[async_trait]
pub trait RegistrationHost: Send + Sync {
    /// Announce a chassis or card
    async fn register_device(&self, id: DeviceId) -> Result<()>;

    /// Bring up the transport behind a port
    async fn open_port(
        &self,
        id: DeviceId,
        device_path: &str,
        spec: &SerialPortSpec,
    ) -> Result<Box<dyn SerialTransport>>;
}

/// Host backed by the machine's serial devices
///
/// Enclosures have no link of their own on a host serial adapter, so chassis
/// and card registration always succeeds; port registration opens the device.
pub struct SystemHost {
    timeout_ms: u64,
    debug_uart: bool,
}

impl SystemHost {
    pub fn new(link: &LinkConfig) -> Self {
        Self {
            timeout_ms: link.write_timeout_ms,
            debug_uart: link.debug_uart,
        }
    }
}

#[async_trait]
impl RegistrationHost for SystemHost {
    async fn register_device(&self, id: DeviceId) -> Result<()> {
        debug!("{} registered with host", id);
        Ok(())
    }

    async fn open_port(
        &self,
        id: DeviceId,
        device_path: &str,
        spec: &SerialPortSpec,
    ) -> Result<Box<dyn SerialTransport>> {
        debug!("Opening {} at {}", id, device_path);
        let driver = SerialDriver::open(device_path, spec, self.timeout_ms, self.debug_uart)?;
        Ok(Box::new(driver))
    }
}
