//! Serial port - leaf of the device hierarchy

use std::sync::{Arc, OnceLock};

use cardframe_core::{CardFrameError, ConnectivityState, DeviceId, Result, SerialPortSpec};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::device::{ConnectivityObservers, DeviceHandle};
use crate::host::RegistrationHost;
use crate::serial_driver::{is_disconnect_error, SerialTransport};

/// One serial line on an expansion card
///
/// Line settings are applied once with [`SerialPort::configure`] before registration.
/// A port whose registration failed stays on its card; sends against it fail
/// with [`CardFrameError::PortNotRegistered`].
pub struct SerialPort {
    handle: DeviceHandle,
    device_path: String,
    spec: OnceLock<SerialPortSpec>,
    /// Held for the whole write so a port has one writer at a time
    transport: Mutex<Option<Box<dyn SerialTransport>>>,
}

impl SerialPort {
    pub(crate) fn new(
        id: DeviceId,
        device_path: impl Into<String>,
        observers: Arc<ConnectivityObservers>,
    ) -> Self {
        Self {
            handle: DeviceHandle::new(id, observers),
            device_path: device_path.into(),
            spec: OnceLock::new(),
            transport: Mutex::new(None),
        }
    }

    pub fn id(&self) -> DeviceId {
        self.handle.id()
    }

    /// 1-based index of this port on its card
    pub fn index(&self) -> u32 {
        match self.handle.id() {
            DeviceId::Port { index, .. } => index,
            _ => 0,
        }
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    pub fn state(&self) -> ConnectivityState {
        self.handle.state()
    }

    pub fn handle(&self) -> &DeviceHandle {
        &self.handle
    }

    /// Apply the static line configuration
    ///
    /// Fails if the settings are invalid or the port was already configured.
    pub fn configure(&self, spec: SerialPortSpec) -> Result<()> {
        spec.validate()?;
        self.spec
            .set(spec)
            .map_err(|_| CardFrameError::AlreadyConfigured(self.id().to_string()))?;
        debug!("{} configured: {}", self.id(), spec);
        Ok(())
    }

    /// The configured spec, if any
    pub fn configuration(&self) -> Option<SerialPortSpec> {
        self.spec.get().copied()
    }

    /// Open the port through `host`
    ///
    /// On failure the port moves to `RegistrationFailed` and stays there.
    pub async fn register(&self, host: &dyn RegistrationHost) -> Result<()> {
        let spec = self
            .configuration()
            .ok_or_else(|| CardFrameError::NotConfigured(self.id().to_string()))?;

        self.handle.transition(ConnectivityState::Registering)?;

        match host.open_port(self.id(), &self.device_path, &spec).await {
            Ok(transport) => {
                *self.transport.lock().await = Some(transport);
                self.handle.transition(ConnectivityState::Online)?;
                Ok(())
            }
            Err(e) => {
                self.handle
                    .transition(ConnectivityState::RegistrationFailed)?;
                error!(
                    "{} ({}) failed to register: {}",
                    self.id(),
                    self.device_path,
                    e
                );
                Err(CardFrameError::Registration {
                    device: self.id().to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Fire-and-forget write of `payload`
    ///
    /// Returns once the transport accepted the bytes; no reply is awaited.
    pub async fn send(&self, payload: &str) -> Result<()> {
        match self.state() {
            ConnectivityState::Online => {}
            ConnectivityState::Offline => {
                return Err(CardFrameError::PortOffline(self.id().to_string()));
            }
            _ => return Err(CardFrameError::PortNotRegistered(self.id().to_string())),
        }

        let mut transport = self.transport.lock().await;
        let Some(transport) = transport.as_mut() else {
            return Err(CardFrameError::PortNotRegistered(self.id().to_string()));
        };

        match transport.write_payload(payload.as_bytes()).await {
            Ok(()) => Ok(()),
            Err(e) if is_disconnect_error(&e) => {
                warn!("{} link lost during send: {}", self.id(), e);
                if let Err(te) = self.handle.set_online(false) {
                    debug!("Could not mark {} offline: {}", self.id(), te);
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Current link reading of the transport, if the port registered
    pub async fn poll_link(&self) -> Option<bool> {
        if !self.state().is_registered() {
            return None;
        }
        self.transport
            .lock()
            .await
            .as_ref()
            .map(|transport| transport.is_connected())
    }
}
