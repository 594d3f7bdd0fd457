//! Expansion card hosting a fixed set of serial ports

use std::sync::Arc;

use cardframe_core::{CardFrameError, ConnectivityState, DeviceAddress, DeviceId, Result};
use tracing::{error, info};

use crate::chassis::Chassis;
use crate::device::DeviceHandle;
use crate::host::RegistrationHost;
use crate::serial_port::SerialPort;

/// Card seated in one chassis slot
pub struct ExpansionCard {
    handle: DeviceHandle,
    address: DeviceAddress,
    model: String,
    ports: Vec<Arc<SerialPort>>,
}

impl ExpansionCard {
    /// Create a card in `slot` of `parent` and seat it there
    ///
    /// The parent must be online. Ports are discovered from `port_devices`,
    /// in order, and numbered from 1.
    pub async fn create(
        parent: &Chassis,
        slot: u8,
        address: DeviceAddress,
        model: impl Into<String>,
        port_devices: &[String],
    ) -> Result<Arc<Self>> {
        let id = DeviceId::card(parent.address(), slot);

        let parent_state = parent.state();
        if !parent_state.is_online() {
            return Err(CardFrameError::InvalidParentState {
                device: id.to_string(),
                state: parent_state,
            });
        }

        let observers = parent.handle().observers().clone();
        let ports = port_devices
            .iter()
            .zip(1u32..)
            .map(|(device, index)| {
                Arc::new(SerialPort::new(
                    DeviceId::port(parent.address(), slot, index),
                    device.clone(),
                    observers.clone(),
                ))
            })
            .collect();

        let card = Arc::new(Self {
            handle: DeviceHandle::new(id, observers),
            address,
            model: model.into(),
            ports,
        });

        parent.seat(slot, card.clone()).await?;
        Ok(card)
    }

    pub fn id(&self) -> DeviceId {
        self.handle.id()
    }

    pub fn slot(&self) -> u8 {
        match self.handle.id() {
            DeviceId::Card { slot, .. } => slot,
            _ => 0,
        }
    }

    pub fn address(&self) -> DeviceAddress {
        self.address
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn state(&self) -> ConnectivityState {
        self.handle.state()
    }

    pub fn handle(&self) -> &DeviceHandle {
        &self.handle
    }

    /// Ports in index order; enumerable any number of times
    pub fn com_ports(&self) -> &[Arc<SerialPort>] {
        &self.ports
    }

    /// Resolve a 1-based port index
    pub fn port(&self, index: u32) -> Result<&Arc<SerialPort>> {
        let out_of_range = || CardFrameError::PortIndexOutOfRange {
            index,
            port_count: self.ports.len(),
        };
        let position = usize::try_from(index)
            .ok()
            .and_then(|i| i.checked_sub(1))
            .ok_or_else(out_of_range)?;
        self.ports.get(position).ok_or_else(out_of_range)
    }

    /// Register the card itself
    ///
    /// Ports are registered separately and keep their result whatever
    /// happens here.
    pub async fn register(&self, host: &dyn RegistrationHost) -> Result<()> {
        self.handle.transition(ConnectivityState::Registering)?;

        match host.register_device(self.id()).await {
            Ok(()) => {
                self.handle.transition(ConnectivityState::Online)?;
                info!(
                    "{} ({} at {}) registered with {} ports",
                    self.id(),
                    self.model,
                    self.address,
                    self.ports.len()
                );
                Ok(())
            }
            Err(e) => {
                self.handle
                    .transition(ConnectivityState::RegistrationFailed)?;
                error!("{} ({}) failed to register: {}", self.id(), self.model, e);
                Err(CardFrameError::Registration {
                    device: self.id().to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}
