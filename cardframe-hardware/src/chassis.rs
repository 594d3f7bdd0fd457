//! Card-frame chassis

use std::collections::BTreeMap;
use std::sync::Arc;

use cardframe_core::{CardFrameError, ConnectivityState, DeviceAddress, DeviceId, Result};
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::card::ExpansionCard;
use crate::device::{ConnectivityObservers, DeviceHandle};
use crate::host::RegistrationHost;

/// Top-level enclosure owning cards by slot
pub struct Chassis {
    handle: DeviceHandle,
    description: Option<String>,
    /// Keyed by slot, so iteration follows physical slot order
    cards: RwLock<BTreeMap<u8, Arc<ExpansionCard>>>,
}

impl Chassis {
    pub(crate) fn new(
        address: DeviceAddress,
        description: Option<String>,
        observers: Arc<ConnectivityObservers>,
    ) -> Self {
        Self {
            handle: DeviceHandle::new(DeviceId::Chassis(address), observers),
            description,
            cards: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn id(&self) -> DeviceId {
        self.handle.id()
    }

    pub fn address(&self) -> DeviceAddress {
        self.handle.id().chassis()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn state(&self) -> ConnectivityState {
        self.handle.state()
    }

    pub fn handle(&self) -> &DeviceHandle {
        &self.handle
    }

    /// Register the chassis with the host
    pub async fn register(&self, host: &dyn RegistrationHost) -> Result<()> {
        self.handle.transition(ConnectivityState::Registering)?;

        match host.register_device(self.id()).await {
            Ok(()) => {
                self.handle.transition(ConnectivityState::Online)?;
                info!("{} registered", self.id());
                Ok(())
            }
            Err(e) => {
                self.handle
                    .transition(ConnectivityState::RegistrationFailed)?;
                error!("{} failed to register: {}", self.id(), e);
                Err(CardFrameError::Registration {
                    device: self.id().to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Slots and card addresses are both unique within a chassis
    pub(crate) async fn seat(&self, slot: u8, card: Arc<ExpansionCard>) -> Result<()> {
        let mut cards = self.cards.write().await;
        if cards.contains_key(&slot) {
            return Err(CardFrameError::AlreadyExists(
                DeviceId::card(self.address(), slot).to_string(),
            ));
        }
        if let Some(holder) = cards.values().find(|c| c.address() == card.address()) {
            return Err(CardFrameError::AlreadyExists(format!(
                "card address {} (held by {})",
                card.address(),
                holder.id()
            )));
        }
        cards.insert(slot, card);
        Ok(())
    }

    /// Card in `slot`, if one is seated
    pub async fn card(&self, slot: u8) -> Option<Arc<ExpansionCard>> {
        self.cards.read().await.get(&slot).cloned()
    }

    /// All cards in slot order
    pub async fn cards(&self) -> Vec<Arc<ExpansionCard>> {
        self.cards.read().await.values().cloned().collect()
    }

    /// Card that `send-to-port` addresses: the lowest-slot registered card
    pub async fn dispatch_card(&self) -> Result<Arc<ExpansionCard>> {
        let cards = self.cards.read().await;
        if let Some(card) = cards.values().find(|c| c.state().is_registered()) {
            return Ok(card.clone());
        }

        match cards.values().next() {
            Some(card) => Err(CardFrameError::DeviceAbsent(card.id().to_string())),
            None => Err(CardFrameError::DeviceNotFound(format!(
                "no card seated in {}",
                self.id()
            ))),
        }
    }
}
