//! Device handles and connectivity observers
//!
//! Every chassis, card, and port owns a [`DeviceHandle`] holding its
//! connectivity state. All handles created under one registry share a
//! [`ConnectivityObservers`] set, so a subscription made on the registry
//! sees transitions of any device in the hierarchy.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use cardframe_core::{CardFrameError, ConnectivityState, DeviceId, Result};
use tracing::debug;

/// Callback invoked on every connectivity change of a subscribed device
///
/// Callbacks run on the thread that applied the change and must not block.
pub type ConnectivityCallback = Arc<dyn Fn(DeviceId, ConnectivityState) + Send + Sync>;

/// Token returned by a subscription, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

/// Subscriber set shared by every handle in a registry
#[derive(Default)]
pub struct ConnectivityObservers {
    next_id: AtomicU64,
    subscribers: RwLock<HashMap<u64, (DeviceId, ConnectivityCallback)>>,
}

impl ConnectivityObservers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for changes of `device`
    pub fn subscribe(&self, device: DeviceId, callback: ConnectivityCallback) -> SubscriptionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, (device, callback));
        debug!("Subscription {} added for {}", id, device);
        SubscriptionHandle(id)
    }

    /// Remove a subscription; returns false if it was already gone
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle.0)
            .is_some()
    }

    /// Drop every subscription, returning how many were removed
    pub fn clear(&self) -> usize {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let count = subscribers.len();
        subscribers.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn notify(&self, device: DeviceId, state: ConnectivityState) {
        // Collect first so callbacks run without the lock held
        let callbacks: Vec<ConnectivityCallback> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|(id, _)| *id == device)
            .map(|(_, cb)| cb.clone())
            .collect();

        for callback in callbacks {
            callback(device, state);
        }
    }
}

/// Identity plus connectivity state of one device
pub struct DeviceHandle {
    id: DeviceId,
    state: RwLock<ConnectivityState>,
    observers: Arc<ConnectivityObservers>,
}

impl DeviceHandle {
    /// Create a handle in the `Unknown` state
    pub fn new(id: DeviceId, observers: Arc<ConnectivityObservers>) -> Self {
        Self {
            id,
            state: RwLock::new(ConnectivityState::Unknown),
            observers,
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn state(&self) -> ConnectivityState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn observers(&self) -> &Arc<ConnectivityObservers> {
        &self.observers
    }

    /// Move to `next`, notifying subscribers if the state changed
    ///
    /// Returns the previous state.
    pub fn transition(&self, next: ConnectivityState) -> Result<ConnectivityState> {
        let previous = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let previous = *state;
            if !previous.can_transition_to(next) {
                return Err(CardFrameError::InvalidTransition {
                    device: self.id.to_string(),
                    from: previous,
                    to: next,
                });
            }
            *state = next;
            previous
        };

        if previous != next && next != ConnectivityState::Registering {
            debug!("{} is {}", self.id, next);
            self.observers.notify(self.id, next);
        }

        Ok(previous)
    }

    /// Apply a link-monitor reading
    pub fn set_online(&self, online: bool) -> Result<ConnectivityState> {
        let next = if online {
            ConnectivityState::Online
        } else {
            ConnectivityState::Offline
        };
        self.transition(next)?;
        Ok(next)
    }
}
