//! Device registry
//!
//! Owns every chassis by address and, through them, every card and port.
//! The registry is built once at bootstrap and shared behind an `Arc` with
//! whoever needs to look devices up or route connectivity events.
//!
//! Routing follows registration, not link state: a chassis or card that
//! reported itself `Offline` still resolves. Only the port's own state gates
//! a write, so an offline chassis with live ports keeps accepting sends.

use std::collections::BTreeMap;
use std::sync::Arc;

use cardframe_core::{CardFrameError, ConnectivityState, DeviceAddress, DeviceId, Result};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::card::ExpansionCard;
use crate::chassis::Chassis;
use crate::device::{
    ConnectivityCallback, ConnectivityObservers, DeviceHandle, SubscriptionHandle,
};
use crate::serial_port::SerialPort;

/// Connectivity of one tracked device, for status listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceStatus {
    pub id: DeviceId,
    pub state: ConnectivityState,
    /// Model for cards, device path for ports, description for chassis
    pub detail: String,
}

enum Device {
    Chassis(Arc<Chassis>),
    Card(Arc<ExpansionCard>),
    Port(Arc<SerialPort>),
}

impl Device {
    fn handle(&self) -> &DeviceHandle {
        match self {
            Device::Chassis(c) => c.handle(),
            Device::Card(c) => c.handle(),
            Device::Port(p) => p.handle(),
        }
    }
}

/// Registry of chassis keyed by address
pub struct Registry {
    chassis: RwLock<BTreeMap<DeviceAddress, Arc<Chassis>>>,
    observers: Arc<ConnectivityObservers>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            chassis: RwLock::new(BTreeMap::new()),
            observers: Arc::new(ConnectivityObservers::new()),
        }
    }

    /// Create a chassis at `address`
    ///
    /// Returns [`CardFrameError::AlreadyExists`] if the address is taken.
    pub async fn create_chassis(
        &self,
        address: DeviceAddress,
        description: Option<String>,
    ) -> Result<Arc<Chassis>> {
        let mut chassis = self.chassis.write().await;
        if chassis.contains_key(&address) {
            return Err(CardFrameError::AlreadyExists(
                DeviceId::Chassis(address).to_string(),
            ));
        }

        let created = Arc::new(Chassis::new(address, description, self.observers.clone()));
        chassis.insert(address, created.clone());
        debug!("Created {}", created.id());
        Ok(created)
    }

    /// Chassis at `address`, whatever its state
    pub async fn chassis(&self, address: DeviceAddress) -> Option<Arc<Chassis>> {
        self.chassis.read().await.get(&address).cloned()
    }

    /// All chassis in address order
    pub async fn chassis_list(&self) -> Vec<Arc<Chassis>> {
        self.chassis.read().await.values().cloned().collect()
    }

    pub fn subscribe(&self, device: DeviceId, callback: ConnectivityCallback) -> SubscriptionHandle {
        self.observers.subscribe(device, callback)
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.observers.unsubscribe(handle)
    }

    /// Drop every subscription; used on teardown
    pub fn unsubscribe_all(&self) -> usize {
        self.observers.clear()
    }

    pub fn subscription_count(&self) -> usize {
        self.observers.len()
    }

    async fn find(&self, id: DeviceId) -> Option<Device> {
        let chassis = self.chassis(id.chassis()).await?;
        match id {
            DeviceId::Chassis(_) => Some(Device::Chassis(chassis)),
            DeviceId::Card { slot, .. } => chassis.card(slot).await.map(Device::Card),
            DeviceId::Port { slot, index, .. } => {
                let card = chassis.card(slot).await?;
                card.port(index).ok().cloned().map(Device::Port)
            }
        }
    }

    /// Current connectivity state of a device
    pub async fn state(&self, id: DeviceId) -> Option<ConnectivityState> {
        self.find(id).await.map(|device| device.handle().state())
    }

    /// Apply a link-monitor event to a device
    ///
    /// Devices that never registered, or whose registration failed, reject the
    /// event with [`CardFrameError::InvalidTransition`].
    pub async fn apply_connectivity(&self, id: DeviceId, online: bool) -> Result<ConnectivityState> {
        let device = self
            .find(id)
            .await
            .ok_or_else(|| CardFrameError::DeviceNotFound(id.to_string()))?;

        device.handle().set_online(online).map_err(|e| {
            warn!("Ignoring connectivity event for {}: {}", id, e);
            e
        })
    }

    /// Every tracked device with its state, chassis first then cards then ports
    pub async fn snapshot(&self) -> Vec<DeviceStatus> {
        let mut statuses = Vec::new();
        for chassis in self.chassis_list().await {
            statuses.push(DeviceStatus {
                id: chassis.id(),
                state: chassis.state(),
                detail: chassis.description().unwrap_or_default().to_string(),
            });
            for card in chassis.cards().await {
                statuses.push(DeviceStatus {
                    id: card.id(),
                    state: card.state(),
                    detail: format!("{} at {}", card.model(), card.address()),
                });
                for port in card.com_ports() {
                    let detail = match port.configuration() {
                        Some(spec) => format!("{} ({})", port.device_path(), spec),
                        None => port.device_path().to_string(),
                    };
                    statuses.push(DeviceStatus {
                        id: port.id(),
                        state: port.state(),
                        detail,
                    });
                }
            }
        }
        statuses
    }

    /// Chassis a command addresses
    ///
    /// With no selector the lowest registered address is used, `Offline`
    /// chassis included.
    pub async fn resolve_chassis(&self, selector: Option<DeviceAddress>) -> Result<Arc<Chassis>> {
        let chassis = self.chassis.read().await;

        let Some(address) = selector else {
            if let Some(found) = chassis.values().find(|c| c.state().is_registered()) {
                return Ok(found.clone());
            }
            return Err(match chassis.values().next() {
                Some(c) => CardFrameError::DeviceAbsent(c.id().to_string()),
                None => CardFrameError::DeviceNotFound("no chassis created".to_string()),
            });
        };

        let found = chassis
            .get(&address)
            .ok_or_else(|| CardFrameError::DeviceNotFound(DeviceId::Chassis(address).to_string()))?;
        if !found.state().is_registered() {
            return Err(CardFrameError::DeviceAbsent(found.id().to_string()));
        }
        Ok(found.clone())
    }

    /// Resolve a 1-based port index on the addressed chassis
    ///
    /// An unset index resolves like index 0, which is always out of range.
    pub async fn resolve_port(
        &self,
        chassis: Option<DeviceAddress>,
        index: Option<u32>,
    ) -> Result<Arc<SerialPort>> {
        let chassis = self.resolve_chassis(chassis).await?;
        let card = chassis.dispatch_card().await?;
        card.port(index.unwrap_or(0)).cloned()
    }

    /// Look up a port and write `payload` to it
    ///
    /// Returns the id of the port that accepted the payload.
    pub async fn send(
        &self,
        chassis: Option<DeviceAddress>,
        index: Option<u32>,
        payload: &str,
    ) -> Result<DeviceId> {
        let port = self.resolve_port(chassis, index).await?;
        port.send(payload).await?;
        Ok(port.id())
    }

    /// Ports that completed registration, across all chassis
    pub async fn registered_ports(&self) -> Vec<Arc<SerialPort>> {
        let mut ports = Vec::new();
        for chassis in self.chassis_list().await {
            for card in chassis.cards().await {
                ports.extend(
                    card.com_ports()
                        .iter()
                        .filter(|p| p.state().is_registered())
                        .cloned(),
                );
            }
        }
        ports
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockHost;
    use cardframe_core::{ErrorKind, SerialPortSpec};
    use std::sync::Mutex;

    fn addr(v: u32) -> DeviceAddress {
        DeviceAddress::new(v).unwrap()
    }

    /// Chassis 0x03 with one card in slot 1 holding `ports` registered ports
    async fn build(registry: &Registry, host: &MockHost, ports: usize) -> Arc<ExpansionCard> {
        let chassis = registry.create_chassis(addr(3), None).await.unwrap();
        chassis.register(host).await.unwrap();

        let devices: Vec<String> = (0..ports).map(|i| format!("mock{}", i)).collect();
        let card = ExpansionCard::create(&chassis, 1, addr(0x10), "C3COM-3", &devices)
            .await
            .unwrap();
        for port in card.com_ports() {
            port.configure(SerialPortSpec::default()).unwrap();
            let _ = port.register(host).await;
        }
        let _ = card.register(host).await;
        card
    }

    #[tokio::test]
    async fn test_create_chassis_twice_fails() {
        let registry = Registry::new();
        registry.create_chassis(addr(3), None).await.unwrap();

        let err = registry.create_chassis(addr(3), None).await.err().unwrap();
        assert!(matches!(err, CardFrameError::AlreadyExists(_)));
        assert_eq!(err.kind(), ErrorKind::Registration);
        assert_eq!(registry.chassis_list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_each_port_in_order() {
        let registry = Registry::new();
        let host = MockHost::new();
        let card = build(&registry, &host, 3).await;

        for p in 1..=3u32 {
            let port = registry.resolve_port(None, Some(p)).await.unwrap();
            assert!(Arc::ptr_eq(&port, &card.com_ports()[(p - 1) as usize]));
        }

        for bad in [Some(0), Some(4), None] {
            let err = registry.resolve_port(None, bad).await.err().unwrap();
            assert_eq!(err.kind(), ErrorKind::AddressResolution);
        }
    }

    #[tokio::test]
    async fn test_send_reaches_the_link() {
        let registry = Registry::new();
        let host = MockHost::new();
        build(&registry, &host, 3).await;

        let id = registry
            .send(Some(addr(3)), Some(2), "hello world")
            .await
            .unwrap();
        assert_eq!(id, DeviceId::port(addr(3), 1, 2));
        assert_eq!(host.link(id).unwrap().writes(), vec!["hello world"]);
    }

    #[tokio::test]
    async fn test_out_of_range_send_writes_nothing() {
        let registry = Registry::new();
        let host = MockHost::new();
        build(&registry, &host, 3).await;

        let err = registry.send(None, Some(99), "test").await.unwrap_err();
        assert!(matches!(
            err,
            CardFrameError::PortIndexOutOfRange { index: 99, port_count: 3 }
        ));
        for p in 1..=3 {
            let link = host.link(DeviceId::port(addr(3), 1, p)).unwrap();
            assert!(link.writes().is_empty());
        }
    }

    #[tokio::test]
    async fn test_unknown_and_failed_chassis() {
        let registry = Registry::new();
        let err = registry.resolve_chassis(None).await.err().unwrap();
        assert!(matches!(err, CardFrameError::DeviceNotFound(_)));

        let host = MockHost::with_failures([DeviceId::Chassis(addr(5))]);
        let chassis = registry.create_chassis(addr(5), None).await.unwrap();
        assert!(chassis.register(&host).await.is_err());

        assert!(matches!(
            registry.resolve_chassis(Some(addr(5))).await,
            Err(CardFrameError::DeviceAbsent(_))
        ));
        assert!(matches!(
            registry.resolve_chassis(Some(addr(8))).await,
            Err(CardFrameError::DeviceNotFound(_))
        ));
        assert!(matches!(
            registry.resolve_chassis(None).await,
            Err(CardFrameError::DeviceAbsent(_))
        ));
    }

    #[tokio::test]
    async fn test_default_chassis_is_lowest_registered() {
        let registry = Registry::new();
        let host = MockHost::with_failures([DeviceId::Chassis(addr(2))]);

        for a in [2u32, 9, 4] {
            let chassis = registry.create_chassis(addr(a), None).await.unwrap();
            let _ = chassis.register(&host).await;
        }

        let chassis = registry.resolve_chassis(None).await.unwrap();
        assert_eq!(chassis.address(), addr(4));
    }

    #[tokio::test]
    async fn test_offline_chassis_still_routes() {
        let registry = Registry::new();
        let host = MockHost::new();
        build(&registry, &host, 1).await;

        let chassis_id = DeviceId::Chassis(addr(3));
        registry.apply_connectivity(chassis_id, false).await.unwrap();
        assert_eq!(registry.state(chassis_id).await, Some(ConnectivityState::Offline));

        let resolved = registry.resolve_chassis(None).await.unwrap();
        assert_eq!(resolved.id(), chassis_id);
        registry.send(None, Some(1), "ping").await.unwrap();

        let port = DeviceId::port(addr(3), 1, 1);
        assert_eq!(host.link(port).unwrap().writes(), vec!["ping"]);
    }

    #[tokio::test]
    async fn test_connectivity_event_is_visible_immediately() {
        let registry = Registry::new();
        let host = MockHost::new();
        build(&registry, &host, 2).await;
        let id = DeviceId::port(addr(3), 1, 1);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        registry.subscribe(
            id,
            Arc::new(move |device: DeviceId, state: ConnectivityState| {
                sink.lock().unwrap().push((device, state))
            }),
        );

        registry.apply_connectivity(id, false).await.unwrap();
        assert_eq!(registry.state(id).await, Some(ConnectivityState::Offline));

        registry.apply_connectivity(id, true).await.unwrap();
        assert_eq!(registry.state(id).await, Some(ConnectivityState::Online));

        // A repeated online event changes nothing and notifies nobody
        registry.apply_connectivity(id, true).await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (id, ConnectivityState::Offline),
                (id, ConnectivityState::Online)
            ]
        );
    }

    #[tokio::test]
    async fn test_connectivity_event_rejected_for_failed_device() {
        let registry = Registry::new();
        let failed = DeviceId::port(addr(3), 1, 2);
        let host = MockHost::with_failures([failed]);
        build(&registry, &host, 2).await;

        let err = registry.apply_connectivity(failed, true).await.unwrap_err();
        assert!(matches!(err, CardFrameError::InvalidTransition { .. }));
        assert_eq!(
            registry.state(failed).await,
            Some(ConnectivityState::RegistrationFailed)
        );

        let missing = DeviceId::port(addr(3), 1, 7);
        assert!(matches!(
            registry.apply_connectivity(missing, true).await,
            Err(CardFrameError::DeviceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unsubscribe_all() {
        let registry = Registry::new();
        let callback: ConnectivityCallback = Arc::new(|_, _| {});
        registry.subscribe(DeviceId::Chassis(addr(3)), callback.clone());
        let sub = registry.subscribe(DeviceId::Chassis(addr(4)), callback);

        assert!(registry.unsubscribe(sub));
        assert_eq!(registry.subscription_count(), 1);
        assert_eq!(registry.unsubscribe_all(), 1);
        assert_eq!(registry.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_snapshot_and_registered_ports() {
        let registry = Registry::new();
        let host = MockHost::with_failures([DeviceId::port(addr(3), 1, 3)]);
        build(&registry, &host, 3).await;

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.len(), 5);
        assert_eq!(snapshot[0].id, DeviceId::Chassis(addr(3)));
        assert_eq!(snapshot[1].detail, "C3COM-3 at 0x10");
        assert_eq!(snapshot[4].state, ConnectivityState::RegistrationFailed);

        let ports: Vec<u32> = registry
            .registered_ports()
            .await
            .iter()
            .map(|p| p.index())
            .collect();
        assert_eq!(ports, vec![1, 2]);
    }
}
