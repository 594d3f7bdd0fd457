//! Startup registration of the device hierarchy
//!
//! Builds every configured chassis, card, and port once and registers them
//! in order: chassis, then ports, then the card that owns them. A failure is
//! logged and recorded; the affected chassis or card becomes absent and its
//! siblings carry on.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use cardframe_core::{
    CardConfig, ChassisConfig, ConnectivityState, DeviceAddress, DeviceId, StaticConfig,
};
use cardframe_hardware::{
    Chassis, ConnectivityCallback, ExpansionCard, Registry, RegistrationHost, SubscriptionHandle,
};
use tracing::{debug, error, info, warn};

/// Counts of what came up at startup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupReport {
    pub chassis_registered: usize,
    pub chassis_failed: usize,
    pub cards_registered: usize,
    pub cards_failed: usize,
    pub ports_registered: usize,
    pub ports_failed: usize,
}

impl StartupReport {
    /// True if anything failed to register
    pub fn is_degraded(&self) -> bool {
        self.chassis_failed + self.cards_failed + self.ports_failed > 0
    }
}

impl fmt::Display for StartupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "chassis {}/{}, cards {}/{}, ports {}/{} registered",
            self.chassis_registered,
            self.chassis_registered + self.chassis_failed,
            self.cards_registered,
            self.cards_registered + self.cards_failed,
            self.ports_registered,
            self.ports_registered + self.ports_failed
        )
    }
}

/// One-time builder of the configured hierarchy
///
/// Each configured chassis and card keeps a reference here that is `None`
/// when construction or registration failed.
pub struct DeviceRegistrationFacade {
    registry: Arc<Registry>,
    chassis: BTreeMap<DeviceAddress, Option<Arc<Chassis>>>,
    cards: BTreeMap<DeviceId, Option<Arc<ExpansionCard>>>,
    subscriptions: Vec<SubscriptionHandle>,
    report: Option<StartupReport>,
}

impl DeviceRegistrationFacade {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            chassis: BTreeMap::new(),
            cards: BTreeMap::new(),
            subscriptions: Vec::new(),
            report: None,
        }
    }

    /// Build and register everything in `config`
    ///
    /// Runs once; later calls return the first report without touching the
    /// registry. Registration failures never abort startup.
    pub async fn bring_up(
        &mut self,
        host: &dyn RegistrationHost,
        config: &StaticConfig,
    ) -> StartupReport {
        if let Some(report) = &self.report {
            debug!("Device hierarchy already registered, skipping");
            return report.clone();
        }

        let mut report = StartupReport::default();
        for chassis_config in &config.chassis {
            self.bring_up_chassis(host, chassis_config, &mut report).await;
        }

        if report.is_degraded() {
            warn!("Startup finished degraded: {}", report);
        } else {
            info!("Startup complete: {}", report);
        }

        self.report = Some(report.clone());
        report
    }

    async fn bring_up_chassis(
        &mut self,
        host: &dyn RegistrationHost,
        config: &ChassisConfig,
        report: &mut StartupReport,
    ) {
        let address = config.address;

        let chassis = match self.registry.chassis(address).await {
            Some(existing) => existing,
            None => match self
                .registry
                .create_chassis(address, config.description.clone())
                .await
            {
                Ok(chassis) => chassis,
                Err(e) => {
                    error!("Could not create chassis {}: {}", address, e);
                    report.chassis_failed += 1;
                    self.chassis.insert(address, None);
                    return;
                }
            },
        };
        self.watch(chassis.id());

        if chassis.state() == ConnectivityState::Unknown {
            if let Err(e) = chassis.register(host).await {
                warn!("{} is absent: {}", chassis.id(), e);
                report.chassis_failed += 1;
                self.chassis.insert(address, None);
                return;
            }
        }
        report.chassis_registered += 1;

        for card_config in &config.cards {
            self.bring_up_card(host, &chassis, card_config, report).await;
        }

        self.chassis.insert(address, Some(chassis));
    }

    async fn bring_up_card(
        &mut self,
        host: &dyn RegistrationHost,
        chassis: &Chassis,
        config: &CardConfig,
        report: &mut StartupReport,
    ) {
        let id = DeviceId::card(chassis.address(), config.slot);
        let devices: Vec<String> = config.ports.iter().map(|p| p.device.clone()).collect();

        let card = match ExpansionCard::create(
            chassis,
            config.slot,
            config.address,
            config.model.clone(),
            &devices,
        )
        .await
        {
            Ok(card) => card,
            Err(e) => {
                error!("Could not create {}: {}", id, e);
                report.cards_failed += 1;
                self.cards.insert(id, None);
                return;
            }
        };
        self.watch(id);

        // Ports first; each one stands on its own
        for (port, spec) in card.com_ports().iter().zip(config.port_specs()) {
            self.watch(port.id());
            let result = match port.configure(spec) {
                Ok(()) => port.register(host).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => {
                    info!("{} online at {} ({})", port.id(), port.device_path(), spec);
                    report.ports_registered += 1;
                }
                Err(e) => {
                    warn!("{} unavailable: {}", port.id(), e);
                    report.ports_failed += 1;
                }
            }
        }

        match card.register(host).await {
            Ok(()) => {
                report.cards_registered += 1;
                self.cards.insert(id, Some(card));
            }
            Err(e) => {
                warn!("{} is absent: {}", id, e);
                report.cards_failed += 1;
                self.cards.insert(id, None);
            }
        }
    }

    fn watch(&mut self, device: DeviceId) {
        let callback: ConnectivityCallback = Arc::new(log_connectivity);
        self.subscriptions
            .push(self.registry.subscribe(device, callback));
    }

    /// Report of the first run, if it happened
    pub fn report(&self) -> Option<&StartupReport> {
        self.report.as_ref()
    }

    /// Registered chassis at `address`; `None` if absent or not configured
    pub fn chassis(&self, address: DeviceAddress) -> Option<&Arc<Chassis>> {
        self.chassis.get(&address).and_then(Option::as_ref)
    }

    /// Registered card `id`; `None` if absent or not configured
    pub fn card(&self, id: DeviceId) -> Option<&Arc<ExpansionCard>> {
        self.cards.get(&id).and_then(Option::as_ref)
    }

    pub fn subscriptions(&self) -> &[SubscriptionHandle] {
        &self.subscriptions
    }
}

fn log_connectivity(device: DeviceId, state: ConnectivityState) {
    match state {
        ConnectivityState::Offline => warn!("{} went offline", device),
        ConnectivityState::Online => info!("{} is online", device),
        other => debug!("{} is {}", device, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardframe_core::{Parity, PortConfig};
    use cardframe_hardware::MockHost;

    fn addr(v: u32) -> DeviceAddress {
        DeviceAddress::new(v).unwrap()
    }

    fn chassis_id() -> DeviceId {
        DeviceId::Chassis(addr(3))
    }

    fn card_id() -> DeviceId {
        DeviceId::card(addr(3), 1)
    }

    #[tokio::test]
    async fn test_default_config_comes_up_fully() {
        let registry = Arc::new(Registry::new());
        let mut facade = DeviceRegistrationFacade::new(registry.clone());

        let report = facade
            .bring_up(&MockHost::new(), &StaticConfig::default())
            .await;

        assert!(!report.is_degraded());
        assert_eq!(report.ports_registered, 3);
        assert!(facade.chassis(addr(3)).is_some());
        assert!(facade.card(card_id()).is_some());
        assert_eq!(
            registry.state(DeviceId::port(addr(3), 1, 3)).await,
            Some(ConnectivityState::Online)
        );
        assert_eq!(report.to_string(), "chassis 1/1, cards 1/1, ports 3/3 registered");
    }

    #[tokio::test]
    async fn test_bring_up_is_idempotent() {
        let registry = Arc::new(Registry::new());
        let mut facade = DeviceRegistrationFacade::new(registry.clone());
        let host = MockHost::new();

        let first = facade.bring_up(&host, &StaticConfig::default()).await;
        let subscriptions = registry.subscription_count();
        let second = facade.bring_up(&host, &StaticConfig::default()).await;

        assert_eq!(first, second);
        assert_eq!(registry.chassis_list().await.len(), 1);
        assert_eq!(registry.subscription_count(), subscriptions);
    }

    #[tokio::test]
    async fn test_chassis_failure_skips_cards() {
        let registry = Arc::new(Registry::new());
        let mut facade = DeviceRegistrationFacade::new(registry.clone());
        let host = MockHost::with_failures([chassis_id()]);

        let report = facade.bring_up(&host, &StaticConfig::default()).await;

        assert_eq!(report.chassis_failed, 1);
        assert_eq!(report.cards_registered + report.cards_failed, 0);
        assert!(facade.chassis(addr(3)).is_none());
        assert_eq!(
            registry.state(chassis_id()).await,
            Some(ConnectivityState::RegistrationFailed)
        );
    }

    #[tokio::test]
    async fn test_card_failure_keeps_ports() {
        let registry = Arc::new(Registry::new());
        let mut facade = DeviceRegistrationFacade::new(registry.clone());
        let host = MockHost::with_failures([card_id()]);

        let report = facade.bring_up(&host, &StaticConfig::default()).await;

        assert_eq!(report.cards_failed, 1);
        assert_eq!(report.ports_registered, 3);
        assert!(facade.card(card_id()).is_none());
        assert_eq!(
            registry.state(DeviceId::port(addr(3), 1, 1)).await,
            Some(ConnectivityState::Online)
        );
    }

    #[tokio::test]
    async fn test_partial_port_success() {
        let registry = Arc::new(Registry::new());
        let mut facade = DeviceRegistrationFacade::new(registry.clone());
        let host = MockHost::with_failures([DeviceId::port(addr(3), 1, 2)]);

        let report = facade.bring_up(&host, &StaticConfig::default()).await;

        assert_eq!(report.ports_registered, 2);
        assert_eq!(report.ports_failed, 1);
        assert_eq!(report.cards_registered, 1);
        assert!(report.is_degraded());
    }

    #[tokio::test]
    async fn test_per_port_overrides_applied() {
        let mut config = StaticConfig::default();
        let card = &mut config.chassis[0].cards[0];
        card.ports[1] = PortConfig::new("/dev/ttyUSB1");
        card.ports[1].overrides.baud_rate = Some(115200);
        card.ports[1].overrides.parity = Some(Parity::Even);

        let registry = Arc::new(Registry::new());
        let mut facade = DeviceRegistrationFacade::new(registry);
        let host = MockHost::new();
        facade.bring_up(&host, &config).await;

        let first = host.opened_spec(DeviceId::port(addr(3), 1, 1)).unwrap();
        let second = host.opened_spec(DeviceId::port(addr(3), 1, 2)).unwrap();
        assert_eq!(first.baud_rate, 9600);
        assert_eq!(second.baud_rate, 115200);
        assert_eq!(second.parity, Parity::Even);
    }

    #[tokio::test]
    async fn test_subscriptions_cover_the_hierarchy() {
        let registry = Arc::new(Registry::new());
        let mut facade = DeviceRegistrationFacade::new(registry.clone());
        facade
            .bring_up(&MockHost::new(), &StaticConfig::default())
            .await;

        // chassis + card + 3 ports
        assert_eq!(facade.subscriptions().len(), 5);
        assert_eq!(registry.subscription_count(), 5);
    }
}
