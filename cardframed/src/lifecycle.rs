//! Process lifecycle notifications
//!
//! The hosting process reports pause/resume/stop, network adapter, disk and
//! reboot events. Only `Stopping` has work attached: every connectivity
//! subscription is dropped. The rest are accepted and logged.

use std::sync::Arc;

use async_trait::async_trait;
use cardframe_hardware::Registry;
use tracing::{debug, info};

/// Event delivered by the hosting process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Paused,
    Resumed,
    Stopping,
    NetworkAdapterUp(String),
    NetworkAdapterDown(String),
    DiskInserted(String),
    DiskEjected(String),
    Rebooting,
}

/// Receiver of process lifecycle events; every hook defaults to a no-op
#[async_trait]
pub trait LifecycleHandler: Send + Sync {
    async fn paused(&self) {}

    async fn resumed(&self) {}

    async fn stopping(&self) {}

    async fn network_adapter_up(&self, _adapter: &str) {}

    async fn network_adapter_down(&self, _adapter: &str) {}

    async fn disk_inserted(&self, _disk: &str) {}

    async fn disk_ejected(&self, _disk: &str) {}

    async fn rebooting(&self) {}
}

/// Route `event` to the matching hook of `handler`
pub async fn deliver(handler: &dyn LifecycleHandler, event: &ProcessEvent) {
    debug!("Lifecycle event: {:?}", event);
    match event {
        ProcessEvent::Paused => handler.paused().await,
        ProcessEvent::Resumed => handler.resumed().await,
        ProcessEvent::Stopping => handler.stopping().await,
        ProcessEvent::NetworkAdapterUp(adapter) => handler.network_adapter_up(adapter).await,
        ProcessEvent::NetworkAdapterDown(adapter) => handler.network_adapter_down(adapter).await,
        ProcessEvent::DiskInserted(disk) => handler.disk_inserted(disk).await,
        ProcessEvent::DiskEjected(disk) => handler.disk_ejected(disk).await,
        ProcessEvent::Rebooting => handler.rebooting().await,
    }
}

/// Daemon's handler: tears down subscriptions on stop
pub struct DaemonLifecycle {
    registry: Arc<Registry>,
}

impl DaemonLifecycle {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl LifecycleHandler for DaemonLifecycle {
    async fn stopping(&self) {
        let dropped = self.registry.unsubscribe_all();
        info!("Stopping: dropped {} connectivity subscription(s)", dropped);
    }
}
