//! Link monitor
//!
//! Connectivity events arrive from whatever watches the links and are queued
//! on a channel; a dedicated task applies them to the registry, so reporting
//! an event never blocks the reporter. An optional heartbeat polls every
//! registered port's transport and reports changes the same way.

use std::sync::Arc;
use std::time::Duration;

use cardframe_core::DeviceId;
use cardframe_hardware::Registry;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

const EVENT_QUEUE_DEPTH: usize = 64;

/// One (device, online) reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkEvent {
    pub device: DeviceId,
    pub online: bool,
}

/// Sending side of the link monitor
#[derive(Clone)]
pub struct LinkMonitor {
    sender: mpsc::Sender<LinkEvent>,
}

impl LinkMonitor {
    /// Start the task applying events to `registry`
    ///
    /// The task ends once every [`LinkMonitor`] clone is dropped and the
    /// queue is drained.
    pub fn spawn(registry: Arc<Registry>) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let task = tokio::spawn(apply_events(registry, receiver));
        (Self { sender }, task)
    }

    /// Queue a reading without waiting
    ///
    /// Returns false if the queue is full or the monitor stopped.
    pub fn report(&self, device: DeviceId, online: bool) -> bool {
        match self.sender.try_send(LinkEvent { device, online }) {
            Ok(()) => true,
            Err(e) => {
                warn!("Dropped link event for {}: {}", device, e);
                false
            }
        }
    }

    /// Poll every registered port once, reporting links whose reading
    /// disagrees with the port's state
    ///
    /// Returns how many events were queued.
    pub async fn poll_once(&self, registry: &Registry) -> usize {
        let mut queued = 0;
        for port in registry.registered_ports().await {
            let Some(connected) = port.poll_link().await else {
                continue;
            };
            if connected != port.state().is_online() && self.report(port.id(), connected) {
                queued += 1;
            }
        }
        queued
    }

    /// Start a background heartbeat polling links every `interval`
    pub fn start_heartbeat(&self, registry: Arc<Registry>, interval: Duration) -> JoinHandle<()> {
        let monitor = self.clone();

        tokio::spawn(async move {
            info!(
                "Starting link heartbeat with {}s interval",
                interval.as_secs()
            );

            loop {
                sleep(interval).await;

                if monitor.sender.is_closed() {
                    debug!("Heartbeat stopped: monitor closed");
                    break;
                }

                let queued = monitor.poll_once(&registry).await;
                if queued > 0 {
                    debug!("Heartbeat queued {} link event(s)", queued);
                }
            }
        })
    }
}

async fn apply_events(registry: Arc<Registry>, mut receiver: mpsc::Receiver<LinkEvent>) {
    while let Some(event) = receiver.recv().await {
        // Rejections are logged by the registry
        if let Ok(state) = registry
            .apply_connectivity(event.device, event.online)
            .await
        {
            debug!("Applied link event: {} -> {}", event.device, state);
        }
    }
    debug!("Link monitor stopped");
}
