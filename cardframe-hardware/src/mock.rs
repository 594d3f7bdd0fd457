//! Mock host and transport for running without hardware
//!
//! Used by the daemon's `--mock` mode and by tests. Every port opened through
//! a [`MockHost`] gets a [`MockLink`] that records what was written and can be
//! switched offline, made to reject writes, or made to stall.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use cardframe_core::{CardFrameError, DeviceId, Result, SerialPortSpec};
use tracing::debug;

use crate::host::RegistrationHost;
use crate::serial_driver::SerialTransport;

#[derive(Default)]
struct LinkState {
    writes: Mutex<Vec<String>>,
    disconnected: AtomicBool,
    rejecting: AtomicBool,
    stalled: AtomicBool,
}

/// Shared view of one mock serial line
#[derive(Clone, Default)]
pub struct MockLink {
    inner: Arc<LinkState>,
}

impl MockLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payloads accepted so far, in order
    pub fn writes(&self) -> Vec<String> {
        self.inner
            .writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Simulate the cable being pulled or reconnected
    pub fn set_connected(&self, connected: bool) {
        self.inner.disconnected.store(!connected, Ordering::SeqCst);
    }

    /// Make every write fail with a transport error
    pub fn set_rejecting(&self, rejecting: bool) {
        self.inner.rejecting.store(rejecting, Ordering::SeqCst);
    }

    /// Make every write fail with a timeout
    pub fn set_stalled(&self, stalled: bool) {
        self.inner.stalled.store(stalled, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        !self.inner.disconnected.load(Ordering::SeqCst)
    }
}

/// Transport writing into a [`MockLink`]
pub struct MockTransport {
    link: MockLink,
    label: String,
}

impl MockTransport {
    pub fn new(link: MockLink, label: impl Into<String>) -> Self {
        Self {
            link,
            label: label.into(),
        }
    }
}

#[async_trait]
impl SerialTransport for MockTransport {
    async fn write_payload(&mut self, payload: &[u8]) -> Result<()> {
        if !self.link.is_connected() {
            return Err(CardFrameError::DeviceDisconnected(format!(
                "{} is unplugged",
                self.label
            )));
        }
        if self.link.inner.stalled.load(Ordering::SeqCst) {
            return Err(CardFrameError::Timeout("Write operation timed out".to_string()));
        }
        if self.link.inner.rejecting.load(Ordering::SeqCst) {
            return Err(CardFrameError::Transport(format!(
                "{} rejected the write",
                self.label
            )));
        }

        let text = String::from_utf8_lossy(payload).into_owned();
        debug!("TX {} (mock): {:?}", self.label, text);
        self.link
            .inner
            .writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    fn port_path(&self) -> Option<&str> {
        Some(&self.label)
    }
}

/// Registration host that needs no hardware
#[derive(Default)]
pub struct MockHost {
    failures: HashSet<DeviceId>,
    links: Mutex<HashMap<DeviceId, MockLink>>,
    specs: Mutex<HashMap<DeviceId, SerialPortSpec>>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse registration of the given devices
    pub fn with_failures(failures: impl IntoIterator<Item = DeviceId>) -> Self {
        Self {
            failures: failures.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Link behind a registered port
    pub fn link(&self, id: DeviceId) -> Option<MockLink> {
        self.links
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Spec the port was opened with
    pub fn opened_spec(&self, id: DeviceId) -> Option<SerialPortSpec> {
        self.specs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .copied()
    }

    fn check(&self, id: DeviceId) -> Result<()> {
        if self.failures.contains(&id) {
            return Err(CardFrameError::Transport(format!(
                "{} did not answer the registration request",
                id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RegistrationHost for MockHost {
    async fn register_device(&self, id: DeviceId) -> Result<()> {
        self.check(id)
    }

    async fn open_port(
        &self,
        id: DeviceId,
        device_path: &str,
        spec: &SerialPortSpec,
    ) -> Result<Box<dyn SerialTransport>> {
        self.check(id)?;

        let link = MockLink::new();
        self.links
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, link.clone());
        self.specs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, *spec);

        Ok(Box::new(MockTransport::new(link, device_path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardframe_core::DeviceAddress;

    fn port_id(index: u32) -> DeviceId {
        DeviceId::port(DeviceAddress::new(3).unwrap(), 1, index)
    }

    #[tokio::test]
    async fn test_mock_transport_records_writes() {
        let link = MockLink::new();
        let mut transport = MockTransport::new(link.clone(), "mock0");

        transport.write_payload(b"POWER ON").await.unwrap();
        transport.write_payload(b"").await.unwrap();

        assert_eq!(link.writes(), vec!["POWER ON".to_string(), String::new()]);
    }

    #[tokio::test]
    async fn test_mock_transport_failure_modes() {
        let link = MockLink::new();
        let mut transport = MockTransport::new(link.clone(), "mock0");

        link.set_stalled(true);
        assert!(matches!(
            transport.write_payload(b"x").await,
            Err(CardFrameError::Timeout(_))
        ));
        link.set_stalled(false);

        link.set_rejecting(true);
        assert!(matches!(
            transport.write_payload(b"x").await,
            Err(CardFrameError::Transport(_))
        ));
        link.set_rejecting(false);

        link.set_connected(false);
        assert!(!transport.is_connected());
        assert!(matches!(
            transport.write_payload(b"x").await,
            Err(CardFrameError::DeviceDisconnected(_))
        ));

        assert!(link.writes().is_empty());
    }

    #[tokio::test]
    async fn test_mock_host_failures() {
        let host = MockHost::with_failures([port_id(2)]);
        let spec = SerialPortSpec::default();

        assert!(host.open_port(port_id(1), "mock1", &spec).await.is_ok());
        assert!(host.open_port(port_id(2), "mock2", &spec).await.is_err());
        assert!(host.link(port_id(1)).is_some());
        assert!(host.link(port_id(2)).is_none());
        assert_eq!(host.opened_spec(port_id(1)), Some(spec));
    }
}
