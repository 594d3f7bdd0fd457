//! `send-to-port` command handling
//!
//! Parses the operator's arguments and routes the payload to a port through
//! the registry. Nothing escapes [`PortDispatcher::dispatch`]: every failure
//! is logged with the attempted port index and handed back as an outcome.

use std::sync::Arc;

use cardframe_core::command::USAGE;
use cardframe_core::{
    attempted_port_index, parse_command, CardFrameError, DeviceAddress, DeviceId, ParsedCommand,
};
use cardframe_hardware::Registry;
use tracing::{debug, warn};

/// Result of one command invocation
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Input too short to act on
    Ignored,
    /// Usage requested
    Help(&'static str),
    /// Payload accepted by the port's transport
    Sent { port: DeviceId, bytes: usize },
    /// Parsing, resolution or the write failed
    Failed {
        port_index: Option<u32>,
        error: CardFrameError,
    },
}

/// Routes operator payloads to ports
pub struct PortDispatcher {
    registry: Arc<Registry>,
    default_chassis: Option<DeviceAddress>,
}

impl PortDispatcher {
    /// `default_chassis` is used when a command carries no `-i:` flag
    pub fn new(registry: Arc<Registry>, default_chassis: Option<DeviceAddress>) -> Self {
        Self {
            registry,
            default_chassis,
        }
    }

    /// Run one `send-to-port` invocation
    pub async fn dispatch(&self, input: &str) -> DispatchOutcome {
        let request = match parse_command(input) {
            Ok(ParsedCommand::Empty) => return DispatchOutcome::Ignored,
            Ok(ParsedCommand::Help) => return DispatchOutcome::Help(USAGE),
            Ok(ParsedCommand::Send(request)) => request,
            Err(error) => return failed(attempted_port_index(input), error),
        };

        let port_index = request.target_port_index;
        let chassis = match request.chassis.map(DeviceAddress::new).transpose() {
            Ok(selected) => selected.or(self.default_chassis),
            Err(error) => return failed(port_index, error),
        };

        debug!(
            "send-to-port chassis={:?} port={:?} payload={:?}",
            chassis, port_index, request.payload
        );

        match self
            .registry
            .send(chassis, port_index, &request.payload)
            .await
        {
            Ok(port) => DispatchOutcome::Sent {
                port,
                bytes: request.payload.len(),
            },
            Err(error) => failed(port_index, error),
        }
    }
}

fn failed(port_index: Option<u32>, error: CardFrameError) -> DispatchOutcome {
    match port_index {
        Some(index) => warn!("send-to-port to port {} failed: {}", index, error),
        None => warn!("send-to-port without a port index failed: {}", error),
    }
    DispatchOutcome::Failed { port_index, error }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardframe_core::{ErrorKind, StaticConfig};
    use cardframe_hardware::MockHost;

    use crate::registration::DeviceRegistrationFacade;

    fn addr(v: u32) -> DeviceAddress {
        DeviceAddress::new(v).unwrap()
    }

    fn port(index: u32) -> DeviceId {
        DeviceId::port(addr(3), 1, index)
    }

    async fn setup(host: &MockHost) -> PortDispatcher {
        let registry = Arc::new(Registry::new());
        let mut facade = DeviceRegistrationFacade::new(registry.clone());
        facade.bring_up(host, &StaticConfig::default()).await;
        PortDispatcher::new(registry, Some(addr(3)))
    }

    fn writes(host: &MockHost) -> Vec<Vec<String>> {
        (1..=3).map(|i| host.link(port(i)).unwrap().writes()).collect()
    }

    #[tokio::test]
    async fn test_sends_to_indexed_port() {
        let host = MockHost::new();
        let dispatcher = setup(&host).await;

        let outcome = dispatcher.dispatch("-p:2 hello world").await;
        assert!(matches!(
            outcome,
            DispatchOutcome::Sent { bytes: 11, port: sent } if sent == port(2)
        ));
        assert_eq!(
            writes(&host),
            vec![vec![], vec!["hello world".to_string()], vec![]]
        );
    }

    #[tokio::test]
    async fn test_help_sends_nothing() {
        let host = MockHost::new();
        let dispatcher = setup(&host).await;

        let outcome = dispatcher.dispatch("-i:8 -p:1 ?").await;
        assert!(matches!(outcome, DispatchOutcome::Help(text) if text == USAGE));
        assert!(writes(&host).iter().all(|w| w.is_empty()));
    }

    #[tokio::test]
    async fn test_out_of_range_is_caught() {
        let host = MockHost::new();
        let dispatcher = setup(&host).await;

        match dispatcher.dispatch("-p:99 test").await {
            DispatchOutcome::Failed { port_index, error } => {
                assert_eq!(port_index, Some(99));
                assert_eq!(error.kind(), ErrorKind::AddressResolution);
            }
            other => panic!("Expected Failed, got {:?}", other),
        }
        assert!(writes(&host).iter().all(|w| w.is_empty()));
    }

    #[tokio::test]
    async fn test_missing_port_index_fails() {
        let host = MockHost::new();
        let dispatcher = setup(&host).await;

        match dispatcher.dispatch("hello").await {
            DispatchOutcome::Failed { port_index, error } => {
                assert_eq!(port_index, None);
                assert!(matches!(error, CardFrameError::PortIndexOutOfRange { index: 0, .. }));
            }
            other => panic!("Expected Failed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_short_input_is_ignored() {
        let host = MockHost::new();
        let dispatcher = setup(&host).await;

        assert!(matches!(dispatcher.dispatch("").await, DispatchOutcome::Ignored));
        assert!(matches!(dispatcher.dispatch("x").await, DispatchOutcome::Ignored));
        assert!(matches!(dispatcher.dispatch("   ").await, DispatchOutcome::Ignored));
    }

    #[tokio::test]
    async fn test_parse_error_is_caught() {
        let host = MockHost::new();
        let dispatcher = setup(&host).await;

        match dispatcher.dispatch("-p: hello").await {
            DispatchOutcome::Failed { error, .. } => assert_eq!(error.kind(), ErrorKind::Parse),
            other => panic!("Expected Failed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_parse_error_keeps_port_index() {
        let host = MockHost::new();
        let dispatcher = setup(&host).await;

        match dispatcher.dispatch("-p:2 -i:x hello").await {
            DispatchOutcome::Failed { port_index, error } => {
                assert_eq!(port_index, Some(2));
                assert_eq!(error.kind(), ErrorKind::Parse);
            }
            other => panic!("Expected Failed, got {:?}", other),
        }
        assert!(writes(&host).iter().all(|w| w.is_empty()));
    }

    #[tokio::test]
    async fn test_empty_payload_is_forwarded() {
        let host = MockHost::new();
        let dispatcher = setup(&host).await;

        assert!(matches!(
            dispatcher.dispatch("-p:1").await,
            DispatchOutcome::Sent { bytes: 0, .. }
        ));
        assert_eq!(host.link(port(1)).unwrap().writes(), vec![String::new()]);
    }

    #[tokio::test]
    async fn test_chassis_selector() {
        let host = MockHost::new();
        let dispatcher = setup(&host).await;

        assert!(matches!(
            dispatcher.dispatch("-i:3 -p:3 ON").await,
            DispatchOutcome::Sent { .. }
        ));

        match dispatcher.dispatch("-i:8 -p:1 ON").await {
            DispatchOutcome::Failed { error, .. } => {
                assert!(matches!(error, CardFrameError::DeviceNotFound(_)))
            }
            other => panic!("Expected Failed, got {:?}", other),
        }

        match dispatcher.dispatch("-i:0 -p:1 ON").await {
            DispatchOutcome::Failed { error, .. } => {
                assert!(matches!(error, CardFrameError::InvalidAddress(0)))
            }
            other => panic!("Expected Failed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_port_reports_not_registered() {
        let host = MockHost::with_failures([port(2)]);
        let dispatcher = setup(&host).await;

        match dispatcher.dispatch("-p:2 hello").await {
            DispatchOutcome::Failed { port_index, error } => {
                assert_eq!(port_index, Some(2));
                assert!(matches!(error, CardFrameError::PortNotRegistered(_)));
            }
            other => panic!("Expected Failed, got {:?}", other),
        }
    }
}
