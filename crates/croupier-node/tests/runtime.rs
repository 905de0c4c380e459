//! Node runtime scenarios: hosting, acknowledgments through the echo
//! service, prioritized shutdown and external process bridging.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use croupier_bus::AckOutcome;
use croupier_node::container::components::participants;
use croupier_node::services::{ECHO_REPLY_TYPE, ECHO_REQUEST_TYPE};
use croupier_node::{EchoService, HostedServiceSpec, NodeConfig, NodeError, NodeRuntime};
use croupier_registry::RegistryError;
use croupier_types::{ErrorKind, Message, MessageType, ServiceStatus};
use tokio::sync::mpsc;

fn fast_config() -> NodeConfig {
    NodeConfig {
        services: vec![HostedServiceSpec::new("echo", "echo")],
        ack_timeout_ms: 200,
        ack_max_retries: 2,
        heartbeat_interval_ms: 50,
        missed_heartbeats: 10,
        monitor_interval_ms: 20,
        grace_period_ms: 300,
        participant_timeout_ms: 2_000,
        shutdown_timeout_ms: 5_000,
        ..NodeConfig::default()
    }
}

async fn started(config: NodeConfig) -> NodeRuntime {
    let runtime = NodeRuntime::new(config).unwrap();
    runtime.start().await.unwrap();
    runtime
}

#[tokio::test]
async fn test_echo_service_is_registered_and_running() {
    let runtime = started(fast_config()).await;
    let container = runtime.container();

    assert!(container.registry.contains("echo"));
    assert_eq!(container.host.status("echo"), Some(ServiceStatus::Running));
    assert_eq!(container.host.services()[0].service_type, "echo");

    runtime.shutdown("test").await.unwrap();
}

#[tokio::test]
async fn test_echo_acknowledges_targeted_messages() {
    let runtime = started(fast_config()).await;
    let broker = &runtime.container().broker;

    let receipt = broker
        .publish(
            Message::builder(MessageType::custom("deal"), "table-1")
                .to("echo")
                .requires_ack(true)
                .build(),
        )
        .unwrap();

    let outcome = receipt
        .ack
        .outcome_timeout(Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(outcome, AckOutcome::Acked { retries: 0 });

    runtime.shutdown("test").await.unwrap();
}

#[tokio::test]
async fn test_echo_replies_with_payload() {
    let runtime = started(fast_config()).await;
    let broker = &runtime.container().broker;

    let (tx, mut rx) = mpsc::unbounded_channel();
    broker
        .subscribe_fn(
            "table-1",
            Some(MessageType::custom(ECHO_REPLY_TYPE)),
            move |delivery| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(delivery.message);
                    Ok(())
                }
            },
        )
        .unwrap();

    let request = Message::builder(MessageType::custom(ECHO_REQUEST_TYPE), "table-1")
        .to("echo")
        .payload("ace of spades")
        .build();
    let request_id = request.id().clone();
    broker.publish(request).unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply.payload(), "ace of spades");
    assert_eq!(reply.in_response_to(), Some(&request_id));
    assert_eq!(reply.receiver_id(), Some("table-1"));

    runtime.shutdown("test").await.unwrap();
}

#[tokio::test]
async fn test_duplicate_service_rejected() {
    let runtime = started(fast_config()).await;
    let container = runtime.container();

    let again = container.host.host(Arc::new(EchoService::new("echo"))).await;
    assert!(matches!(again, Err(NodeError::AlreadyHosted { .. })));

    container
        .registry
        .register_service("svcA", "Lobby", "lobby")
        .unwrap();
    let clash = container.host.host(Arc::new(EchoService::new("svcA"))).await;
    let err = clash.unwrap_err();
    assert!(matches!(
        err,
        NodeError::Registry(RegistryError::DuplicateServiceId { .. })
    ));
    assert_eq!(err.kind(), Some(ErrorKind::DuplicateServiceId));
    assert_eq!(container.host.len(), 1);

    runtime.shutdown("test").await.unwrap();
}

#[tokio::test]
async fn test_shutdown_runs_tiers_in_priority_order() {
    let runtime = started(fast_config()).await;

    let report = runtime.shutdown("test").await.unwrap();
    assert!(report.is_clean());

    let order: Vec<&str> = report
        .outcomes
        .iter()
        .map(|o| o.participant_id.as_str())
        .collect();
    assert_eq!(
        order,
        vec![
            participants::SUPERVISOR,
            "service:echo",
            participants::REGISTRY,
            participants::BROKER,
        ]
    );

    let container = runtime.container();
    assert!(container.broker.is_closed());
    assert!(!container.registry.contains("echo"));
    assert_eq!(container.host.status("echo"), Some(ServiceStatus::Stopped));
}

#[tokio::test]
async fn test_hosting_after_shutdown_fails() {
    let runtime = started(fast_config()).await;
    runtime.shutdown("test").await.unwrap();

    let late = runtime
        .container()
        .host
        .host(Arc::new(EchoService::new("late")))
        .await;
    assert!(late.is_err());
}

#[tokio::test]
async fn test_unknown_service_type_fails_start() {
    let config = NodeConfig {
        services: vec![HostedServiceSpec::new("roulette", "wheel-1")],
        ..fast_config()
    };
    let runtime = NodeRuntime::new(config).unwrap();

    let result = runtime.start().await;
    assert!(matches!(result, Err(NodeError::UnknownServiceType { .. })));
    runtime.shutdown("startup failed").await.unwrap();
}

#[cfg(unix)]
mod external {
    use super::*;
    use croupier_node::ExternalServiceSpec;
    use croupier_node::ExternalService;
    use croupier_supervisor::ProcessSpec;
    use croupier_types::headers;

    #[tokio::test]
    async fn test_external_service_stopped_on_shutdown() {
        let config = NodeConfig {
            external: vec![ExternalServiceSpec::parse("sleeper=sleep 30").unwrap()],
            ..fast_config()
        };
        let runtime = started(config).await;
        let container = runtime.container();

        assert_eq!(container.supervisor.process_count(), 1);
        assert!(container.registry.contains("sleeper"));

        let report = runtime.shutdown("test").await.unwrap();
        assert!(report.is_clean());
        assert_eq!(container.supervisor.process_count(), 0);
    }

    #[tokio::test]
    async fn test_unexpected_exit_is_published() {
        let runtime = started(fast_config()).await;
        let container = runtime.container();

        let (tx, mut rx) = mpsc::unbounded_channel();
        container
            .broker
            .subscribe_fn("observer", Some(MessageType::ProcessExited), move |delivery| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(delivery.message);
                    Ok(())
                }
            })
            .unwrap();

        let crasher = Arc::new(ExternalService::new(
            ProcessSpec::new("crasher", "sh").args(["-c", "exit 4"]),
        ));
        container.host.host(crasher.clone()).await.unwrap();

        let notice = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(notice.header(headers::SERVICE_NAME), Some("crasher"));
        assert_eq!(notice.header(headers::EXIT_CODE), Some("4"));
        assert_eq!(container.host.status("crasher"), Some(ServiceStatus::Failed));

        let report = runtime.shutdown("test").await.unwrap();
        assert!(report.is_clean());
    }
}
