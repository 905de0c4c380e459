//! # Tiered Shutdown
//!
//! Real components registered with one coordinator:
//!
//! ```text
//! SERVICES (50) ──► REGISTRY (80) ──► BROKER (100)
//!   table, slow        registry          broker
//! ```
//!
//! Services can still talk during their own teardown because the broker
//! closes last.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use croupier_bus::{AckOutcome, AckPolicy, Broker, BusError};
    use croupier_lifecycle::{
        priority, ShutdownConfig, ShutdownCoordinator, ShutdownParticipantError, TeardownError,
    };
    use croupier_registry::{RegistryConfig, ServiceRegistry};
    use croupier_types::{Message, MessageType};
    use parking_lot::Mutex;
    use tokio::sync::{mpsc, Notify};

    const WAIT: Duration = Duration::from_secs(5);

    struct Node {
        coordinator: ShutdownCoordinator,
        broker: Broker,
        registry: ServiceRegistry,
    }

    fn node(participant_timeout: Duration) -> Node {
        let coordinator = ShutdownCoordinator::with_config(ShutdownConfig {
            participant_timeout,
            overall_timeout: None,
        });
        let broker = Broker::builder()
            .ack_policy(AckPolicy::fixed(Duration::from_millis(100), 1))
            .shutdown_token(coordinator.root_token())
            .build();
        let registry = ServiceRegistry::new(broker.clone(), RegistryConfig::default()).unwrap();

        coordinator
            .register_participant("registry", priority::REGISTRY, Arc::new(registry.clone()))
            .unwrap();
        coordinator
            .register_participant("broker", priority::BROKER, Arc::new(broker.clone()))
            .unwrap();
        Node {
            coordinator,
            broker,
            registry,
        }
    }

    #[tokio::test]
    async fn test_services_talk_during_teardown() {
        let node = node(Duration::from_secs(1));
        let (tx, mut farewells) = mpsc::unbounded_channel();
        let heard = Arc::new(Notify::new());
        let signal = Arc::clone(&heard);
        node.broker
            .subscribe_fn("pit-boss", Some(MessageType::custom("Farewell")), move |d| {
                let tx = tx.clone();
                let signal = Arc::clone(&signal);
                async move {
                    let _ = tx.send(d.message.sender_id().to_string());
                    signal.notify_one();
                    Ok(())
                }
            })
            .unwrap();

        node.registry.register_service("table-1", "Table", "table").unwrap();
        let broker = node.broker.clone();
        let registry = node.registry.clone();
        node.coordinator
            .register_fn("table-1", priority::SERVICES, move || {
                let broker = broker.clone();
                let registry = registry.clone();
                let heard = Arc::clone(&heard);
                async move {
                    broker
                        .publish(
                            Message::builder(MessageType::custom("Farewell"), "table-1")
                                .to("pit-boss")
                                .build(),
                        )
                        .map_err(|e| TeardownError::new(e.to_string()))?;
                    heard.notified().await;
                    registry
                        .deregister_service("table-1")
                        .map_err(|e| TeardownError::new(e.to_string()))?;
                    Ok(())
                }
            })
            .unwrap();

        let report = node
            .coordinator
            .initiate_shutdown("test", None)
            .wait_timeout(WAIT)
            .await
            .unwrap();
        assert!(report.is_clean(), "{:?}", report.outcomes);

        let order: Vec<&str> = report
            .outcomes
            .iter()
            .map(|o| o.participant_id.as_str())
            .collect();
        assert_eq!(order, vec!["table-1", "registry", "broker"]);

        assert_eq!(farewells.try_recv().ok().as_deref(), Some("table-1"));
        assert!(!node.registry.contains("table-1"));
        assert!(node.broker.is_closed());
        assert!(matches!(
            node.broker.publish(Message::builder(MessageType::Heartbeat, "late").build()),
            Err(BusError::Transport { .. })
        ));
    }

    #[tokio::test]
    async fn test_hung_service_does_not_block_later_tiers() {
        let node = node(Duration::from_millis(100));
        node.coordinator
            .register_fn("slow", priority::SERVICES, || async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .unwrap();
        node.coordinator
            .register_fn("quick", priority::SERVICES, || async { Ok(()) })
            .unwrap();

        let report = node
            .coordinator
            .initiate_shutdown("test", None)
            .wait_timeout(WAIT)
            .await
            .unwrap();

        let failures: Vec<&ShutdownParticipantError> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0], ShutdownParticipantError::TimedOut { .. }));
        assert_eq!(failures[0].participant_id(), "slow");

        let priorities: Vec<i32> = report.outcomes.iter().map(|o| o.priority).collect();
        assert!(priorities.windows(2).all(|w| w[0] <= w[1]), "{priorities:?}");
        assert!(node.broker.is_closed());
    }

    #[tokio::test]
    async fn test_acks_during_shutdown() {
        let node = node(Duration::from_secs(1));
        let _silent = node
            .broker
            .subscribe_fn("svcA", None, |_| async { Ok(()) })
            .unwrap();

        // Pending before shutdown; resolved as failed when the broker closes.
        let before = node
            .broker
            .publish(
                Message::builder(MessageType::custom("Ping"), "table-1")
                    .to("svcA")
                    .requires_ack(true)
                    .build(),
            )
            .unwrap();
        assert!(before.ack.is_tracked());

        let gate = Arc::new(Mutex::new(None));
        let broker = node.broker.clone();
        let slot = Arc::clone(&gate);
        node.coordinator
            .register_fn("table-1", priority::SERVICES, move || {
                let broker = broker.clone();
                let slot = Arc::clone(&slot);
                async move {
                    let receipt = broker
                        .publish(
                            Message::builder(MessageType::custom("Ping"), "table-1")
                                .to("svcA")
                                .requires_ack(true)
                                .build(),
                        )
                        .map_err(|e| TeardownError::new(e.to_string()))?;
                    *slot.lock() = Some(receipt.ack.is_tracked());
                    Ok(())
                }
            })
            .unwrap();

        node.coordinator
            .initiate_shutdown("test", None)
            .wait_timeout(WAIT)
            .await
            .unwrap();

        assert_eq!(*gate.lock(), Some(false));
        assert!(matches!(
            before.ack.outcome_timeout(WAIT).await,
            Some(AckOutcome::Failed { .. })
        ));
    }
}
