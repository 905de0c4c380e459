//! # Registry Federation
//!
//! Two registries share a broker under distinct ids. Each owns what it
//! registered and learns what the other announces.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use croupier_bus::Broker;
    use croupier_lifecycle::ExecutionContext;
    use croupier_registry::{
        HeartbeatTask, RegistryConfig, RegistryError, RegistryEvent, ServiceRegistry,
    };
    use tokio::sync::broadcast;
    use tokio::time::{sleep, timeout};

    const WAIT: Duration = Duration::from_secs(3);

    fn registry(broker: &Broker, id: &str, heartbeat_ms: u64) -> ServiceRegistry {
        let config = RegistryConfig {
            registry_id: id.to_string(),
            heartbeat_interval: Duration::from_millis(heartbeat_ms),
            missed_heartbeats: 3,
            sweep_interval: Duration::from_millis(heartbeat_ms),
        };
        ServiceRegistry::new(broker.clone(), config).unwrap()
    }

    async fn wait_for(
        events: &mut broadcast::Receiver<RegistryEvent>,
        matches: impl Fn(&RegistryEvent) -> bool,
    ) -> RegistryEvent {
        timeout(WAIT, async {
            loop {
                let event = events.recv().await.unwrap();
                if matches(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("timeout waiting for registry event")
    }

    #[tokio::test]
    async fn test_announcement_learned_and_forgotten() {
        let broker = Broker::new();
        let a = registry(&broker, "registry-a", 5_000);
        let b = registry(&broker, "registry-b", 5_000);
        let mut b_events = b.events();

        a.register_service("svcA", "Lobby", "lobby").unwrap();
        let learned = wait_for(&mut b_events, |e| matches!(e, RegistryEvent::Learned(_))).await;
        let RegistryEvent::Learned(descriptor) = learned else {
            unreachable!()
        };
        assert_eq!(descriptor.service_id, "svcA");
        assert!(a.record("svcA").unwrap().owned);
        assert!(!b.record("svcA").unwrap().owned);

        // B knows the id, so it cannot claim it.
        let err = b.register_service("svcA", "Lobby", "lobby").unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateServiceId { .. }));
        // Learned records are not B's to remove.
        assert!(matches!(
            b.deregister_service("svcA"),
            Err(RegistryError::UnknownService { .. })
        ));

        a.deregister_service("svcA").unwrap();
        wait_for(&mut b_events, |e| matches!(e, RegistryEvent::Deregistered(_))).await;
        assert!(!b.contains("svcA"));
    }

    #[tokio::test]
    async fn test_discovery_spans_registries() {
        let broker = Broker::new();
        let a = registry(&broker, "registry-a", 5_000);
        let b = registry(&broker, "registry-b", 5_000);

        a.register_service("svcA", "Lobby", "lobby").unwrap();
        b.register_service("svcB", "Cashier", "cashier").unwrap();

        let found = a
            .discover("table-1", Duration::from_millis(200))
            .await
            .unwrap();
        let ids: Vec<&str> = found.iter().map(|d| d.service_id.as_str()).collect();
        assert_eq!(ids, vec!["svcA", "svcB"]);
    }

    #[tokio::test]
    async fn test_heartbeats_keep_service_alive_everywhere() {
        let broker = Broker::new();
        let a = registry(&broker, "registry-a", 50);
        let b = registry(&broker, "registry-b", 50);

        a.register_service("svcA", "Lobby", "lobby").unwrap();
        a.register_service("svcB", "Cashier", "cashier").unwrap();
        let context = ExecutionContext::new("svcA");
        let _heartbeat = HeartbeatTask::spawn(a.clone(), "svcA", &context).unwrap();

        // Well past max_age (150ms) for the silent service.
        sleep(Duration::from_millis(500)).await;

        assert!(a.contains("svcA"));
        assert!(b.contains("svcA"));
        assert!(!a.contains("svcB"));
        assert!(!b.contains("svcB"));

        context.stop();
        let mut a_events = a.events();
        let expired = wait_for(&mut a_events, |e| matches!(e, RegistryEvent::Expired(_))).await;
        assert!(matches!(&expired, RegistryEvent::Expired(d) if d.service_id == "svcA"));
        assert!(!a.contains("svcA"));
    }
}
