//! # Messaging Flows
//!
//! A client finds a service through the registry, addresses it directly
//! and learns about delivery problems through the broker.
//!
//! 1. **Discover then address**: `discover` returns the service id, the
//!    client publishes to it
//! 2. **Ack failure**: the service never acks, the client gets
//!    `DeliveryFailed` after the retry budget
//! 3. **Late ack**: an ack on the first re-delivery settles the message

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use croupier_bus::{
        AckOutcome, AckPolicy, Broker, BusError, Delivery, BROKER_SENDER_ID, REASON_ACK_TIMEOUT,
    };
    use croupier_registry::{RegistryConfig, ServiceRegistry};
    use croupier_types::{headers, ErrorKind, Message, MessageType};
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(3);

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    fn fast_broker() -> Broker {
        Broker::builder()
            .ack_policy(AckPolicy::fixed(Duration::from_millis(100), 2))
            .build()
    }

    /// Subscribe `id` and forward every delivery of `message_type`.
    fn tap(
        broker: &Broker,
        id: &str,
        message_type: Option<MessageType>,
    ) -> mpsc::UnboundedReceiver<Delivery> {
        let (tx, rx) = mpsc::unbounded_channel();
        broker
            .subscribe_fn(id, message_type, move |delivery| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(delivery);
                    Ok(())
                }
            })
            .unwrap();
        rx
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Delivery>) -> Delivery {
        timeout(WAIT, rx.recv())
            .await
            .expect("timeout waiting for delivery")
            .expect("channel closed")
    }

    fn ping(id: &str) -> Message {
        Message::builder(MessageType::custom("Ping"), "table-1")
            .id(id)
            .to("svcA")
            .requires_ack(true)
            .build()
    }

    // =========================================================================
    // DISCOVERY → ADDRESSING → ACK FAILURE
    // =========================================================================

    #[tokio::test]
    async fn test_discovered_service_never_acks() {
        let broker = fast_broker();
        let registry = ServiceRegistry::new(broker.clone(), RegistryConfig::default()).unwrap();

        let mut svc_rx = tap(&broker, "svcA", Some(MessageType::custom("Ping")));
        registry.register_service("svcA", "Lobby", "lobby").unwrap();

        let found = registry
            .discover("table-1", Duration::from_millis(200))
            .await
            .unwrap();
        let ids: Vec<&str> = found.iter().map(|d| d.service_id.as_str()).collect();
        assert_eq!(ids, vec!["svcA"]);

        let mut notice_rx = tap(&broker, "table-1", Some(MessageType::DeliveryFailed));
        let receipt = broker.publish(ping("m1")).unwrap();
        assert_eq!(receipt.delivered_to, 1);

        let outcome = receipt.ack.outcome_timeout(WAIT).await.unwrap();
        assert_eq!(outcome, AckOutcome::Failed { retries: 2 });

        for attempt in 0..3 {
            let delivery = next(&mut svc_rx).await;
            assert_eq!(delivery.attempt, attempt);
            assert_eq!(delivery.message.id().as_str(), "m1");
        }

        let notice = next(&mut notice_rx).await.message;
        assert_eq!(notice.sender_id(), BROKER_SENDER_ID);
        assert_eq!(notice.receiver_id(), Some("table-1"));
        assert_eq!(notice.in_response_to().map(|id| id.as_str()), Some("m1"));
        assert_eq!(notice.header(headers::REASON), Some(REASON_ACK_TIMEOUT));
        assert_eq!(notice.header(headers::RETRIES), Some("2"));
        assert_eq!(broker.pending_acks(), 0);
    }

    #[tokio::test]
    async fn test_ack_on_first_retry_settles() {
        let broker = fast_broker();
        let acker = broker.clone();
        broker
            .subscribe_fn("svcA", Some(MessageType::custom("Ping")), move |delivery| {
                let acker = acker.clone();
                async move {
                    if delivery.attempt == 1 {
                        acker.ack(&delivery).unwrap();
                    }
                    Ok(())
                }
            })
            .unwrap();
        let mut notice_rx = tap(&broker, "table-1", Some(MessageType::DeliveryFailed));

        let receipt = broker.publish(ping("m2")).unwrap();
        let outcome = receipt.ack.outcome_timeout(WAIT).await.unwrap();
        assert_eq!(outcome, AckOutcome::Acked { retries: 1 });

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(notice_rx.try_recv().is_err(), "no failure notice expected");
    }

    #[tokio::test]
    async fn test_unknown_receiver_and_duplicate_id() {
        let broker = fast_broker();
        let _svc = tap(&broker, "svcA", None);

        let err = broker
            .publish(
                Message::builder(MessageType::custom("Ping"), "table-1")
                    .to("svcB")
                    .build(),
            )
            .unwrap_err();
        assert!(matches!(err, BusError::UnknownReceiver { .. }));
        assert_eq!(err.kind(), ErrorKind::UnknownReceiver);

        broker.publish(ping("m3")).unwrap();
        let err = broker.publish(ping("m3")).unwrap_err();
        assert!(matches!(err, BusError::DuplicateMessageId { .. }));
    }

    #[tokio::test]
    async fn test_per_subscriber_order_preserved() {
        let broker = Broker::new();
        let mut rx = tap(&broker, "svcA", Some(MessageType::custom("Deal")));

        for n in 0..50 {
            broker
                .publish(
                    Message::builder(MessageType::custom("Deal"), "table-1")
                        .to("svcA")
                        .payload(n.to_string())
                        .build(),
                )
                .unwrap();
        }

        for n in 0..50 {
            assert_eq!(next(&mut rx).await.message.payload(), n.to_string());
        }
    }
}
