//! Built-in diagnostic service.
//!
//! Acknowledges every `requires_ack` message addressed to it and answers
//! `echo` requests with an `echo-reply` carrying the same payload.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use croupier_bus::{Broker, Delivery, HandlerError};
use croupier_types::{Message, MessageType, ServiceDescriptor, ServiceStatus};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::NodeError;
use crate::services::{Service, ServiceContext};

/// Factory key of the echo service.
pub const ECHO_SERVICE_TYPE: &str = "echo";

/// Custom message type answered by the echo service.
pub const ECHO_REQUEST_TYPE: &str = "echo";

/// Custom message type of the answer.
pub const ECHO_REPLY_TYPE: &str = "echo-reply";

/// Acks and echoes whatever is addressed to it.
pub struct EchoService {
    descriptor: ServiceDescriptor,
    status: Mutex<ServiceStatus>,
    broker: Mutex<Option<Broker>>,
    received: Arc<AtomicU64>,
}

impl EchoService {
    /// Echo service under `service_id`.
    pub fn new(service_id: impl Into<String>) -> Self {
        let service_id = service_id.into();
        Self {
            descriptor: ServiceDescriptor::new(service_id.clone(), service_id, ECHO_SERVICE_TYPE),
            status: Mutex::new(ServiceStatus::Created),
            broker: Mutex::new(None),
            received: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Messages addressed to this service so far, retries included.
    #[must_use]
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }
}

async fn handle(
    broker: Broker,
    service_id: Arc<str>,
    received: Arc<AtomicU64>,
    delivery: Delivery,
) -> Result<(), HandlerError> {
    let message = &delivery.message;
    if message.receiver_id() != Some(&*service_id) {
        return Ok(());
    }
    received.fetch_add(1, Ordering::Relaxed);

    if message.requires_ack() {
        broker
            .ack(&delivery)
            .map_err(|e| HandlerError::new(format!("ack failed: {e}")))?;
    }

    if *message.message_type() == MessageType::custom(ECHO_REQUEST_TYPE) && !delivery.is_retry() {
        let reply = Message::reply_to(message, MessageType::custom(ECHO_REPLY_TYPE), &*service_id)
            .payload(message.payload())
            .build();
        broker
            .publish(reply)
            .map_err(|e| HandlerError::new(format!("reply failed: {e}")))?;
        debug!(service = %service_id, to = message.sender_id(), "Echo reply sent");
    }
    Ok(())
}

#[async_trait]
impl Service for EchoService {
    fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    async fn start(&self, context: ServiceContext) -> Result<(), NodeError> {
        *self.status.lock() = ServiceStatus::Starting;

        let service_id: Arc<str> = Arc::from(self.id());
        let broker = context.broker.clone();
        let received = Arc::clone(&self.received);
        let subscribed = context.broker.subscribe_fn(self.id(), None, move |delivery| {
            handle(
                broker.clone(),
                Arc::clone(&service_id),
                Arc::clone(&received),
                delivery,
            )
        });
        if let Err(e) = subscribed {
            *self.status.lock() = ServiceStatus::Failed;
            return Err(e.into());
        }

        *self.broker.lock() = Some(context.broker);
        *self.status.lock() = ServiceStatus::Running;
        info!(service = %self.descriptor, "Echo service started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), NodeError> {
        *self.status.lock() = ServiceStatus::Stopping;
        if let Some(broker) = self.broker.lock().take() {
            broker.unsubscribe_all(self.id());
        }
        *self.status.lock() = ServiceStatus::Stopped;
        Ok(())
    }

    fn status(&self) -> ServiceStatus {
        *self.status.lock()
    }
}
