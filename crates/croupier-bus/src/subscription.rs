//! # Subscriptions
//!
//! Each subscription owns one unbounded mailbox drained by one worker task,
//! which gives FIFO delivery per subscriber and isolates slow or failing
//! handlers from everyone else.
//!
//! ```text
//!  publish() ─┬─► mailbox(sub-1) ──► worker ──► handler A
//!             ├─► mailbox(sub-2) ──► worker ──► handler B
//!             └─► mailbox(sub-3) ──► worker ──► handler C
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use croupier_types::{Message, MessageType};
use futures::FutureExt;
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::events::BusEvent;
use crate::handler::{Delivery, MessageHandler, SubscriptionId};
use crate::middleware::{DeliveryOutcome, Middleware};

/// Message waiting in a mailbox.
pub(crate) struct Queued {
    pub(crate) message: Arc<Message>,
    pub(crate) attempt: u32,
}

/// At most one subscription exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct SubscriptionKey {
    pub(crate) subscriber_id: Arc<str>,
    pub(crate) filter: Option<MessageType>,
}

impl SubscriptionKey {
    fn matches(&self, message: &Message) -> bool {
        let type_matches = self
            .filter
            .as_ref()
            .map_or(true, |filter| filter == message.message_type());
        let receiver_matches = message
            .receiver_id()
            .map_or(true, |receiver| receiver == &*self.subscriber_id);
        type_matches && receiver_matches
    }
}

pub(crate) type SharedHandler = Arc<RwLock<Arc<dyn MessageHandler>>>;

pub(crate) struct SubscriptionEntry {
    pub(crate) key: SubscriptionKey,
    pub(crate) handler: SharedHandler,
    pub(crate) mailbox: mpsc::UnboundedSender<Queued>,
    pub(crate) token: CancellationToken,
}

/// Read-mostly table of live subscriptions.
#[derive(Default)]
pub(crate) struct SubscriberTable {
    by_key: HashMap<SubscriptionKey, SubscriptionId>,
    entries: HashMap<SubscriptionId, SubscriptionEntry>,
}

impl SubscriberTable {
    pub(crate) fn find(&self, key: &SubscriptionKey) -> Option<SubscriptionId> {
        self.by_key.get(key).copied()
    }

    /// Swap the handler of an existing subscription. Queued messages are kept
    /// and will reach the new handler.
    pub(crate) fn replace_handler(&self, id: SubscriptionId, handler: Arc<dyn MessageHandler>) {
        if let Some(entry) = self.entries.get(&id) {
            *entry.handler.write() = handler;
        }
    }

    pub(crate) fn insert(&mut self, id: SubscriptionId, entry: SubscriptionEntry) {
        self.by_key.insert(entry.key.clone(), id);
        self.entries.insert(id, entry);
    }

    pub(crate) fn remove(&mut self, id: SubscriptionId) -> Option<SubscriptionEntry> {
        let entry = self.entries.remove(&id)?;
        self.by_key.remove(&entry.key);
        Some(entry)
    }

    pub(crate) fn ids_for(&self, subscriber_id: &str) -> Vec<SubscriptionId> {
        self.entries
            .iter()
            .filter(|(_, entry)| &*entry.key.subscriber_id == subscriber_id)
            .map(|(id, _)| *id)
            .collect()
    }

    pub(crate) fn has_subscriber(&self, subscriber_id: &str) -> bool {
        self.by_key
            .keys()
            .any(|key| &*key.subscriber_id == subscriber_id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn drain(&mut self) -> Vec<SubscriptionEntry> {
        self.by_key.clear();
        self.entries.drain().map(|(_, entry)| entry).collect()
    }

    /// Enqueue `message` into every matching mailbox. Returns the number of
    /// subscriptions that accepted it.
    pub(crate) fn enqueue(&self, message: &Arc<Message>, attempt: u32) -> usize {
        let mut delivered = 0;
        for entry in self.entries.values() {
            if !entry.key.matches(message) {
                continue;
            }
            let queued = Queued {
                message: Arc::clone(message),
                attempt,
            };
            if entry.mailbox.send(queued).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}

/// Hooks and event channel shared by the broker and all workers.
pub(crate) struct Pipeline {
    pub(crate) middleware: Vec<Arc<dyn Middleware>>,
    pub(crate) events: broadcast::Sender<BusEvent>,
}

impl Pipeline {
    pub(crate) fn emit(&self, event: BusEvent) {
        // No observers is fine.
        let _ = self.events.send(event);
    }
}

/// Drain a subscription's mailbox until it is cancelled or closed.
pub(crate) async fn run_worker(
    id: SubscriptionId,
    subscriber_id: Arc<str>,
    handler: SharedHandler,
    mut mailbox: mpsc::UnboundedReceiver<Queued>,
    token: CancellationToken,
    pipeline: Arc<Pipeline>,
) {
    loop {
        let queued = tokio::select! {
            biased;
            () = token.cancelled() => break,
            queued = mailbox.recv() => match queued {
                Some(queued) => queued,
                None => break,
            },
        };

        let delivery = Delivery {
            message: queued.message,
            attempt: queued.attempt,
            subscription: id,
            subscriber_id: Arc::clone(&subscriber_id),
        };
        deliver(&handler, delivery, &pipeline).await;
    }
    debug!(subscription = %id, subscriber = %subscriber_id, "[Broker] Subscription worker stopped");
}

async fn deliver(handler: &SharedHandler, delivery: Delivery, pipeline: &Pipeline) {
    let current = Arc::clone(&*handler.read());
    let started = Instant::now();

    let outcome = match AssertUnwindSafe(current.handle(delivery.clone()))
        .catch_unwind()
        .await
    {
        Ok(Ok(())) => DeliveryOutcome::Handled,
        Ok(Err(error)) => DeliveryOutcome::Failed(error.to_string()),
        Err(panic) => DeliveryOutcome::Panicked(panic_message(panic.as_ref())),
    };

    let elapsed = started.elapsed();
    for middleware in &pipeline.middleware {
        middleware.on_delivered(&delivery, &outcome, elapsed);
    }

    if let DeliveryOutcome::Failed(error) | DeliveryOutcome::Panicked(error) = outcome {
        pipeline.emit(BusEvent::HandlerFailed {
            message_id: delivery.message.id().clone(),
            subscriber_id: delivery.subscriber_id.to_string(),
            error,
        });
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(subscriber: &str, filter: Option<MessageType>) -> SubscriptionKey {
        SubscriptionKey {
            subscriber_id: Arc::from(subscriber),
            filter,
        }
    }

    #[test]
    fn test_unfiltered_key_matches_broadcast() {
        let msg = Message::builder(MessageType::Heartbeat, "svc-a").build();
        assert!(key("registry", None).matches(&msg));
        assert!(key("registry", Some(MessageType::Heartbeat)).matches(&msg));
        assert!(!key("registry", Some(MessageType::ServiceDiscovery)).matches(&msg));
    }

    #[test]
    fn test_targeted_message_matches_only_receiver() {
        let msg = Message::builder(MessageType::custom("Ping"), "table-1")
            .to("svcA")
            .build();
        assert!(key("svcA", None).matches(&msg));
        assert!(!key("svcB", None).matches(&msg));
    }

    #[test]
    fn test_panic_message_extraction() {
        let boxed: Box<dyn Any + Send> = Box::new("bad card");
        assert_eq!(panic_message(boxed.as_ref()), "bad card");
        let boxed: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(boxed.as_ref()), "handler panicked");
    }
}
