//! # Broker
//!
//! In-process publish/subscribe hub with at-least-once delivery for
//! messages that require an acknowledgment.
//!
//! ## Publish Path
//!
//! ```text
//! publish(msg)
//!   ├─ closed?                        → Transport
//!   ├─ targeted, receiver unknown?    → UnknownReceiver
//!   ├─ id retained? reference known?  → DuplicateMessageId / UnknownReference
//!   ├─ requires_ack → pending record + timer
//!   ├─ enqueue into every matching mailbox (under the table read lock)
//!   └─ in_response_to → resolve pending record as Acked
//! ```
//!
//! ## Ownership
//!
//! - Subscriber table: `parking_lot::RwLock`, read on every publish
//! - Pending acks: `DashMap`, removal decides the single terminal outcome
//! - Ack timers and subscription workers run on a `TaskTracker`

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use croupier_lifecycle::{ShutdownParticipant, TeardownError};
use croupier_types::{headers, Message, MessageId, MessageType};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::ack::{AckOutcome, AckPolicy, AckWaiter, PendingAck};
use crate::error::BusError;
use crate::events::{BusEvent, REASON_ACK_TIMEOUT, REASON_BROKER_CLOSED};
use crate::handler::{Delivery, FnHandler, HandlerError, MessageHandler, SubscriptionId};
use crate::id_cache::MessageIdCache;
use crate::middleware::{Middleware, TracingMiddleware};
use crate::subscription::{
    run_worker, Pipeline, SubscriberTable, SubscriptionEntry, SubscriptionKey,
};

/// Sender id of broker-generated messages.
pub const BROKER_SENDER_ID: &str = "broker";

/// Broker configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Ack timing for `requires_ack` messages.
    pub ack: AckPolicy,
    /// How long published ids are retained for duplicate/reference checks.
    pub id_retention: Duration,
    /// Capacity of the [`BusEvent`] channel.
    pub event_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            ack: AckPolicy::default(),
            id_retention: MessageIdCache::DEFAULT_RETENTION,
            event_capacity: 1024,
        }
    }
}

/// Result of a successful publish.
#[derive(Debug)]
pub struct PublishReceipt {
    /// Id of the published message.
    pub message_id: MessageId,
    /// Subscriptions the message was enqueued for.
    pub delivered_to: usize,
    /// Resolves to the ack outcome.
    pub ack: AckWaiter,
}

/// Builds a [`Broker`] with a fixed middleware pipeline.
pub struct BrokerBuilder {
    config: BrokerConfig,
    middleware: Vec<Arc<dyn Middleware>>,
    shutdown: Option<CancellationToken>,
}

impl BrokerBuilder {
    /// Start from defaults; the pipeline begins with [`TracingMiddleware`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: BrokerConfig::default(),
            middleware: vec![Arc::new(TracingMiddleware)],
            shutdown: None,
        }
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, config: BrokerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the ack policy.
    #[must_use]
    pub fn ack_policy(mut self, policy: AckPolicy) -> Self {
        self.config.ack = policy;
        self
    }

    /// Set the id retention window.
    #[must_use]
    pub fn id_retention(mut self, retention: Duration) -> Self {
        self.config.id_retention = retention;
        self
    }

    /// Append a middleware to the pipeline.
    #[must_use]
    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Drop the default tracing middleware.
    #[must_use]
    pub fn without_tracing(mut self) -> Self {
        self.middleware.retain(|m| m.name() != "tracing");
        self
    }

    /// Token whose cancellation stops the broker from arming new ack timers.
    #[must_use]
    pub fn shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    /// Build the broker.
    #[must_use]
    pub fn build(self) -> Broker {
        let (events, _) = broadcast::channel(self.config.event_capacity.max(1));
        let ids = MessageIdCache::with_config(
            self.config.id_retention,
            MessageIdCache::DEFAULT_GC_INTERVAL,
        );
        let names: Vec<&str> = self.middleware.iter().map(|m| m.name()).collect();
        debug!(middleware = ?names, "[Broker] Created");

        Broker {
            inner: Arc::new(BrokerInner {
                config: self.config,
                subscribers: RwLock::new(SubscriberTable::default()),
                pending: DashMap::new(),
                ids: Mutex::new(ids),
                pipeline: Arc::new(Pipeline {
                    middleware: self.middleware,
                    events,
                }),
                shutdown: self.shutdown.unwrap_or_default(),
                closed: CancellationToken::new(),
                closing: AtomicBool::new(false),
                tracker: TaskTracker::new(),
                next_subscription: AtomicU64::new(0),
            }),
        }
    }
}

impl Default for BrokerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Publish/subscribe hub. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Broker {
    inner: Arc<BrokerInner>,
}

struct BrokerInner {
    config: BrokerConfig,
    subscribers: RwLock<SubscriberTable>,
    pending: DashMap<MessageId, PendingAck>,
    ids: Mutex<MessageIdCache>,
    pipeline: Arc<Pipeline>,
    shutdown: CancellationToken,
    closed: CancellationToken,
    closing: AtomicBool,
    tracker: TaskTracker,
    next_subscription: AtomicU64,
}

#[derive(Clone, Copy)]
enum FailReason {
    AckTimeout,
    Closed,
}

impl FailReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::AckTimeout => REASON_ACK_TIMEOUT,
            Self::Closed => REASON_BROKER_CLOSED,
        }
    }
}

impl Broker {
    /// Broker with default configuration.
    #[must_use]
    pub fn new() -> Self {
        BrokerBuilder::new().build()
    }

    /// Start configuring a broker.
    #[must_use]
    pub fn builder() -> BrokerBuilder {
        BrokerBuilder::new()
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &BrokerConfig {
        &self.inner.config
    }

    /// Names of the middleware pipeline, in order.
    #[must_use]
    pub fn middleware_names(&self) -> Vec<String> {
        self.inner
            .pipeline
            .middleware
            .iter()
            .map(|m| m.name().to_string())
            .collect()
    }

    /// Subscribe `handler` under `subscriber_id`, optionally filtered by type.
    ///
    /// Subscribing again with the same id and filter replaces the handler
    /// and returns the existing subscription id.
    ///
    /// # Errors
    ///
    /// `BusError::Transport` once the broker is closed.
    pub fn subscribe(
        &self,
        subscriber_id: impl Into<String>,
        filter: Option<MessageType>,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<SubscriptionId, BusError> {
        let key = SubscriptionKey {
            subscriber_id: Arc::from(subscriber_id.into()),
            filter,
        };
        let mut table = self.inner.subscribers.write();
        if self.inner.closed.is_cancelled() {
            return Err(BusError::closed());
        }

        if let Some(id) = table.find(&key) {
            table.replace_handler(id, handler);
            debug!(subscription = %id, subscriber = %key.subscriber_id, "[Broker] Handler replaced");
            return Ok(id);
        }

        let id = SubscriptionId::new(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed) + 1);
        let (mailbox, rx) = mpsc::unbounded_channel();
        let token = self.inner.closed.child_token();
        let handler = Arc::new(RwLock::new(handler));

        self.inner.tracker.spawn(run_worker(
            id,
            Arc::clone(&key.subscriber_id),
            Arc::clone(&handler),
            rx,
            token.clone(),
            Arc::clone(&self.inner.pipeline),
        ));

        debug!(
            subscription = %id,
            subscriber = %key.subscriber_id,
            filter = ?key.filter,
            "[Broker] Subscribed"
        );
        table.insert(
            id,
            SubscriptionEntry {
                key,
                handler,
                mailbox,
                token,
            },
        );
        Ok(id)
    }

    /// Subscribe a closure.
    ///
    /// # Errors
    ///
    /// `BusError::Transport` once the broker is closed.
    pub fn subscribe_fn<F, Fut>(
        &self,
        subscriber_id: impl Into<String>,
        filter: Option<MessageType>,
        handler: F,
    ) -> Result<SubscriptionId, BusError>
    where
        F: Fn(Delivery) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.subscribe(subscriber_id, filter, Arc::new(FnHandler::new(handler)))
    }

    /// Remove a subscription. Messages still queued for it are discarded.
    ///
    /// Returns whether anything was removed; unknown ids are not an error.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.inner.subscribers.write().remove(id);
        match removed {
            Some(entry) => {
                entry.token.cancel();
                debug!(subscription = %id, subscriber = %entry.key.subscriber_id, "[Broker] Unsubscribed");
                true
            }
            None => false,
        }
    }

    /// Remove every subscription registered under `subscriber_id`.
    pub fn unsubscribe_all(&self, subscriber_id: &str) -> usize {
        let mut table = self.inner.subscribers.write();
        let ids = table.ids_for(subscriber_id);
        for id in &ids {
            if let Some(entry) = table.remove(*id) {
                entry.token.cancel();
            }
        }
        ids.len()
    }

    /// Publish a message.
    ///
    /// Broadcasts reach every subscription whose filter matches; targeted
    /// messages reach only subscriptions under `receiver_id`. Subscriptions
    /// added after this returns never see the message.
    ///
    /// # Errors
    ///
    /// - `Transport` - the broker is closed
    /// - `UnknownReceiver` - nobody subscribed under `receiver_id`
    /// - `DuplicateMessageId` / `UnknownReference` - id retention checks
    pub fn publish(&self, message: Message) -> Result<PublishReceipt, BusError> {
        let inner = &self.inner;
        let message = Arc::new(message);

        let (delivered_to, ack) = {
            let table = inner.subscribers.read();
            if inner.closed.is_cancelled() {
                return Err(BusError::closed());
            }
            if let Some(receiver) = message.receiver_id() {
                if !table.has_subscriber(receiver) && !inner.resolves_pending(&message) {
                    return Err(BusError::UnknownReceiver {
                        receiver_id: receiver.to_string(),
                    });
                }
            }
            inner
                .ids
                .lock()
                .admit(message.id(), message.in_response_to())?;

            // Armed before enqueueing so a fast ack always finds the record.
            let ack = inner.arm_ack(&message);
            (table.enqueue(&message, 0), ack)
        };

        if let Some(reference) = message.in_response_to() {
            inner.acknowledge(reference);
        }
        inner.published(&message, delivered_to);

        Ok(PublishReceipt {
            message_id: message.id().clone(),
            delivered_to,
            ack,
        })
    }

    /// Acknowledge `delivery` on behalf of its subscriber.
    ///
    /// # Errors
    ///
    /// Same as [`publish`](Self::publish).
    pub fn ack(&self, delivery: &Delivery) -> Result<PublishReceipt, BusError> {
        self.publish(Message::ack_for(&delivery.message, &*delivery.subscriber_id))
    }

    /// Subscribe to broker activity.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<BusEvent> {
        self.inner.pipeline.events.subscribe()
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }

    /// Whether anything is subscribed under `subscriber_id`.
    #[must_use]
    pub fn has_subscriber(&self, subscriber_id: &str) -> bool {
        self.inner.subscribers.read().has_subscriber(subscriber_id)
    }

    /// Number of messages awaiting an ack.
    #[must_use]
    pub fn pending_acks(&self) -> usize {
        self.inner.pending.len()
    }

    /// Whether `close` has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    /// Close the broker.
    ///
    /// Further publishes fail with `Transport`, subscription workers stop,
    /// and every pending record resolves as `Failed`. Returns `false` if the
    /// broker was already closed.
    pub fn close(&self) -> bool {
        let inner = &self.inner;
        if inner.closing.swap(true, Ordering::AcqRel) {
            return false;
        }
        inner.closed.cancel();

        let drained = inner.subscribers.write().drain();
        let subscriptions = drained.len();
        for entry in drained {
            entry.token.cancel();
        }

        let pending: Vec<MessageId> = inner.pending.iter().map(|e| e.key().clone()).collect();
        let failed = pending.len();
        for id in pending {
            inner.fail_pending(&id, FailReason::Closed);
        }

        inner.tracker.close();
        info!(subscriptions, failed_acks = failed, "[Broker] Closed");
        true
    }

    /// Wait for workers and timers to finish after `close`.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub async fn wait_closed(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.inner.tracker.wait())
            .await
            .is_ok()
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("subscriptions", &self.subscription_count())
            .field("pending_acks", &self.pending_acks())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[async_trait]
impl ShutdownParticipant for Broker {
    async fn teardown(&self) -> Result<(), TeardownError> {
        self.close();
        self.inner.tracker.wait().await;
        Ok(())
    }
}

impl BrokerInner {
    fn arm_ack(self: &Arc<Self>, message: &Arc<Message>) -> AckWaiter {
        if !message.requires_ack() {
            return AckWaiter::not_tracked();
        }
        if self.shutdown.is_cancelled() {
            debug!(message_id = %message.id(), "[Broker] Shutting down, ack not tracked");
            return AckWaiter::not_tracked();
        }

        let (record, waiter) = PendingAck::new(Arc::clone(message));
        let cancel = record.cancel.clone();
        let retries = Arc::clone(&record.retries);
        if let Some(stale) = self.pending.insert(message.id().clone(), record) {
            let retries = stale.retries();
            stale.resolve(AckOutcome::Failed { retries });
        }

        let inner = Arc::clone(self);
        let message = Arc::clone(message);
        self.tracker
            .spawn(async move { inner.run_ack_timer(message, retries, cancel).await });
        waiter
    }

    async fn run_ack_timer(
        self: Arc<Self>,
        message: Arc<Message>,
        retries: Arc<AtomicU32>,
        cancel: CancellationToken,
    ) {
        let policy = self.config.ack;
        let id = message.id();
        let mut attempt = 0;

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                () = self.closed.cancelled() => {
                    self.fail_pending(id, FailReason::Closed);
                    return;
                }
                () = tokio::time::sleep(policy.wait_for(attempt)) => {}
            }

            if attempt >= policy.max_retries {
                self.fail_pending(id, FailReason::AckTimeout);
                return;
            }
            if cancel.is_cancelled() {
                return;
            }

            attempt += 1;
            retries.store(attempt, Ordering::Release);
            for middleware in &self.pipeline.middleware {
                middleware.on_retry(id, attempt);
            }
            self.pipeline.emit(BusEvent::Retrying {
                message_id: id.clone(),
                attempt,
            });

            let delivered = {
                let table = self.subscribers.read();
                // An ack may have landed since the timer fired.
                if cancel.is_cancelled() || !self.pending.contains_key(id) {
                    return;
                }
                table.enqueue(&message, attempt)
            };
            if delivered == 0 {
                warn!(message_id = %id, attempt, "[Broker] Retry found no subscriber");
            }
        }
    }

    /// An ack for a pending record is accepted even when its receiver never
    /// subscribed; only the pending record cares about it.
    fn resolves_pending(&self, message: &Message) -> bool {
        *message.message_type() == MessageType::Ack
            && message
                .in_response_to()
                .is_some_and(|reference| self.pending.contains_key(reference))
    }

    fn acknowledge(&self, reference: &MessageId) {
        let Some((_, record)) = self.pending.remove(reference) else {
            return;
        };
        let retries = record.retries();
        let outcome = AckOutcome::Acked { retries };
        record.resolve(outcome);

        for middleware in &self.pipeline.middleware {
            middleware.on_ack_outcome(reference, &outcome);
        }
        self.pipeline.emit(BusEvent::Acked {
            message_id: reference.clone(),
            retries,
        });
    }

    fn fail_pending(&self, id: &MessageId, reason: FailReason) {
        let Some((_, record)) = self.pending.remove(id) else {
            return;
        };
        let retries = record.retries();
        let outcome = AckOutcome::Failed { retries };
        let original = Arc::clone(&record.message);
        record.resolve(outcome);

        for middleware in &self.pipeline.middleware {
            middleware.on_ack_outcome(id, &outcome);
        }
        self.pipeline.emit(BusEvent::Failed {
            message_id: id.clone(),
            retries,
            reason: reason.as_str().to_string(),
        });

        if let FailReason::AckTimeout = reason {
            self.notify_sender(&original, retries);
        }
    }

    /// Send the synthetic `DeliveryFailed` notice to the original sender.
    fn notify_sender(&self, original: &Message, retries: u32) {
        let notice = Message::reply_to(original, MessageType::DeliveryFailed, BROKER_SENDER_ID)
            .header(headers::REASON, REASON_ACK_TIMEOUT)
            .header(headers::RETRIES, retries.to_string())
            .build();
        self.ids.lock().remember(notice.id());

        let notice = Arc::new(notice);
        let delivered = self.subscribers.read().enqueue(&notice, 0);
        if delivered == 0 {
            debug!(
                message_id = %original.id(),
                sender = original.sender_id(),
                "[Broker] Sender not subscribed, failure notice dropped"
            );
        }
        self.published(&notice, delivered);
    }

    fn published(&self, message: &Message, delivered_to: usize) {
        for middleware in &self.pipeline.middleware {
            middleware.on_publish(message, delivered_to);
        }
        self.pipeline.emit(BusEvent::Published {
            message_id: message.id().clone(),
            message_type: message.message_type().clone(),
            delivered_to,
        });
    }
}
