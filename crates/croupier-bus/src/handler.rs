//! # Message Handlers
//!
//! Subscribers hand the broker a [`MessageHandler`]; each delivery arrives
//! as a [`Delivery`]. Errors and panics from a handler are caught by the
//! subscription worker and never reach the publisher or other subscribers.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use croupier_types::Message;
use futures::future::BoxFuture;
use thiserror::Error;

/// Identifier of one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// One message handed to one subscriber.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// The envelope, shared with every other recipient.
    pub message: Arc<Message>,
    /// 0 for the original publish, `k` for the k-th re-delivery.
    pub attempt: u32,
    /// Subscription receiving the message.
    pub subscription: SubscriptionId,
    /// Subscriber id the subscription was registered under.
    pub subscriber_id: Arc<str>,
}

impl Delivery {
    /// Whether this is a re-delivery after an ack timeout.
    #[must_use]
    pub fn is_retry(&self) -> bool {
        self.attempt > 0
    }
}

/// Failure reported by a handler.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    /// Create a handler error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Receives deliveries for a subscription.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process one delivery.
    async fn handle(&self, delivery: Delivery) -> Result<(), HandlerError>;
}

type HandlerFn = dyn Fn(Delivery) -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync;

/// Adapts a closure into a handler.
pub struct FnHandler {
    handler: Box<HandlerFn>,
}

impl FnHandler {
    /// Wrap `handler`.
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(Delivery) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        Self {
            handler: Box::new(move |delivery| Box::pin(handler(delivery))),
        }
    }
}

#[async_trait]
impl MessageHandler for FnHandler {
    async fn handle(&self, delivery: Delivery) -> Result<(), HandlerError> {
        (self.handler)(delivery).await
    }
}
