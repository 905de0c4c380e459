//! # Delivery Middleware
//!
//! Cross-cutting hooks around publish and delivery, fixed when the broker is
//! built. Every hook has an empty default so a middleware only implements
//! what it observes.
//!
//! ```text
//!  publish() ──► on_publish ──► mailbox ──► handler ──► on_delivered
//!                                   ▲
//!  ack timer ──► on_retry ──────────┘            ack / give up ──► on_ack_outcome
//! ```
//!
//! Hooks run inline on the publishing thread or the subscription worker and
//! must not block.

use std::time::Duration;

use croupier_types::{Message, MessageId};
use tracing::{debug, trace, warn};

use crate::ack::AckOutcome;
use crate::handler::Delivery;

/// How one delivery ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Handler returned `Ok`.
    Handled,
    /// Handler returned an error.
    Failed(String),
    /// Handler panicked.
    Panicked(String),
}

impl DeliveryOutcome {
    /// Label used in logs and metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Handled => "handled",
            Self::Failed(_) => "failed",
            Self::Panicked(_) => "panicked",
        }
    }

    /// Whether the handler succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Handled)
    }
}

/// A named stage in the broker's pipeline.
pub trait Middleware: Send + Sync {
    /// Stable name, used in logs.
    fn name(&self) -> &str;

    /// A message was accepted by `publish`.
    fn on_publish(&self, _message: &Message, _delivered_to: usize) {}

    /// A handler finished with `outcome` after `elapsed`.
    fn on_delivered(&self, _delivery: &Delivery, _outcome: &DeliveryOutcome, _elapsed: Duration) {}

    /// Re-delivery number `attempt` of an unacknowledged message.
    fn on_retry(&self, _message_id: &MessageId, _attempt: u32) {}

    /// A pending record reached its terminal outcome.
    fn on_ack_outcome(&self, _message_id: &MessageId, _outcome: &AckOutcome) {}
}

/// Structured logging of every broker step.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMiddleware;

impl Middleware for TracingMiddleware {
    fn name(&self) -> &str {
        "tracing"
    }

    fn on_publish(&self, message: &Message, delivered_to: usize) {
        debug!(
            message_id = %message.id(),
            message_type = %message.message_type(),
            sender = message.sender_id(),
            receiver = message.receiver_id().unwrap_or("*"),
            delivered_to,
            "[Broker] Published"
        );
    }

    fn on_delivered(&self, delivery: &Delivery, outcome: &DeliveryOutcome, elapsed: Duration) {
        match outcome {
            DeliveryOutcome::Handled => trace!(
                message_id = %delivery.message.id(),
                subscriber = %delivery.subscriber_id,
                attempt = delivery.attempt,
                elapsed_us = elapsed.as_micros() as u64,
                "[Broker] Delivered"
            ),
            DeliveryOutcome::Failed(error) | DeliveryOutcome::Panicked(error) => warn!(
                message_id = %delivery.message.id(),
                subscriber = %delivery.subscriber_id,
                outcome = outcome.as_str(),
                error = %error,
                "[Broker] Handler failed"
            ),
        }
    }

    fn on_retry(&self, message_id: &MessageId, attempt: u32) {
        debug!(message_id = %message_id, attempt, "[Broker] Retrying unacknowledged message");
    }

    fn on_ack_outcome(&self, message_id: &MessageId, outcome: &AckOutcome) {
        match outcome {
            AckOutcome::Failed { retries } => {
                warn!(message_id = %message_id, retries, "[Broker] ✗ Delivery failed, no ack");
            }
            other => debug!(message_id = %message_id, outcome = ?other, "[Broker] ✓ Ack resolved"),
        }
    }
}
