//! # Bus Events
//!
//! Observable broker activity, published on a `tokio::sync::broadcast`
//! channel. Slow observers lag and lose events; the broker never waits.

use croupier_types::{MessageId, MessageType};

/// Broker activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// A message was accepted and enqueued for `delivered_to` subscriptions.
    Published {
        message_id: MessageId,
        message_type: MessageType,
        delivered_to: usize,
    },
    /// An unacknowledged message was re-delivered.
    Retrying { message_id: MessageId, attempt: u32 },
    /// An ack resolved a pending message.
    Acked { message_id: MessageId, retries: u32 },
    /// A pending message ran out of retries, or the broker closed.
    Failed {
        message_id: MessageId,
        retries: u32,
        reason: String,
    },
    /// A handler returned an error or panicked.
    HandlerFailed {
        message_id: MessageId,
        subscriber_id: String,
        error: String,
    },
}

impl BusEvent {
    /// The message this event concerns.
    #[must_use]
    pub fn message_id(&self) -> &MessageId {
        match self {
            Self::Published { message_id, .. }
            | Self::Retrying { message_id, .. }
            | Self::Acked { message_id, .. }
            | Self::Failed { message_id, .. }
            | Self::HandlerFailed { message_id, .. } => message_id,
        }
    }
}

/// Failure reason for a retry budget running out.
pub const REASON_ACK_TIMEOUT: &str = "ack-timeout";

/// Failure reason for records resolved by `Broker::close`.
pub const REASON_BROKER_CLOSED: &str = "broker-closed";
