//! # Broker Errors

use croupier_types::{ErrorKind, MessageId};
use thiserror::Error;

/// Errors returned synchronously by broker operations.
///
/// Delivery problems after a successful `publish` (handler failures, missing
/// acknowledgments) are reported as [`BusEvent`](crate::BusEvent)s instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The broker cannot accept the operation.
    #[error("Transport error: {reason}")]
    Transport { reason: String },

    /// A targeted message named a receiver with no subscriptions.
    #[error("No subscriber registered under '{receiver_id}'")]
    UnknownReceiver { receiver_id: String },

    /// The message id is still retained from an earlier publish.
    #[error("Message id {message_id} was already published")]
    DuplicateMessageId { message_id: MessageId },

    /// `in_response_to` names an id the broker does not retain.
    #[error("Message {message_id} responds to unknown message {reference}")]
    UnknownReference {
        message_id: MessageId,
        reference: MessageId,
    },
}

impl BusError {
    pub(crate) fn closed() -> Self {
        Self::Transport {
            reason: "broker is closed".into(),
        }
    }

    /// Taxonomy kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport { .. } => ErrorKind::Transport,
            Self::UnknownReceiver { .. } => ErrorKind::UnknownReceiver,
            Self::DuplicateMessageId { .. } => ErrorKind::DuplicateMessageId,
            Self::UnknownReference { .. } => ErrorKind::UnknownReference,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(BusError::closed().kind(), ErrorKind::Transport);
        let err = BusError::UnknownReceiver {
            receiver_id: "svcA".into(),
        };
        assert_eq!(err.kind(), ErrorKind::UnknownReceiver);
        assert!(err.to_string().contains("svcA"));
    }
}
