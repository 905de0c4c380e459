//! # Lifecycle Errors

use std::time::Duration;

use croupier_types::ErrorKind;
use thiserror::Error;

/// Errors from execution-context operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContextError {
    /// The context was stopped before the action could run.
    #[error("Execution context '{name}' is not running")]
    NotRunning { name: String },

    /// The context was stopped while the action was in flight.
    #[error("Execution context '{name}' was cancelled")]
    Cancelled { name: String },
}

impl ContextError {
    /// Taxonomy kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::ContextNotRunning
    }
}

/// Errors from coordinator registration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShutdownError {
    /// Shutdown has begun; no new participants are accepted.
    #[error("Shutdown already in progress, cannot register '{participant_id}'")]
    AlreadyShuttingDown { participant_id: String },

    /// A participant with this id already exists.
    #[error("Shutdown participant '{participant_id}' is already registered")]
    DuplicateParticipantId { participant_id: String },
}

impl ShutdownError {
    /// Taxonomy kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyShuttingDown { .. } => ErrorKind::AlreadyShuttingDown,
            Self::DuplicateParticipantId { .. } => ErrorKind::DuplicateParticipantId,
        }
    }
}

/// Failure reported by a participant's own teardown.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TeardownError {
    message: String,
}

impl TeardownError {
    /// Create a teardown error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for TeardownError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for TeardownError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Why a participant's teardown did not complete cleanly.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShutdownParticipantError {
    /// The teardown returned an error.
    #[error("Participant '{participant_id}' teardown failed: {source}")]
    Failed {
        participant_id: String,
        source: TeardownError,
    },

    /// The teardown exceeded its time budget.
    #[error("Participant '{participant_id}' teardown timed out after {after:?}")]
    TimedOut {
        participant_id: String,
        after: Duration,
    },

    /// The teardown panicked.
    #[error("Participant '{participant_id}' teardown panicked")]
    Panicked { participant_id: String },

    /// The overall deadline passed before the participant's tier started.
    #[error("Participant '{participant_id}' skipped, overall shutdown deadline exceeded")]
    Skipped { participant_id: String },
}

impl ShutdownParticipantError {
    /// Taxonomy kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::ShutdownParticipant
    }

    /// The participant this error concerns.
    #[must_use]
    pub fn participant_id(&self) -> &str {
        match self {
            Self::Failed { participant_id, .. }
            | Self::TimedOut { participant_id, .. }
            | Self::Panicked { participant_id }
            | Self::Skipped { participant_id } => participant_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_error_kinds() {
        let err = ShutdownError::AlreadyShuttingDown {
            participant_id: "broker".into(),
        };
        assert_eq!(err.kind(), ErrorKind::AlreadyShuttingDown);

        let err = ShutdownError::DuplicateParticipantId {
            participant_id: "broker".into(),
        };
        assert_eq!(err.kind(), ErrorKind::DuplicateParticipantId);
    }

    #[test]
    fn test_participant_error_display() {
        let err = ShutdownParticipantError::Failed {
            participant_id: "registry".into(),
            source: TeardownError::new("sweep task hung"),
        };
        let display = err.to_string();
        assert!(display.contains("registry"));
        assert!(display.contains("sweep task hung"));
        assert_eq!(err.participant_id(), "registry");
    }
}
