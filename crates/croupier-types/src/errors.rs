//! # Error Kinds
//!
//! Shared taxonomy for expected failures across the core. Every crate keeps
//! its own error enum and maps each variant onto one of these kinds, so
//! callers can branch on the category without knowing the crate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Categories of expected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Delivery infrastructure failure (closed broker, dead worker).
    Transport,
    /// No acknowledgment within the retry budget.
    AckTimeout,
    /// Targeted message to an id nobody subscribed under.
    UnknownReceiver,
    /// A message id was reused while still retained.
    DuplicateMessageId,
    /// `in_response_to` names an id the broker never published.
    UnknownReference,
    /// Service id already registered.
    DuplicateServiceId,
    /// Service id not registered.
    UnknownService,
    /// Shutdown participant id already registered.
    DuplicateParticipantId,
    /// Registration attempted after shutdown began.
    AlreadyShuttingDown,
    /// Execution context was already stopped.
    ContextNotRunning,
    /// A child process could not be launched.
    ProcessLaunch,
    /// A child process exited without being asked to.
    ProcessExitedUnexpectedly,
    /// Process id not managed by the supervisor.
    UnknownProcess,
    /// A shutdown participant's teardown failed or timed out.
    ShutdownParticipant,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Transport => "TransportError",
            Self::AckTimeout => "AckTimeoutError",
            Self::UnknownReceiver => "UnknownReceiverError",
            Self::DuplicateMessageId => "DuplicateMessageId",
            Self::UnknownReference => "UnknownReference",
            Self::DuplicateServiceId => "DuplicateServiceId",
            Self::UnknownService => "UnknownService",
            Self::DuplicateParticipantId => "DuplicateParticipantId",
            Self::AlreadyShuttingDown => "AlreadyShuttingDown",
            Self::ContextNotRunning => "ContextNotRunning",
            Self::ProcessLaunch => "ProcessLaunchError",
            Self::ProcessExitedUnexpectedly => "ProcessExitedUnexpectedly",
            Self::UnknownProcess => "UnknownProcess",
            Self::ShutdownParticipant => "ShutdownParticipantError",
        };
        f.write_str(name)
    }
}

impl ErrorKind {
    /// Conflicts reported synchronously to the caller of a registration.
    #[must_use]
    pub fn is_registration_conflict(&self) -> bool {
        matches!(
            self,
            Self::DuplicateServiceId | Self::DuplicateParticipantId | Self::AlreadyShuttingDown
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_uses_taxonomy_names() {
        assert_eq!(ErrorKind::Transport.to_string(), "TransportError");
        assert_eq!(ErrorKind::ProcessLaunch.to_string(), "ProcessLaunchError");
    }

    #[test]
    fn test_registration_conflicts() {
        assert!(ErrorKind::DuplicateServiceId.is_registration_conflict());
        assert!(ErrorKind::AlreadyShuttingDown.is_registration_conflict());
        assert!(!ErrorKind::AckTimeout.is_registration_conflict());
    }
}
