//! # Supervisor Errors

use croupier_types::ErrorKind;
use thiserror::Error;

use crate::process::ProcessId;

/// Errors from supervisor operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SupervisorError {
    /// The child process could not be spawned.
    #[error("Failed to launch '{name}': {reason}")]
    Launch { name: String, reason: String },

    /// No managed process has this id.
    #[error("Process {id} is not managed by this supervisor")]
    UnknownProcess { id: ProcessId },

    /// The supervisor was disposed.
    #[error("Supervisor is shut down")]
    Disposed,
}

impl SupervisorError {
    /// Taxonomy kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Launch { .. } | Self::Disposed => ErrorKind::ProcessLaunch,
            Self::UnknownProcess { .. } => ErrorKind::UnknownProcess,
        }
    }
}
