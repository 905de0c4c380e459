//! # Registry Errors

use croupier_bus::BusError;
use croupier_types::ErrorKind;
use thiserror::Error;

/// Errors from registry operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A service with this id is already registered.
    #[error("Service '{service_id}' is already registered")]
    DuplicateServiceId { service_id: String },

    /// No service with this id is registered here.
    #[error("Service '{service_id}' is not registered")]
    UnknownService { service_id: String },

    /// An announcement payload could not be decoded.
    #[error("Malformed service announcement: {reason}")]
    MalformedAnnouncement { reason: String },

    /// The broker rejected a registry message.
    #[error(transparent)]
    Bus(#[from] BusError),
}

impl RegistryError {
    /// Taxonomy kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DuplicateServiceId { .. } => ErrorKind::DuplicateServiceId,
            Self::UnknownService { .. } => ErrorKind::UnknownService,
            Self::MalformedAnnouncement { .. } => ErrorKind::Transport,
            Self::Bus(err) => err.kind(),
        }
    }
}
