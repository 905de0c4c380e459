//! # Node Errors

use croupier_bus::BusError;
use croupier_lifecycle::{ContextError, ShutdownError};
use croupier_registry::RegistryError;
use croupier_supervisor::SupervisorError;
use croupier_types::ErrorKind;
use thiserror::Error;

/// Errors raised while assembling the node or hosting services.
#[derive(Debug, Error)]
pub enum NodeError {
    /// No factory is registered for the requested service type.
    #[error("Unknown service type '{service_type}'")]
    UnknownServiceType { service_type: String },

    /// A service failed to start or stop.
    #[error("Service '{service_id}' failed: {reason}")]
    Service { service_id: String, reason: String },

    /// A service id is already hosted on this node.
    #[error("Service '{service_id}' is already hosted")]
    AlreadyHosted { service_id: String },

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Shutdown(#[from] ShutdownError),
}

impl NodeError {
    /// Build a `Service` error.
    pub fn service(service_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Service {
            service_id: service_id.into(),
            reason: reason.into(),
        }
    }

    /// Taxonomy kind, `None` for node-level errors with no core counterpart.
    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::UnknownServiceType { .. } | Self::Service { .. } => None,
            Self::AlreadyHosted { .. } => Some(ErrorKind::DuplicateServiceId),
            Self::Bus(e) => Some(e.kind()),
            Self::Registry(e) => Some(e.kind()),
            Self::Supervisor(e) => Some(e.kind()),
            Self::Context(e) => Some(e.kind()),
            Self::Shutdown(e) => Some(e.kind()),
        }
    }
}
