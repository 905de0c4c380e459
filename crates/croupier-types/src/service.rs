//! # Service Descriptors
//!
//! Identity and status vocabulary shared by the registry, the supervisor and
//! the node runtime. A service is any logical unit that publishes or consumes
//! messages, whether it runs in-process or as a separate OS process.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a logical service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDescriptor {
    /// Unique id, also the subscriber id the service receives messages under.
    pub service_id: String,
    /// Human-readable name.
    pub name: String,
    /// Service type, used to pick a factory.
    pub service_type: String,
}

impl ServiceDescriptor {
    /// Create a descriptor.
    pub fn new(
        service_id: impl Into<String>,
        name: impl Into<String>,
        service_type: impl Into<String>,
    ) -> Self {
        Self {
            service_id: service_id.into(),
            name: name.into(),
            service_type: service_type.into(),
        }
    }
}

impl fmt::Display for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}/{})", self.service_id, self.service_type, self.name)
    }
}

/// Lifecycle status of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceStatus {
    /// Created but not started.
    Created,
    /// Starting up.
    Starting,
    /// Running normally.
    Running,
    /// Shutting down.
    Stopping,
    /// Stopped gracefully.
    Stopped,
    /// Failed or exited unexpectedly.
    Failed,
}

impl ServiceStatus {
    /// Whether the service is past its useful life.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }
}
