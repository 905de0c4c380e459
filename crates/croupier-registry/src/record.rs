//! # Service Records

use chrono::{DateTime, Utc};
use croupier_types::ServiceDescriptor;
use tokio::time::Instant;

/// What the registry knows about one service.
#[derive(Debug, Clone)]
pub struct ServiceRecord {
    /// Identity of the service.
    pub descriptor: ServiceDescriptor,
    /// Last heartbeat seen (or the registration time).
    pub last_heartbeat: Instant,
    /// Wall-clock registration time.
    pub registered_at: DateTime<Utc>,
    /// Registered through this registry, as opposed to learned from another
    /// registry's announcement. Only owned records answer discovery.
    pub owned: bool,
}

impl ServiceRecord {
    pub(crate) fn new(descriptor: ServiceDescriptor, owned: bool) -> Self {
        Self {
            descriptor,
            last_heartbeat: Instant::now(),
            registered_at: Utc::now(),
            owned,
        }
    }

    /// Service id.
    #[must_use]
    pub fn service_id(&self) -> &str {
        &self.descriptor.service_id
    }

    /// Whether the last heartbeat is older than `max_age` at `now`.
    #[must_use]
    pub fn is_expired(&self, now: Instant, max_age: std::time::Duration) -> bool {
        now.saturating_duration_since(self.last_heartbeat) > max_age
    }
}
