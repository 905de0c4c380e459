//! # Time-Bounded Message Id Cache
//!
//! Remembers published ids for a retention window so the broker can reject
//! reused ids and replies that reference nothing it has seen.
//!
//! - Ids are retained for `retention` after their first publish
//! - Expired ids are garbage-collected lazily, at most every `gc_interval`
//! - Memory is bounded by the publish rate times the retention window

use std::collections::HashMap;
use std::time::{Duration, Instant};

use croupier_types::MessageId;

use crate::error::BusError;

/// Time-bounded record of published message ids.
pub struct MessageIdCache {
    /// Id -> instant it was first published.
    seen: HashMap<MessageId, Instant>,

    /// How long an id stays retained.
    retention: Duration,

    /// Last garbage collection.
    last_gc: Instant,

    /// Minimum time between garbage collections.
    gc_interval: Duration,
}

impl MessageIdCache {
    /// Default retention window.
    pub const DEFAULT_RETENTION: Duration = Duration::from_secs(600);

    /// Default garbage collection interval.
    pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(10);

    /// Create a cache with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(Self::DEFAULT_RETENTION, Self::DEFAULT_GC_INTERVAL)
    }

    /// Create a cache with custom settings.
    #[must_use]
    pub fn with_config(retention: Duration, gc_interval: Duration) -> Self {
        Self {
            seen: HashMap::new(),
            retention,
            last_gc: Instant::now(),
            gc_interval,
        }
    }

    /// Validate a fresh publish and retain its id.
    ///
    /// The id must not be retained already, and `in_response_to`, when
    /// present, must be.
    ///
    /// # Errors
    ///
    /// - `BusError::DuplicateMessageId` - the id is still retained
    /// - `BusError::UnknownReference` - the referenced id is not retained
    pub fn admit(
        &mut self,
        id: &MessageId,
        in_response_to: Option<&MessageId>,
    ) -> Result<(), BusError> {
        let now = Instant::now();
        self.maybe_collect(now);

        if self.is_live(id, now) {
            return Err(BusError::DuplicateMessageId {
                message_id: id.clone(),
            });
        }

        if let Some(reference) = in_response_to {
            if !self.is_live(reference, now) {
                return Err(BusError::UnknownReference {
                    message_id: id.clone(),
                    reference: reference.clone(),
                });
            }
        }

        self.seen.insert(id.clone(), now);
        Ok(())
    }

    /// Retain `id` without validation (broker-generated messages).
    pub fn remember(&mut self, id: &MessageId) {
        let now = Instant::now();
        self.maybe_collect(now);
        self.seen.entry(id.clone()).or_insert(now);
    }

    /// Whether `id` is currently retained.
    #[must_use]
    pub fn contains(&self, id: &MessageId) -> bool {
        self.is_live(id, Instant::now())
    }

    /// Number of ids held, including expired ones not yet collected.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether the cache holds no ids.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn is_live(&self, id: &MessageId, now: Instant) -> bool {
        self.seen
            .get(id)
            .is_some_and(|first| now.duration_since(*first) < self.retention)
    }

    fn maybe_collect(&mut self, now: Instant) {
        if now.duration_since(self.last_gc) < self.gc_interval {
            return;
        }
        let retention = self.retention;
        self.seen
            .retain(|_, first| now.duration_since(*first) < retention);
        self.last_gc = now;
    }
}

impl Default for MessageIdCache {
    fn default() -> Self {
        Self::new()
    }
}
