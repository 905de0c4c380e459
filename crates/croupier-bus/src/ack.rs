//! # Acknowledgments
//!
//! Pending-ack bookkeeping for messages published with `requires_ack`.
//!
//! ## State Machine
//!
//! ```text
//!            ack published (in_response_to = id)
//!   Sent ───────────────────────────────────────→ Acked
//!     │
//!     └─ wait_for(0) elapsed → Retry(1) ─ … → Retry(max_retries)
//!                                                  │
//!                                 wait_for(max) elapsed → Failed
//! ```
//!
//! Whoever removes the record from the pending table owns the terminal
//! transition, so a record reaches exactly one of `Acked` / `Failed`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use croupier_types::Message;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// How the wait grows between delivery attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Every attempt waits the base timeout.
    Fixed,
    /// Attempt `n` waits `timeout × factor^n`, capped at `max`.
    Exponential {
        /// Multiplicative growth factor.
        factor: f64,
        /// Upper bound for a single wait.
        max: Duration,
    },
}

/// Acknowledgment timing for `requires_ack` messages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AckPolicy {
    /// Wait after the first delivery.
    pub timeout: Duration,
    /// Re-deliveries before giving up.
    pub max_retries: u32,
    /// Growth of the wait across attempts.
    pub backoff: Backoff,
}

impl Default for AckPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_retries: 3,
            backoff: Backoff::Fixed,
        }
    }
}

impl AckPolicy {
    /// Fixed-backoff policy.
    #[must_use]
    pub fn fixed(timeout: Duration, max_retries: u32) -> Self {
        Self {
            timeout,
            max_retries,
            backoff: Backoff::Fixed,
        }
    }

    /// How long to wait for an ack after delivery attempt `attempt`
    /// (0 is the original publish).
    #[must_use]
    pub fn wait_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.timeout,
            Backoff::Exponential { factor, max } => {
                let exp = attempt.min(i32::MAX as u32) as i32;
                let secs = self.timeout.as_secs_f64() * factor.powi(exp);
                if !secs.is_finite() || secs < 0.0 || secs > max.as_secs_f64() {
                    max
                } else {
                    Duration::from_secs_f64(secs)
                }
            }
        }
    }

    /// Upper bound on the time from publish to a terminal outcome.
    #[must_use]
    pub fn total_budget(&self) -> Duration {
        (0..=self.max_retries)
            .map(|attempt| self.wait_for(attempt))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

/// Terminal outcome of an acknowledged publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// An ack arrived after `retries` re-deliveries.
    Acked { retries: u32 },
    /// No ack after `retries` re-deliveries; the sender was notified.
    Failed { retries: u32 },
    /// The message did not require an ack, or was published during shutdown.
    NotTracked,
}

impl AckOutcome {
    /// Whether the message was acknowledged.
    #[must_use]
    pub fn is_acked(&self) -> bool {
        matches!(self, Self::Acked { .. })
    }
}

/// Resolves to the [`AckOutcome`] of one publish.
#[derive(Debug)]
pub struct AckWaiter {
    rx: Option<oneshot::Receiver<AckOutcome>>,
}

impl AckWaiter {
    pub(crate) fn not_tracked() -> Self {
        Self { rx: None }
    }

    pub(crate) fn pending(rx: oneshot::Receiver<AckOutcome>) -> Self {
        Self { rx: Some(rx) }
    }

    /// Whether a pending record exists for this publish.
    #[must_use]
    pub fn is_tracked(&self) -> bool {
        self.rx.is_some()
    }

    /// Wait for the terminal outcome.
    pub async fn outcome(self) -> AckOutcome {
        match self.rx {
            None => AckOutcome::NotTracked,
            // Sender dropped without a verdict: the broker went away.
            Some(rx) => rx.await.unwrap_or(AckOutcome::Failed { retries: 0 }),
        }
    }

    /// Wait at most `timeout`; `None` if still pending.
    pub async fn outcome_timeout(self, timeout: Duration) -> Option<AckOutcome> {
        tokio::time::timeout(timeout, self.outcome()).await.ok()
    }
}

/// Entry in the broker's pending-ack table.
pub(crate) struct PendingAck {
    pub(crate) message: Arc<Message>,
    pub(crate) retries: Arc<AtomicU32>,
    pub(crate) cancel: CancellationToken,
    outcome: oneshot::Sender<AckOutcome>,
}

impl PendingAck {
    pub(crate) fn new(message: Arc<Message>) -> (Self, AckWaiter) {
        let (tx, rx) = oneshot::channel();
        let record = Self {
            message,
            retries: Arc::new(AtomicU32::new(0)),
            cancel: CancellationToken::new(),
            outcome: tx,
        };
        (record, AckWaiter::pending(rx))
    }

    pub(crate) fn retries(&self) -> u32 {
        self.retries.load(Ordering::Acquire)
    }

    /// Consume the record with its terminal outcome and stop its timer.
    pub(crate) fn resolve(self, outcome: AckOutcome) {
        self.cancel.cancel();
        // The publisher may have dropped its waiter.
        let _ = self.outcome.send(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use croupier_types::MessageType;

    #[test]
    fn test_fixed_backoff_is_constant() {
        let policy = AckPolicy::fixed(Duration::from_millis(100), 2);
        assert_eq!(policy.wait_for(0), Duration::from_millis(100));
        assert_eq!(policy.wait_for(2), Duration::from_millis(100));
        assert_eq!(policy.total_budget(), Duration::from_millis(300));
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let policy = AckPolicy {
            timeout: Duration::from_millis(100),
            max_retries: 10,
            backoff: Backoff::Exponential {
                factor: 2.0,
                max: Duration::from_secs(1),
            },
        };
        assert_eq!(policy.wait_for(0), Duration::from_millis(100));
        assert_eq!(policy.wait_for(1), Duration::from_millis(200));
        assert_eq!(policy.wait_for(10), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_waiter_receives_outcome() {
        let message = Arc::new(Message::builder(MessageType::custom("Ping"), "table-1").build());
        let (record, waiter) = PendingAck::new(message);
        assert!(waiter.is_tracked());

        record.retries.store(1, Ordering::Release);
        let retries = record.retries();
        record.resolve(AckOutcome::Acked { retries });

        assert_eq!(waiter.outcome().await, AckOutcome::Acked { retries: 1 });
    }

    #[tokio::test]
    async fn test_untracked_waiter() {
        let waiter = AckWaiter::not_tracked();
        assert!(!waiter.is_tracked());
        assert_eq!(waiter.outcome().await, AckOutcome::NotTracked);
    }
}
