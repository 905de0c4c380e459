//! # Shutdown Coordinator
//!
//! Global sequencer for node teardown.
//!
//! ## State Machine
//!
//! ```text
//! Running ──initiate_shutdown()──→ ShuttingDown ──last tier done──→ Completed
//!    │                                  │
//!    └─ register_participant() OK       └─ register_participant() → AlreadyShuttingDown
//! ```
//!
//! ## Sequence
//!
//! 1. Cancel the root token (every derived execution context stops)
//! 2. Snapshot the participant list (registrations now fail)
//! 3. Group by ascending priority; tiers run one after another
//! 4. Participants inside a tier run concurrently, each bounded by the
//!    per-participant timeout
//! 5. Failures, panics and timeouts are logged and recorded, never fatal
//! 6. Enter `Completed` and publish the [`ShutdownReport`]
//!
//! A second `initiate_shutdown` returns the handle of the sequence already in
//! flight instead of starting another one.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::context::ExecutionContext;
use crate::error::{ShutdownError, ShutdownParticipantError, TeardownError};
use crate::participant::{FnParticipant, ShutdownParticipant};

/// Default per-participant teardown budget.
pub const DEFAULT_PARTICIPANT_TIMEOUT: Duration = Duration::from_secs(5);

/// Coordinator configuration.
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Budget for a single participant's teardown.
    pub participant_timeout: Duration,
    /// Budget for the whole sequence, used when `initiate_shutdown` is not
    /// given one. `None` means unbounded.
    pub overall_timeout: Option<Duration>,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            participant_timeout: DEFAULT_PARTICIPANT_TIMEOUT,
            overall_timeout: None,
        }
    }
}

/// Coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    /// Accepting registrations.
    Running,
    /// Teardown sequence in flight.
    ShuttingDown,
    /// Sequence finished (terminal).
    Completed,
}

/// Result of one participant's teardown.
#[derive(Debug, Clone)]
pub struct ParticipantOutcome {
    /// Participant id.
    pub participant_id: String,
    /// Priority it was registered under.
    pub priority: i32,
    /// Time spent in teardown.
    pub elapsed: Duration,
    /// `Ok` when teardown completed cleanly.
    pub result: Result<(), ShutdownParticipantError>,
}

/// Summary of a finished shutdown sequence.
#[derive(Debug, Clone)]
pub struct ShutdownReport {
    /// Reason passed to `initiate_shutdown`.
    pub reason: String,
    /// Total time from initiation to completion.
    pub elapsed: Duration,
    /// Outcomes in the order participants finished their tier.
    pub outcomes: Vec<ParticipantOutcome>,
}

impl ShutdownReport {
    /// Participants that did not tear down cleanly.
    pub fn failures(&self) -> impl Iterator<Item = &ShutdownParticipantError> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().err())
    }

    /// Whether every participant tore down cleanly.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Completion handle for an in-flight shutdown.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    rx: watch::Receiver<Option<Arc<ShutdownReport>>>,
}

impl ShutdownHandle {
    /// Wait for the sequence to finish.
    ///
    /// Returns `None` only if the sequence task vanished without reporting.
    pub async fn wait(&self) -> Option<Arc<ShutdownReport>> {
        let mut rx = self.rx.clone();
        let report = match rx.wait_for(Option::is_some).await {
            Ok(report) => (*report).clone(),
            Err(_) => None,
        };
        report
    }

    /// Wait at most `timeout` for the sequence to finish.
    pub async fn wait_timeout(&self, timeout: Duration) -> Option<Arc<ShutdownReport>> {
        tokio::time::timeout(timeout, self.wait()).await.ok().flatten()
    }

    /// The report, if the sequence already finished.
    #[must_use]
    pub fn report(&self) -> Option<Arc<ShutdownReport>> {
        self.rx.borrow().clone()
    }

    /// Whether the sequence already finished.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.rx.borrow().is_some()
    }
}

struct Entry {
    id: String,
    priority: i32,
    participant: Arc<dyn ShutdownParticipant>,
}

struct Inner {
    state: ShutdownState,
    participants: Vec<Entry>,
    handle: Option<ShutdownHandle>,
}

/// Priority-ordered teardown sequencer.
pub struct ShutdownCoordinator {
    config: ShutdownConfig,
    root: CancellationToken,
    inner: Arc<Mutex<Inner>>,
}

impl ShutdownCoordinator {
    /// Create a coordinator with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ShutdownConfig::default())
    }

    /// Create a coordinator with explicit configuration.
    #[must_use]
    pub fn with_config(config: ShutdownConfig) -> Self {
        Self {
            config,
            root: CancellationToken::new(),
            inner: Arc::new(Mutex::new(Inner {
                state: ShutdownState::Running,
                participants: Vec::new(),
                handle: None,
            })),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ShutdownState {
        self.inner.lock().state
    }

    /// Whether shutdown has begun (or finished).
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.state() != ShutdownState::Running
    }

    /// The root token cancelled when shutdown begins.
    #[must_use]
    pub fn root_token(&self) -> CancellationToken {
        self.root.clone()
    }

    /// Create an execution context linked to the root token.
    pub fn create_context(&self, name: impl Into<String>) -> ExecutionContext {
        ExecutionContext::with_parent(name, &self.root)
    }

    /// Number of registered participants (zero once shutdown took the snapshot).
    #[must_use]
    pub fn participant_count(&self) -> usize {
        self.inner.lock().participants.len()
    }

    /// Register a participant.
    ///
    /// # Errors
    ///
    /// - `AlreadyShuttingDown` once the coordinator left `Running`
    /// - `DuplicateParticipantId` if `id` is taken
    pub fn register_participant(
        &self,
        id: impl Into<String>,
        priority: i32,
        participant: Arc<dyn ShutdownParticipant>,
    ) -> Result<(), ShutdownError> {
        let id = id.into();
        let mut inner = self.inner.lock();

        if inner.state != ShutdownState::Running {
            warn!(participant = %id, "[Shutdown] Registration rejected, shutdown in progress");
            return Err(ShutdownError::AlreadyShuttingDown { participant_id: id });
        }
        if inner.participants.iter().any(|e| e.id == id) {
            return Err(ShutdownError::DuplicateParticipantId { participant_id: id });
        }

        debug!(participant = %id, priority, "[Shutdown] Participant registered");
        inner.participants.push(Entry {
            id,
            priority,
            participant,
        });
        Ok(())
    }

    /// Register a closure as a participant.
    pub fn register_fn<F, Fut>(
        &self,
        id: impl Into<String>,
        priority: i32,
        teardown: F,
    ) -> Result<(), ShutdownError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), TeardownError>> + Send + 'static,
    {
        self.register_participant(id, priority, Arc::new(FnParticipant::new(teardown)))
    }

    /// Remove a participant before shutdown. Returns whether it was present.
    ///
    /// Once shutdown began the snapshot is owned by the sequence and this
    /// always returns `false`.
    pub fn deregister_participant(&self, id: &str) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != ShutdownState::Running {
            return false;
        }
        let before = inner.participants.len();
        inner.participants.retain(|e| e.id != id);
        before != inner.participants.len()
    }

    /// Begin the shutdown sequence, or join the one already in flight.
    ///
    /// `overall_timeout` overrides the configured overall budget; tiers that
    /// have not started by the deadline are skipped.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime. The coordinator is left
    /// untouched in that case.
    pub fn initiate_shutdown(
        &self,
        reason: impl Into<String>,
        overall_timeout: Option<Duration>,
    ) -> ShutdownHandle {
        let runtime = tokio::runtime::Handle::current();
        let reason = reason.into();
        let mut inner = self.inner.lock();

        if let Some(handle) = &inner.handle {
            debug!(reason = %reason, "[Shutdown] Already in progress, joining");
            return handle.clone();
        }

        inner.state = ShutdownState::ShuttingDown;
        let snapshot = std::mem::take(&mut inner.participants);
        let (tx, rx) = watch::channel(None);
        let handle = ShutdownHandle { rx };
        inner.handle = Some(handle.clone());
        drop(inner);

        info!(
            reason = %reason,
            participants = snapshot.len(),
            "[Shutdown] Initiating shutdown"
        );
        self.root.cancel();

        let inner = Arc::clone(&self.inner);
        let per_participant = self.config.participant_timeout;
        let overall = overall_timeout.or(self.config.overall_timeout);

        runtime.spawn(async move {
            let report = run_sequence(reason, snapshot, per_participant, overall).await;
            inner.lock().state = ShutdownState::Completed;
            info!(
                elapsed_ms = report.elapsed.as_millis() as u64,
                failures = report.failures().count(),
                "[Shutdown] Completed"
            );
            tx.send_replace(Some(Arc::new(report)));
        });

        handle
    }

    /// Wait for the sequence to finish.
    ///
    /// Returns `true` immediately if shutdown never started, otherwise
    /// whether it finished within `timeout` (unbounded when `None`).
    pub async fn wait_for_completion(&self, timeout: Option<Duration>) -> bool {
        let handle = match &self.inner.lock().handle {
            None => return true,
            Some(handle) => handle.clone(),
        };
        match timeout {
            Some(timeout) => handle.wait_timeout(timeout).await.is_some(),
            None => handle.wait().await.is_some(),
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_sequence(
    reason: String,
    participants: Vec<Entry>,
    per_participant: Duration,
    overall: Option<Duration>,
) -> ShutdownReport {
    let started = Instant::now();
    let deadline = overall.map(|d| started + d);

    let mut tiers: BTreeMap<i32, Vec<Entry>> = BTreeMap::new();
    for entry in participants {
        tiers.entry(entry.priority).or_default().push(entry);
    }

    let mut outcomes = Vec::new();
    for (priority, tier) in tiers {
        let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
        if remaining == Some(Duration::ZERO) {
            for entry in tier {
                warn!(participant = %entry.id, priority, "[Shutdown] Skipped, deadline exceeded");
                outcomes.push(ParticipantOutcome {
                    result: Err(ShutdownParticipantError::Skipped {
                        participant_id: entry.id.clone(),
                    }),
                    participant_id: entry.id,
                    priority,
                    elapsed: Duration::ZERO,
                });
            }
            continue;
        }

        let budget = remaining.map_or(per_participant, |r| r.min(per_participant));
        debug!(priority, participants = tier.len(), "[Shutdown] Starting tier");
        let results = join_all(tier.into_iter().map(|e| teardown_one(e, budget))).await;
        outcomes.extend(results);
    }

    ShutdownReport {
        reason,
        elapsed: started.elapsed(),
        outcomes,
    }
}

async fn teardown_one(entry: Entry, budget: Duration) -> ParticipantOutcome {
    let started = Instant::now();
    let teardown = AssertUnwindSafe(entry.participant.teardown()).catch_unwind();

    let result = match tokio::time::timeout(budget, teardown).await {
        Ok(Ok(Ok(()))) => {
            info!(participant = %entry.id, "[Shutdown] ✓ Torn down");
            Ok(())
        }
        Ok(Ok(Err(source))) => {
            error!(participant = %entry.id, error = %source, "[Shutdown] ✗ Teardown failed");
            Err(ShutdownParticipantError::Failed {
                participant_id: entry.id.clone(),
                source,
            })
        }
        Ok(Err(_)) => {
            error!(participant = %entry.id, "[Shutdown] ✗ Teardown panicked");
            Err(ShutdownParticipantError::Panicked {
                participant_id: entry.id.clone(),
            })
        }
        Err(_) => {
            warn!(
                participant = %entry.id,
                budget_ms = budget.as_millis() as u64,
                "[Shutdown] ✗ Teardown timed out, skipping"
            );
            Err(ShutdownParticipantError::TimedOut {
                participant_id: entry.id.clone(),
                after: budget,
            })
        }
    };

    ParticipantOutcome {
        participant_id: entry.id,
        priority: entry.priority,
        elapsed: started.elapsed(),
        result,
    }
}
