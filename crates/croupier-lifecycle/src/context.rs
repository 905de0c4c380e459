//! # Execution Context
//!
//! A per-service cancellation scope. Each context owns one cancellation token
//! (normally a child of the shutdown coordinator's root token) and one
//! logical identity that is attached to every task it runs.
//!
//! ```text
//! ShutdownCoordinator ── root token
//!        │
//!        ├── ExecutionContext "lobby"   ── child token ── tasks…
//!        └── ExecutionContext "table-1" ── child token ── tasks…
//! ```
//!
//! ## Rules
//! - `run_async` / `spawn` fail with `ContextNotRunning` once stopped
//! - `stop` cancels the token exactly once, however often it is called
//! - `dispose` is idempotent and also runs on drop

use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, Instrument, Span};
use uuid::Uuid;

use crate::error::ContextError;

const RUNNING: u8 = 0;
const STOPPED: u8 = 1;
const DISPOSED: u8 = 2;

/// Observable state of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Accepting work.
    Running,
    /// Token cancelled; no new work.
    Stopped,
    /// Stopped and released.
    Disposed,
}

/// Cancellation and identity scope for one service.
pub struct ExecutionContext {
    id: Uuid,
    name: String,
    token: CancellationToken,
    tracker: TaskTracker,
    state: AtomicU8,
    span: Span,
}

impl ExecutionContext {
    /// Create a free-standing context with its own root token.
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_token(name.into(), CancellationToken::new())
    }

    /// Create a context whose token is a child of `parent`.
    ///
    /// Cancelling `parent` stops this context; stopping this context does
    /// not affect `parent`.
    pub fn with_parent(name: impl Into<String>, parent: &CancellationToken) -> Self {
        Self::from_token(name.into(), parent.child_token())
    }

    fn from_token(name: String, token: CancellationToken) -> Self {
        let id = Uuid::new_v4();
        let span = tracing::info_span!("context", name = %name, context_id = %id);
        debug!(context = %name, context_id = %id, "Execution context created");
        Self {
            id,
            name,
            token,
            tracker: TaskTracker::new(),
            state: AtomicU8::new(RUNNING),
            span,
        }
    }

    /// Unique id of this context.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Logical name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A clone of the context's token.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Current state. A cancelled parent shows up as `Stopped`.
    #[must_use]
    pub fn state(&self) -> ContextState {
        match self.state.load(Ordering::Acquire) {
            DISPOSED => ContextState::Disposed,
            STOPPED => ContextState::Stopped,
            _ if self.token.is_cancelled() => ContextState::Stopped,
            _ => ContextState::Running,
        }
    }

    /// Whether new work is accepted.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == ContextState::Running
    }

    fn ensure_running(&self) -> Result<(), ContextError> {
        if self.is_running() {
            Ok(())
        } else {
            Err(ContextError::NotRunning {
                name: self.name.clone(),
            })
        }
    }

    /// Run `action` bound to this context's token and await its result.
    ///
    /// The action receives the token and is expected to observe it.
    pub async fn run_async<F, Fut, T>(&self, action: F) -> Result<T, ContextError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = T>,
    {
        self.ensure_running()?;
        let fut = action(self.token.clone()).instrument(self.span.clone());
        Ok(self.tracker.track_future(fut).await)
    }

    /// Run `fut`, abandoning it as soon as the context is stopped.
    pub async fn run_cancellable<Fut, T>(&self, fut: Fut) -> Result<T, ContextError>
    where
        Fut: Future<Output = T>,
    {
        self.ensure_running()?;
        let fut = self.tracker.track_future(fut.instrument(self.span.clone()));
        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(ContextError::Cancelled {
                name: self.name.clone(),
            }),
            value = fut => Ok(value),
        }
    }

    /// Spawn `action` onto the runtime as a task owned by this context.
    pub fn spawn<F, Fut, T>(&self, action: F) -> Result<JoinHandle<T>, ContextError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.ensure_running()?;
        let fut = action(self.token.clone()).instrument(self.span.clone());
        Ok(self.tracker.spawn(fut))
    }

    /// Cancel the token. Returns `true` only for the call that cancelled.
    pub fn stop(&self) -> bool {
        let first = self
            .state
            .compare_exchange(RUNNING, STOPPED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if first {
            self.token.cancel();
            debug!(context = %self.name, "Execution context stopped");
        }
        first
    }

    /// Resolve once the context's token is cancelled (by `stop` or a parent).
    pub async fn stopped(&self) {
        self.token.cancelled().await;
    }

    /// Wait until every task run through this context has finished.
    ///
    /// Returns `false` if `timeout` elapsed first. Only meaningful after
    /// `stop`, since a running context can always accept more work.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        self.tracker.close();
        tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .is_ok()
    }

    /// Number of tasks still tracked.
    #[must_use]
    pub fn active_tasks(&self) -> usize {
        self.tracker.len()
    }

    /// Stop and release the context. Safe to call repeatedly.
    pub fn dispose(&self) {
        if self.state.swap(DISPOSED, Ordering::AcqRel) == DISPOSED {
            return;
        }
        self.token.cancel();
        self.tracker.close();
        debug!(context = %self.name, "Execution context disposed");
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}
