//! # Croupier Lifecycle
//!
//! Cancellation scopes and ordered teardown for a Croupier node.
//!
//! - [`ExecutionContext`]: per-service token, task tracking and identity
//! - [`ShutdownCoordinator`]: Running → ShuttingDown → Completed, tiers by
//!   ascending priority, per-participant timeouts
//! - [`wait_for_shutdown_signal`]: OS signal trigger for `main`

pub mod context;
pub mod error;
pub mod participant;
pub mod shutdown;
pub mod signals;

pub use context::{ContextState, ExecutionContext};
pub use error::{ContextError, ShutdownError, ShutdownParticipantError, TeardownError};
pub use participant::{priority, FnParticipant, ShutdownParticipant};
pub use shutdown::{
    ParticipantOutcome, ShutdownConfig, ShutdownCoordinator, ShutdownHandle, ShutdownReport,
    ShutdownState, DEFAULT_PARTICIPANT_TIMEOUT,
};
pub use signals::{wait_for_shutdown_signal, ShutdownSignal};
