//! # Croupier Process Supervisor
//!
//! Runs services that live outside the node process: launches them from a
//! [`ProcessSpec`], streams their output, notices when they die, and stops
//! them (and everything they forked) on request or at shutdown.
//!
//! ```text
//! ProcessSpec ──► ProcessSupervisor ──► child (own process group)
//!                      │     ▲
//!      SupervisorEvent ┘     └── monitor: try_wait every interval
//! ```
//!
//! The supervisor is a [`croupier_lifecycle::ShutdownParticipant`]; its
//! teardown stops every process launched with `kill_on_dispose`.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod events;
pub mod output;
pub mod process;
pub mod supervisor;
mod terminate;

pub use error::SupervisorError;
pub use events::SupervisorEvent;
pub use output::{OutputSink, OutputStream, TracingSink};
pub use process::{ProcessHandle, ProcessId, ProcessInfo, ProcessSpec, ProcessState, StopOutcome};
pub use supervisor::{
    ProcessSupervisor, SupervisorConfig, DEFAULT_GRACE_PERIOD, DEFAULT_MONITOR_INTERVAL,
};
