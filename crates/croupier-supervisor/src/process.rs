//! # Process Specs and Snapshots

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::process::Child;
use tokio::sync::Mutex;

/// Supervisor-assigned identifier of a managed process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(u64);

impl ProcessId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Numeric value.
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proc-{}", self.0)
    }
}

/// Lifecycle state of a supervised process.
///
/// ```text
/// Starting ──► Running ──┬──► ExitedNormally       (monitor, code 0)
///                        ├──► CrashedUnexpectedly  (monitor, other)
///                        └──► Killed               (stop request)
///                                 │
///                  all terminal ──┴──► Removed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessState {
    /// Spawn in progress.
    Starting,
    /// Alive and tracked.
    Running,
    /// Exited on its own with status 0.
    ExitedNormally,
    /// Stopped by the supervisor.
    Killed,
    /// Exited on its own with a failure status or signal.
    CrashedUnexpectedly,
    /// No longer tracked.
    Removed,
}

impl ProcessState {
    /// Whether the process is no longer alive.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Starting | Self::Running)
    }
}

/// Everything needed to launch one external service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub(crate) name: String,
    pub(crate) command: String,
    pub(crate) args: Vec<String>,
    pub(crate) working_dir: Option<PathBuf>,
    pub(crate) env: BTreeMap<String, String>,
    pub(crate) capture_output: bool,
    pub(crate) kill_on_dispose: bool,
}

impl ProcessSpec {
    /// A spec running `command` under the service name `name`.
    ///
    /// Output is captured and the process is killed when the supervisor is
    /// disposed unless the builder says otherwise.
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
            capture_output: true,
            kill_on_dispose: true,
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Working directory of the child.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set one environment variable on top of the inherited environment.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Pipe stdout/stderr through the output sink (`true`) or let the child
    /// inherit the node's streams (`false`).
    #[must_use]
    pub fn capture_output(mut self, capture: bool) -> Self {
        self.capture_output = capture;
        self
    }

    /// Stop this process when the supervisor is disposed.
    #[must_use]
    pub fn kill_on_dispose(mut self, kill: bool) -> Self {
        self.kill_on_dispose = kill;
        self
    }

    /// Service name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Executable.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Arguments.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }
}

/// Returned by a successful launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    /// Supervisor id.
    pub id: ProcessId,
    /// Service name.
    pub name: String,
    /// OS process id, when the platform reports one.
    pub pid: Option<u32>,
}

/// Point-in-time view of one tracked process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub id: ProcessId,
    pub name: String,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
    pub kill_on_dispose: bool,
    pub state: ProcessState,
}

/// How a stop request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopOutcome {
    /// Exit code, `None` when terminated by a signal.
    pub exit_code: Option<i32>,
    /// Whether the grace period ran out and SIGKILL was needed.
    pub forced: bool,
}

/// Table entry for a live child.
pub(crate) struct ManagedProcess {
    pub(crate) name: String,
    pub(crate) pid: Option<u32>,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) kill_on_dispose: bool,
    pub(crate) child: Arc<Mutex<Child>>,
}

impl ManagedProcess {
    pub(crate) fn info(&self, id: ProcessId) -> ProcessInfo {
        ProcessInfo {
            id,
            name: self.name.clone(),
            pid: self.pid,
            started_at: self.started_at,
            kill_on_dispose: self.kill_on_dispose,
            state: ProcessState::Running,
        }
    }
}
