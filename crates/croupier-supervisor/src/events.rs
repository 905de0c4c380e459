//! # Supervisor Events

use crate::output::OutputStream;
use crate::process::{ProcessId, ProcessState};

/// Lifecycle of managed processes, broadcast to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// A process was launched.
    Started {
        id: ProcessId,
        name: String,
        pid: Option<u32>,
    },
    /// A captured output line.
    Output {
        id: ProcessId,
        name: String,
        stream: OutputStream,
        line: String,
    },
    /// A process was stopped on request.
    Stopped {
        id: ProcessId,
        name: String,
        exit_code: Option<i32>,
        forced: bool,
    },
    /// The monitor found a process that exited on its own.
    ExitedUnexpectedly {
        id: ProcessId,
        name: String,
        exit_code: Option<i32>,
    },
}

impl SupervisorEvent {
    /// Service name of the process concerned.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Started { name, .. }
            | Self::Output { name, .. }
            | Self::Stopped { name, .. }
            | Self::ExitedUnexpectedly { name, .. } => name,
        }
    }

    /// Terminal state this event records, if any.
    #[must_use]
    pub fn terminal_state(&self) -> Option<ProcessState> {
        match self {
            Self::Stopped { .. } => Some(ProcessState::Killed),
            Self::ExitedUnexpectedly {
                exit_code: Some(0), ..
            } => Some(ProcessState::ExitedNormally),
            Self::ExitedUnexpectedly { .. } => Some(ProcessState::CrashedUnexpectedly),
            _ => None,
        }
    }
}
