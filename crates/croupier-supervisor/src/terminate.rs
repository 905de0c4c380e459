//! Stop sequence: SIGTERM to the process group, bounded wait, SIGKILL.
//!
//! Children are launched as leaders of their own process group, so
//! signalling the group reaches anything they forked as well. A stop only
//! signals the group before the leader is reaped.

use std::time::Duration;

use tokio::process::Child;
use tracing::{debug, warn};

use crate::process::StopOutcome;

#[cfg(unix)]
pub(crate) use unix::signal_group;

#[cfg(unix)]
mod unix {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;
    use tracing::warn;

    /// Send `signal` to the group led by `pid`. A group that is already gone
    /// is not an error.
    pub(crate) fn signal_group(pid: Option<u32>, signal: Signal) {
        let Some(pgid) = pid.and_then(|p| i32::try_from(p).ok()).filter(|&p| p > 0) else {
            return;
        };
        match killpg(Pid::from_raw(pgid), signal) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => warn!(pgid, ?signal, "[Supervisor] ✗ Failed to signal process group: {e}"),
        }
    }
}

/// Terminate `child` and reap it. Never fails: every error path ends in a
/// kill attempt, and the caller has already dropped its table entry.
pub(crate) async fn terminate(child: &mut Child, pid: Option<u32>, grace: Duration) -> StopOutcome {
    #[cfg(unix)]
    signal_group(pid, nix::sys::signal::Signal::SIGTERM);
    #[cfg(not(unix))]
    if let Err(e) = child.start_kill() {
        debug!(?pid, "start_kill failed: {e}");
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => StopOutcome {
            exit_code: status.code(),
            forced: false,
        },
        Ok(Err(e)) => {
            warn!(?pid, "[Supervisor] ✗ Waiting for child failed: {e}");
            force_kill(child, pid).await
        }
        Err(_) => {
            debug!(?pid, ?grace, "Grace period elapsed, escalating to SIGKILL");
            force_kill(child, pid).await
        }
    }
}

/// SIGKILL the group while the leader is still unreaped, so its pid (and
/// with it the group id) cannot have been handed to another process yet.
async fn force_kill(child: &mut Child, pid: Option<u32>) -> StopOutcome {
    #[cfg(unix)]
    signal_group(pid, nix::sys::signal::Signal::SIGKILL);

    if let Err(e) = child.kill().await {
        debug!(?pid, "kill after group SIGKILL: {e}");
    }
    StopOutcome {
        exit_code: child.try_wait().ok().flatten().and_then(|s| s.code()),
        forced: true,
    }
}
