//! # Process Supervision
//!
//! External processes under the supervisor, checked from the outside:
//! process-group teardown, launch environment, and disposal through the
//! shutdown coordinator.

#[cfg(all(test, unix))]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use croupier_lifecycle::{priority, ShutdownCoordinator};
    use croupier_supervisor::{
        ProcessSpec, ProcessState, ProcessSupervisor, SupervisorConfig, SupervisorEvent,
    };
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    use tokio::sync::broadcast;
    use tokio::time::{sleep, timeout, Instant};

    const WAIT: Duration = Duration::from_secs(5);

    fn supervisor() -> ProcessSupervisor {
        ProcessSupervisor::new(SupervisorConfig {
            monitor_interval: Duration::from_millis(20),
            grace_period: Duration::from_millis(500),
            ..SupervisorConfig::default()
        })
    }

    async fn next_event(
        events: &mut broadcast::Receiver<SupervisorEvent>,
        matches: impl Fn(&SupervisorEvent) -> bool,
    ) -> SupervisorEvent {
        timeout(WAIT, async {
            loop {
                let event = events.recv().await.unwrap();
                if matches(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("timeout waiting for supervisor event")
    }

    /// Alive and not a zombie awaiting a reaper.
    fn is_running(pid: i32) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => stat
                .rsplit_once(')')
                .and_then(|(_, rest)| rest.trim_start().chars().next())
                .is_some_and(|state| state != 'Z'),
            Err(_) if std::path::Path::new("/proc/self").exists() => false,
            Err(_) => kill(Pid::from_raw(pid), None).is_ok(),
        }
    }

    async fn gone(pid: i32) -> bool {
        let deadline = Instant::now() + WAIT;
        while Instant::now() < deadline {
            if !is_running(pid) {
                return true;
            }
            sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_stop_takes_down_grandchildren() {
        let supervisor = supervisor();
        let mut events = supervisor.events();

        let handle = supervisor
            .start_process(
                ProcessSpec::new("dealer", "sh").args(["-c", "sleep 30 & echo $!; wait"]),
            )
            .unwrap();

        let SupervisorEvent::Output { line, .. } =
            next_event(&mut events, |e| matches!(e, SupervisorEvent::Output { .. })).await
        else {
            unreachable!()
        };
        let grandchild: i32 = line.trim().parse().unwrap();
        assert!(is_running(grandchild));

        supervisor.stop_process(handle.id).await.unwrap();

        assert!(gone(grandchild).await, "grandchild {grandchild} survived");
        assert_eq!(supervisor.status(handle.id), ProcessState::Removed);
    }

    #[tokio::test]
    async fn test_forced_stop_takes_down_term_ignoring_grandchildren() {
        let supervisor = supervisor();
        let mut events = supervisor.events();

        // The grandchild inherits the ignored TERM, so only SIGKILL ends it.
        let handle = supervisor
            .start_process(
                ProcessSpec::new("stubborn", "sh")
                    .args(["-c", "trap '' TERM; sleep 30 & echo $!; wait"]),
            )
            .unwrap();

        let SupervisorEvent::Output { line, .. } =
            next_event(&mut events, |e| matches!(e, SupervisorEvent::Output { .. })).await
        else {
            unreachable!()
        };
        let grandchild: i32 = line.trim().parse().unwrap();
        assert!(is_running(grandchild));

        let outcome = supervisor.stop_process(handle.id).await.unwrap();

        assert!(outcome.forced);
        assert!(gone(grandchild).await, "grandchild {grandchild} survived");
    }

    #[tokio::test]
    async fn test_launch_environment() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = supervisor();
        let mut events = supervisor.events();

        let handle = supervisor
            .start_process(
                ProcessSpec::new("cashier", "sh")
                    .args(["-c", "echo \"$TABLE_ID\" > table.txt"])
                    .working_dir(dir.path())
                    .env("TABLE_ID", "7"),
            )
            .unwrap();

        let exited = next_event(&mut events, |e| {
            matches!(e, SupervisorEvent::ExitedUnexpectedly { id, .. } if *id == handle.id)
        })
        .await;
        assert_eq!(exited.terminal_state(), Some(ProcessState::ExitedNormally));

        let written = std::fs::read_to_string(dir.path().join("table.txt")).unwrap();
        assert_eq!(written.trim(), "7");
    }

    #[tokio::test]
    async fn test_coordinator_disposes_supervisor() {
        let coordinator = ShutdownCoordinator::new();
        let supervisor = supervisor();
        coordinator
            .register_participant(
                "process-supervisor",
                priority::PROCESS_SUPERVISOR,
                Arc::new(supervisor.clone()),
            )
            .unwrap();

        let owned = supervisor
            .start_process(ProcessSpec::new("dealer", "sleep").arg("30"))
            .unwrap();
        let detached = supervisor
            .start_process(
                ProcessSpec::new("archiver", "sleep")
                    .arg("30")
                    .kill_on_dispose(false),
            )
            .unwrap();

        let report = coordinator
            .initiate_shutdown("test", None)
            .wait_timeout(WAIT)
            .await
            .unwrap();
        assert!(report.is_clean());

        assert!(supervisor.is_disposed());
        assert_eq!(supervisor.status(owned.id), ProcessState::Removed);
        assert_eq!(supervisor.status(detached.id), ProcessState::Running);
        assert!(supervisor.start_process(ProcessSpec::new("late", "true")).is_err());

        // Opted-out processes are still ours to stop.
        let outcome = supervisor.stop_process(detached.id).await.unwrap();
        assert!(!outcome.forced);
        assert_eq!(supervisor.process_count(), 0);
    }
}
