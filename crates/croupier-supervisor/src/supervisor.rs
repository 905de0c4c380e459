//! # Process Supervisor
//!
//! Launches external services, watches them, and guarantees they are gone
//! when asked to stop.
//!
//! ```text
//! start_process ──► spawn (own process group) ──► table[id] ──► Started
//!                          │
//!                          ├── stdout/stderr readers ──► OutputSink + Output
//!                          │
//! monitor tick ── try_wait ┴─ exited? ──► remove ──► ExitedUnexpectedly
//!
//! stop_process ──► remove ──► SIGTERM(group) ──► grace ──► SIGKILL(group)
//! ```
//!
//! ## Rules
//! - An entry is removed before its process is signalled, so the monitor
//!   never reports a requested stop as unexpected
//! - `stop_process` always removes the entry, whatever the kill outcome
//! - `dispose` stops only processes launched with `kill_on_dispose`

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use croupier_lifecycle::{ShutdownParticipant, TeardownError};
use dashmap::DashMap;
use futures::future::join_all;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::SupervisorError;
use crate::events::SupervisorEvent;
use crate::output::{OutputSink, OutputStream, TracingSink};
use crate::process::{
    ManagedProcess, ProcessHandle, ProcessId, ProcessInfo, ProcessSpec, ProcessState, StopOutcome,
};
use crate::terminate::terminate;

/// Default interval between exit checks.
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_millis(500);

/// Default time a process gets between SIGTERM and SIGKILL.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(3);

/// Supervisor tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// How often the monitor polls for exited children.
    pub monitor_interval: Duration,
    /// SIGTERM to SIGKILL escalation delay.
    pub grace_period: Duration,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            monitor_interval: DEFAULT_MONITOR_INTERVAL,
            grace_period: DEFAULT_GRACE_PERIOD,
            event_capacity: 256,
        }
    }
}

/// Owner of every external process the node launched.
///
/// Cheap to clone; clones share the process table. Must be created inside a
/// Tokio runtime, since it spawns its monitor task immediately.
#[derive(Clone)]
pub struct ProcessSupervisor {
    inner: Arc<SupervisorInner>,
}

struct SupervisorInner {
    config: SupervisorConfig,
    processes: DashMap<ProcessId, ManagedProcess>,
    next_id: AtomicU64,
    sink: Arc<dyn OutputSink>,
    events: broadcast::Sender<SupervisorEvent>,
    monitor: CancellationToken,
    disposed: AtomicBool,
}

impl ProcessSupervisor {
    /// Supervisor that forwards captured output to `tracing`.
    pub fn new(config: SupervisorConfig) -> Self {
        Self::with_sink(config, Arc::new(TracingSink))
    }

    /// Supervisor with a custom output sink.
    pub fn with_sink(config: SupervisorConfig, sink: Arc<dyn OutputSink>) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let inner = Arc::new(SupervisorInner {
            config,
            processes: DashMap::new(),
            next_id: AtomicU64::new(0),
            sink,
            events,
            monitor: CancellationToken::new(),
            disposed: AtomicBool::new(false),
        });

        tokio::spawn(run_monitor(
            Arc::downgrade(&inner),
            config.monitor_interval,
            inner.monitor.clone(),
        ));

        Self { inner }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &SupervisorConfig {
        &self.inner.config
    }

    /// Launch `spec` and start tracking it.
    ///
    /// The child gets its own process group and is killed if the supervisor
    /// is dropped, unless it opted out of `kill_on_dispose`.
    pub fn start_process(&self, spec: ProcessSpec) -> Result<ProcessHandle, SupervisorError> {
        if self.inner.disposed.load(Ordering::Acquire) {
            return Err(SupervisorError::Disposed);
        }

        let mut command = Command::new(&spec.command);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .kill_on_drop(spec.kill_on_dispose);
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }
        if spec.capture_output {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
        }
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|e| {
            error!(
                service = %spec.name,
                command = %spec.command,
                "[Supervisor] ✗ Failed to launch: {e}"
            );
            SupervisorError::Launch {
                name: spec.name.clone(),
                reason: e.to_string(),
            }
        })?;

        let id = ProcessId::new(self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let pid = child.id();
        if spec.capture_output {
            self.inner.attach_readers(id, &spec.name, &mut child);
        }

        self.inner.processes.insert(
            id,
            ManagedProcess {
                name: spec.name.clone(),
                pid,
                started_at: Utc::now(),
                kill_on_dispose: spec.kill_on_dispose,
                child: Arc::new(Mutex::new(child)),
            },
        );

        info!(service = %spec.name, %id, ?pid, "[Supervisor] ✓ Process started");
        let _ = self.inner.events.send(SupervisorEvent::Started {
            id,
            name: spec.name.clone(),
            pid,
        });

        Ok(ProcessHandle {
            id,
            name: spec.name,
            pid,
        })
    }

    /// Stop one process: SIGTERM, grace period, SIGKILL. The entry is gone
    /// once this returns, even if signalling failed.
    pub async fn stop_process(&self, id: ProcessId) -> Result<StopOutcome, SupervisorError> {
        let (_, process) = self
            .inner
            .processes
            .remove(&id)
            .ok_or(SupervisorError::UnknownProcess { id })?;
        Ok(self.inner.stop_removed(id, process).await)
    }

    /// Stop every process launched under `name`. Returns how many were stopped.
    pub async fn stop_processes_by_name(&self, name: &str) -> usize {
        self.inner.stop_matching(|p| p.name == name).await
    }

    /// Stop every tracked process.
    pub async fn stop_all_processes(&self) -> usize {
        self.inner.stop_matching(|_| true).await
    }

    /// Stop the `kill_on_dispose` processes concurrently and refuse further
    /// launches. Processes that opted out stay tracked and keep running.
    pub async fn dispose(&self) -> usize {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return 0;
        }
        let stopped = self.inner.stop_matching(|p| p.kill_on_dispose).await;
        info!(
            stopped,
            remaining = self.inner.processes.len(),
            "[Supervisor] ✓ Disposed"
        );
        stopped
    }

    /// Whether `dispose` has run.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// `Running` while tracked, `Removed` otherwise.
    #[must_use]
    pub fn status(&self, id: ProcessId) -> ProcessState {
        if self.inner.processes.contains_key(&id) {
            ProcessState::Running
        } else {
            ProcessState::Removed
        }
    }

    /// Snapshot of every tracked process, ordered by id.
    #[must_use]
    pub fn processes(&self) -> Vec<ProcessInfo> {
        let mut list: Vec<_> = self
            .inner
            .processes
            .iter()
            .map(|entry| entry.value().info(*entry.key()))
            .collect();
        list.sort_by_key(|info| info.id);
        list
    }

    /// Number of tracked processes.
    #[must_use]
    pub fn process_count(&self) -> usize {
        self.inner.processes.len()
    }

    /// Subscribe to lifecycle events.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.inner.events.subscribe()
    }
}

impl std::fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("processes", &self.inner.processes.len())
            .field("disposed", &self.is_disposed())
            .field("config", &self.inner.config)
            .finish()
    }
}

#[async_trait]
impl ShutdownParticipant for ProcessSupervisor {
    async fn teardown(&self) -> Result<(), TeardownError> {
        self.dispose().await;
        Ok(())
    }
}

impl SupervisorInner {
    fn attach_readers(&self, id: ProcessId, name: &str, child: &mut Child) {
        if let Some(stdout) = child.stdout.take() {
            self.spawn_reader(id, name, OutputStream::Stdout, stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            self.spawn_reader(id, name, OutputStream::Stderr, stderr);
        }
    }

    fn spawn_reader<R>(&self, id: ProcessId, name: &str, stream: OutputStream, reader: R)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let sink = Arc::clone(&self.sink);
        let events = self.events.clone();
        let name = name.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        sink.line(&name, stream, &line);
                        let _ = events.send(SupervisorEvent::Output {
                            id,
                            name: name.clone(),
                            stream,
                            line,
                        });
                    }
                    Ok(None) => break,
                    Err(e) => {
                        debug!(service = %name, %stream, "Output reader stopped: {e}");
                        break;
                    }
                }
            }
        });
    }

    async fn stop_removed(&self, id: ProcessId, process: ManagedProcess) -> StopOutcome {
        debug!(service = %process.name, %id, "[Supervisor] Stopping process");
        let outcome = {
            let mut child = process.child.lock().await;
            terminate(&mut child, process.pid, self.config.grace_period).await
        };

        info!(
            service = %process.name,
            %id,
            exit_code = ?outcome.exit_code,
            forced = outcome.forced,
            "[Supervisor] ✓ Process stopped"
        );
        let _ = self.events.send(SupervisorEvent::Stopped {
            id,
            name: process.name,
            exit_code: outcome.exit_code,
            forced: outcome.forced,
        });
        outcome
    }

    async fn stop_matching<F>(&self, predicate: F) -> usize
    where
        F: Fn(&ManagedProcess) -> bool,
    {
        let ids: Vec<ProcessId> = self
            .processes
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| *entry.key())
            .collect();

        let removed: Vec<_> = ids
            .into_iter()
            .filter_map(|id| self.processes.remove(&id))
            .collect();
        let count = removed.len();

        join_all(
            removed
                .into_iter()
                .map(|(id, process)| self.stop_removed(id, process)),
        )
        .await;
        count
    }

    /// Reap children that exited on their own.
    fn poll_exits(&self) {
        let candidates: Vec<_> = self
            .processes
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(&entry.value().child)))
            .collect();

        for (id, child) in candidates {
            // Locked means a stop is in progress.
            let Ok(mut guard) = child.try_lock() else {
                continue;
            };
            let status = match guard.try_wait() {
                Ok(Some(status)) => status,
                Ok(None) => continue,
                Err(e) => {
                    warn!(%id, "[Supervisor] ✗ Failed to poll child: {e}");
                    continue;
                }
            };
            drop(guard);

            let Some((_, process)) = self.processes.remove(&id) else {
                continue;
            };
            // Orphans of a crashed leader. The group id stays reserved while
            // any of them lives; with none left this lands on ESRCH unless
            // the id was reused in between.
            #[cfg(unix)]
            crate::terminate::signal_group(process.pid, nix::sys::signal::Signal::SIGKILL);

            let exit_code = status.code();
            warn!(
                service = %process.name,
                %id,
                ?exit_code,
                "[Supervisor] ✗ Process exited unexpectedly ({status})"
            );
            let _ = self.events.send(SupervisorEvent::ExitedUnexpectedly {
                id,
                name: process.name,
                exit_code,
            });
        }
    }
}

impl Drop for SupervisorInner {
    fn drop(&mut self) {
        self.monitor.cancel();
    }
}

async fn run_monitor(inner: Weak<SupervisorInner>, interval: Duration, token: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.poll_exits();
    }
    debug!("[Supervisor] Monitor stopped");
}
