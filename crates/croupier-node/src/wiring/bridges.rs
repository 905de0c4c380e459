//! Event bridges: supervisor and registry events into bus messages and
//! gauges.

use croupier_bus::Broker;
use croupier_registry::ServiceRegistry;
use croupier_supervisor::{ProcessState, ProcessSupervisor, SupervisorEvent};
use croupier_telemetry::metrics::{REGISTRY_SERVICES, SUPERVISOR_EXITS, SUPERVISOR_PROCESSES};
use croupier_types::{headers, Message, MessageType};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Sender id of `ProcessExited` notices.
pub const SUPERVISOR_SENDER_ID: &str = "process-supervisor";

/// The broadcast announcing that a supervised process died on its own.
#[must_use]
pub fn process_exited_notice(name: &str, exit_code: Option<i32>) -> Message {
    let mut builder = Message::builder(MessageType::ProcessExited, SUPERVISOR_SENDER_ID)
        .payload(name)
        .header(headers::SERVICE_NAME, name);
    if let Some(code) = exit_code {
        builder = builder.header(headers::EXIT_CODE, code.to_string());
    }
    builder.build()
}

/// Forward unexpected exits onto the bus and keep the supervisor metrics
/// current. Runs until `token` is cancelled.
pub fn spawn_process_exit_bridge(
    supervisor: &ProcessSupervisor,
    broker: Broker,
    token: CancellationToken,
) -> JoinHandle<()> {
    let mut events = supervisor.events();
    let supervisor = supervisor.clone();
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                () = token.cancelled() => break,
                event = events.recv() => event,
            };
            match event {
                Ok(event) => on_supervisor_event(&supervisor, &broker, &event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Supervisor event bridge lagged");
                    SUPERVISOR_PROCESSES.set(supervisor.process_count() as f64);
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("Supervisor event bridge stopped");
    })
}

fn on_supervisor_event(supervisor: &ProcessSupervisor, broker: &Broker, event: &SupervisorEvent) {
    match event {
        SupervisorEvent::Output { .. } => return,
        SupervisorEvent::Started { .. } => {}
        SupervisorEvent::Stopped { .. } => {
            SUPERVISOR_EXITS.with_label_values(&["stopped"]).inc();
        }
        SupervisorEvent::ExitedUnexpectedly {
            name, exit_code, ..
        } => {
            let kind = match event.terminal_state() {
                Some(ProcessState::ExitedNormally) => "exited",
                _ => "crashed",
            };
            SUPERVISOR_EXITS.with_label_values(&[kind]).inc();
            if let Err(e) = broker.publish(process_exited_notice(name, *exit_code)) {
                debug!(service = %name, "ProcessExited not published: {e}");
            }
        }
    }
    SUPERVISOR_PROCESSES.set(supervisor.process_count() as f64);
}

/// Keep `croupier_registry_services` equal to the registry size. Runs until
/// `token` is cancelled.
pub fn spawn_registry_gauge(registry: &ServiceRegistry, token: CancellationToken) -> JoinHandle<()> {
    let mut events = registry.events();
    let registry = registry.clone();
    tokio::spawn(async move {
        REGISTRY_SERVICES.set(registry.len() as f64);
        loop {
            let event = tokio::select! {
                () = token.cancelled() => break,
                event = events.recv() => event,
            };
            match event {
                Ok(_) | Err(RecvError::Lagged(_)) => {
                    REGISTRY_SERVICES.set(registry.len() as f64);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
