//! # Heartbeat Task
//!
//! Publishes a service's heartbeat on the registry's interval until the
//! service's execution context stops or the service is deregistered.

use std::time::Duration;

use croupier_lifecycle::{ContextError, ExecutionContext};
use croupier_types::ErrorKind;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::registry::ServiceRegistry;

/// Handle to a running heartbeat loop.
pub struct HeartbeatTask {
    handle: JoinHandle<()>,
}

impl HeartbeatTask {
    /// Start heart-beating for `service_id` inside `context`.
    ///
    /// # Errors
    ///
    /// `ContextNotRunning` if the context was already stopped.
    pub fn spawn(
        registry: ServiceRegistry,
        service_id: impl Into<String>,
        context: &ExecutionContext,
    ) -> Result<Self, ContextError> {
        let service_id = service_id.into();
        let period = registry.config().heartbeat_interval;
        let handle = context.spawn(move |token| run(registry, service_id, period, token))?;
        Ok(Self { handle })
    }

    /// Whether the loop has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the loop without waiting for the context.
    pub fn abort(&self) {
        self.handle.abort();
    }
}

async fn run(
    registry: ServiceRegistry,
    service_id: String,
    period: Duration,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => break,
            _ = ticker.tick() => {
                match registry.heartbeat(&service_id) {
                    Ok(()) => {}
                    Err(err) if err.kind() == ErrorKind::UnknownService => {
                        debug!(service = %service_id, "[Registry] Service gone, heartbeat stopped");
                        return;
                    }
                    Err(err) => warn!(service = %service_id, error = %err, "[Registry] Heartbeat failed"),
                }
            }
        }
    }
    debug!(service = %service_id, "[Registry] Heartbeat stopped");
}
