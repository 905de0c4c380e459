//! # Shutdown Participants
//!
//! Anything that must release resources when the node stops implements
//! [`ShutdownParticipant`] and registers with the coordinator under a
//! priority. Lower priorities are torn down first.

use std::future::Future;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::error::TeardownError;

/// Well-known teardown priorities used by the node runtime.
pub mod priority {
    /// External processes go first, while the broker they talk to is alive.
    pub const PROCESS_SUPERVISOR: i32 = 10;
    /// In-process services.
    pub const SERVICES: i32 = 50;
    /// The service registry.
    pub const REGISTRY: i32 = 80;
    /// The broker goes last.
    pub const BROKER: i32 = 100;
}

/// A component with a teardown contract.
#[async_trait]
pub trait ShutdownParticipant: Send + Sync {
    /// Release resources. Bounded by the coordinator's per-participant
    /// timeout; the future is dropped if it overruns.
    async fn teardown(&self) -> Result<(), TeardownError>;
}

type TeardownFn = dyn Fn() -> BoxFuture<'static, Result<(), TeardownError>> + Send + Sync;

/// Adapts a closure into a participant.
pub struct FnParticipant {
    teardown: Box<TeardownFn>,
}

impl FnParticipant {
    /// Wrap `teardown`.
    pub fn new<F, Fut>(teardown: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TeardownError>> + Send + 'static,
    {
        Self {
            teardown: Box::new(move || Box::pin(teardown())),
        }
    }
}

#[async_trait]
impl ShutdownParticipant for FnParticipant {
    async fn teardown(&self) -> Result<(), TeardownError> {
        (self.teardown)().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fn_participant_runs_closure() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let participant = FnParticipant::new(move || {
            let flag = Arc::clone(&flag);
            async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            }
        });

        participant.teardown().await.unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_priorities_ordering() {
        assert!(priority::PROCESS_SUPERVISOR < priority::SERVICES);
        assert!(priority::SERVICES < priority::REGISTRY);
        assert!(priority::REGISTRY < priority::BROKER);
    }
}
