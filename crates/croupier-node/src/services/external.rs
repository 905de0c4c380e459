//! Adapts a supervised OS process to the [`Service`] contract.
//!
//! The process is launched on `start` and stopped on `stop`. If the monitor
//! reaps it in between, `status` reports `Failed`.

use async_trait::async_trait;
use croupier_supervisor::{ProcessHandle, ProcessSpec, ProcessSupervisor, SupervisorError};
use croupier_types::{ServiceDescriptor, ServiceStatus};
use parking_lot::Mutex;

use crate::error::NodeError;
use crate::services::{Service, ServiceContext};

/// Service type of every external service.
pub const EXTERNAL_SERVICE_TYPE: &str = "external";

struct Launched {
    supervisor: ProcessSupervisor,
    handle: ProcessHandle,
}

/// A service living in its own process.
pub struct ExternalService {
    descriptor: ServiceDescriptor,
    spec: ProcessSpec,
    status: Mutex<ServiceStatus>,
    launched: Mutex<Option<Launched>>,
}

impl ExternalService {
    /// Service named after the process spec.
    pub fn new(spec: ProcessSpec) -> Self {
        let name = spec.name().to_string();
        Self {
            descriptor: ServiceDescriptor::new(name.clone(), name, EXTERNAL_SERVICE_TYPE),
            spec,
            status: Mutex::new(ServiceStatus::Created),
            launched: Mutex::new(None),
        }
    }

    /// Launch handle while the process is ours.
    #[must_use]
    pub fn process(&self) -> Option<ProcessHandle> {
        self.launched.lock().as_ref().map(|l| l.handle.clone())
    }
}

#[async_trait]
impl Service for ExternalService {
    fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    async fn start(&self, context: ServiceContext) -> Result<(), NodeError> {
        *self.status.lock() = ServiceStatus::Starting;
        match context.supervisor.start_process(self.spec.clone()) {
            Ok(handle) => {
                *self.launched.lock() = Some(Launched {
                    supervisor: context.supervisor,
                    handle,
                });
                *self.status.lock() = ServiceStatus::Running;
                Ok(())
            }
            Err(e) => {
                *self.status.lock() = ServiceStatus::Failed;
                Err(e.into())
            }
        }
    }

    async fn stop(&self) -> Result<(), NodeError> {
        let Some(launched) = self.launched.lock().take() else {
            return Ok(());
        };
        *self.status.lock() = ServiceStatus::Stopping;
        match launched.supervisor.stop_process(launched.handle.id).await {
            // Already reaped by the monitor or disposed with the supervisor.
            Ok(_) | Err(SupervisorError::UnknownProcess { .. }) => {
                *self.status.lock() = ServiceStatus::Stopped;
                Ok(())
            }
            Err(e) => {
                *self.status.lock() = ServiceStatus::Failed;
                Err(e.into())
            }
        }
    }

    fn status(&self) -> ServiceStatus {
        let status = *self.status.lock();
        if status != ServiceStatus::Running {
            return status;
        }
        match self.launched.lock().as_ref() {
            Some(l) if l.supervisor.status(l.handle.id).is_terminal() => ServiceStatus::Failed,
            _ => status,
        }
    }
}
