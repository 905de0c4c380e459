//! # Service Host
//!
//! Brings services up and takes them down the same way every time.
//!
//! ## Hosting sequence
//!
//! 1. Register with the registry (`DuplicateServiceId` stops here)
//! 2. Create an execution context under the coordinator's root token
//! 3. `Service::start`
//! 4. Spawn the heartbeat task inside the context
//! 5. Register a shutdown participant at priority `SERVICES`
//!
//! A failure at any step undoes the earlier ones. Teardown runs in reverse:
//! stop the context, `Service::stop`, deregister.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use croupier_bus::Broker;
use croupier_lifecycle::{
    priority, ExecutionContext, ShutdownCoordinator, ShutdownParticipant, TeardownError,
};
use croupier_registry::{HeartbeatTask, RegistryError, ServiceRegistry};
use croupier_supervisor::ProcessSupervisor;
use croupier_types::{ServiceDescriptor, ServiceStatus};
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::container::config::HostedServiceSpec;
use crate::error::NodeError;
use crate::services::catalog::ServiceCatalog;
use crate::services::{Service, ServiceContext};

/// How long teardown waits for a service's tasks to drain.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Shutdown participant id of a hosted service.
#[must_use]
pub fn participant_id(service_id: &str) -> String {
    format!("service:{service_id}")
}

/// One running service and everything tied to its lifetime.
struct HostedService {
    service: Arc<dyn Service>,
    execution: Arc<ExecutionContext>,
    heartbeat: HeartbeatTask,
    registry: ServiceRegistry,
    stopped: AtomicBool,
}

impl HostedService {
    async fn shutdown(&self) -> Result<(), NodeError> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let id = self.service.id().to_string();

        self.execution.stop();
        self.heartbeat.abort();
        let result = self.service.stop().await;
        if !self.execution.wait_idle(DRAIN_TIMEOUT).await {
            warn!(service = %id, "Service tasks still running after stop");
        }
        self.execution.dispose();

        match self.registry.deregister_service(&id) {
            // Swept already, or the registry stopped first.
            Ok(_) | Err(RegistryError::UnknownService { .. }) => {}
            Err(e) => warn!(service = %id, "Deregistration failed: {e}"),
        }

        match &result {
            Ok(()) => info!(service = %id, "✓ Service stopped"),
            Err(e) => warn!(service = %id, "✗ Service stop failed: {e}"),
        }
        result
    }
}

#[async_trait]
impl ShutdownParticipant for HostedService {
    async fn teardown(&self) -> Result<(), TeardownError> {
        self.shutdown()
            .await
            .map_err(|e| TeardownError::new(e.to_string()))
    }
}

/// Runs services on this node.
pub struct ServiceHost {
    coordinator: Arc<ShutdownCoordinator>,
    broker: Broker,
    registry: ServiceRegistry,
    supervisor: ProcessSupervisor,
    hosted: RwLock<HashMap<String, Arc<HostedService>>>,
}

impl ServiceHost {
    /// Host bound to the node's components.
    pub fn new(
        coordinator: Arc<ShutdownCoordinator>,
        broker: Broker,
        registry: ServiceRegistry,
        supervisor: ProcessSupervisor,
    ) -> Self {
        Self {
            coordinator,
            broker,
            registry,
            supervisor,
            hosted: RwLock::new(HashMap::new()),
        }
    }

    /// Register, start and supervise `service`.
    ///
    /// # Errors
    ///
    /// - `AlreadyHosted` if this host runs a service with the same id
    /// - `Registry(DuplicateServiceId)` if the id is known to the registry
    /// - whatever `Service::start` returns
    /// - `Shutdown(AlreadyShuttingDown)` once node shutdown began
    pub async fn host(&self, service: Arc<dyn Service>) -> Result<ServiceDescriptor, NodeError> {
        let descriptor = service.descriptor().clone();
        let id = descriptor.service_id.clone();
        if self.hosted.read().contains_key(&id) {
            return Err(NodeError::AlreadyHosted { service_id: id });
        }

        self.registry.register_service(
            id.clone(),
            descriptor.name.clone(),
            descriptor.service_type.clone(),
        )?;

        let execution = Arc::new(self.coordinator.create_context(id.clone()));
        let context = ServiceContext {
            broker: self.broker.clone(),
            registry: self.registry.clone(),
            supervisor: self.supervisor.clone(),
            execution: Arc::clone(&execution),
        };

        if let Err(e) = service.start(context).await {
            self.abandon(&id, &execution);
            return Err(e);
        }

        let heartbeat = match HeartbeatTask::spawn(self.registry.clone(), id.clone(), &execution) {
            Ok(task) => task,
            Err(e) => {
                if let Err(stop_err) = service.stop().await {
                    warn!(service = %id, "Rollback stop failed: {stop_err}");
                }
                self.abandon(&id, &execution);
                return Err(e.into());
            }
        };

        let hosted = Arc::new(HostedService {
            service,
            execution,
            heartbeat,
            registry: self.registry.clone(),
            stopped: AtomicBool::new(false),
        });

        if let Err(e) = self.coordinator.register_participant(
            participant_id(&id),
            priority::SERVICES,
            Arc::clone(&hosted) as Arc<dyn ShutdownParticipant>,
        ) {
            let _ = hosted.shutdown().await;
            return Err(e.into());
        }

        self.hosted.write().insert(id, hosted);
        info!(service = %descriptor, "✓ Service hosted");
        Ok(descriptor)
    }

    /// Build a service from `catalog` and host it.
    ///
    /// # Errors
    ///
    /// `UnknownServiceType`, or any error from [`host`](Self::host).
    pub async fn host_from_catalog(
        &self,
        catalog: &ServiceCatalog,
        spec: &HostedServiceSpec,
    ) -> Result<ServiceDescriptor, NodeError> {
        let service = catalog.create(&spec.service_type, &spec.service_id)?;
        self.host(service).await
    }

    /// Stop one service before node shutdown.
    ///
    /// # Errors
    ///
    /// `Registry(UnknownService)` if the id is not hosted here, or the
    /// service's own stop error.
    pub async fn stop_service(&self, service_id: &str) -> Result<(), NodeError> {
        let hosted = self.hosted.write().remove(service_id).ok_or_else(|| {
            NodeError::Registry(RegistryError::UnknownService {
                service_id: service_id.to_string(),
            })
        })?;
        self.coordinator
            .deregister_participant(&participant_id(service_id));
        hosted.shutdown().await
    }

    /// Descriptors of hosted services, sorted by id.
    #[must_use]
    pub fn services(&self) -> Vec<ServiceDescriptor> {
        let mut list: Vec<ServiceDescriptor> = self
            .hosted
            .read()
            .values()
            .map(|h| h.service.descriptor().clone())
            .collect();
        list.sort_by(|a, b| a.service_id.cmp(&b.service_id));
        list
    }

    /// Status of a hosted service.
    #[must_use]
    pub fn status(&self, service_id: &str) -> Option<ServiceStatus> {
        self.hosted
            .read()
            .get(service_id)
            .map(|h| h.service.status())
    }

    /// Number of hosted services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hosted.read().len()
    }

    /// Whether nothing is hosted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hosted.read().is_empty()
    }

    fn abandon(&self, service_id: &str, execution: &ExecutionContext) {
        execution.dispose();
        if let Err(e) = self.registry.deregister_service(service_id) {
            warn!(service = service_id, "Rollback deregistration failed: {e}");
        }
    }
}

impl std::fmt::Debug for ServiceHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHost")
            .field("services", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use croupier_registry::RegistryConfig;
    use croupier_supervisor::SupervisorConfig;

    /// Stops its own context during start so the heartbeat cannot spawn.
    struct SelfStopping {
        descriptor: ServiceDescriptor,
        stop_calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl Service for SelfStopping {
        fn descriptor(&self) -> &ServiceDescriptor {
            &self.descriptor
        }

        async fn start(&self, context: ServiceContext) -> Result<(), NodeError> {
            context.execution.stop();
            Ok(())
        }

        async fn stop(&self) -> Result<(), NodeError> {
            self.stop_calls.fetch_add(1, Ordering::SeqCst);
            Err(NodeError::service(self.id(), "already gone"))
        }

        fn status(&self) -> ServiceStatus {
            ServiceStatus::Stopped
        }
    }

    #[tokio::test]
    async fn test_heartbeat_failure_rolls_back_despite_stop_error() {
        let broker = Broker::new();
        let registry = ServiceRegistry::new(broker.clone(), RegistryConfig::default()).unwrap();
        let host = ServiceHost::new(
            Arc::new(ShutdownCoordinator::new()),
            broker,
            registry.clone(),
            ProcessSupervisor::new(SupervisorConfig::default()),
        );
        let service = Arc::new(SelfStopping {
            descriptor: ServiceDescriptor::new("svcA", "Lobby", "lobby"),
            stop_calls: std::sync::atomic::AtomicUsize::new(0),
        });

        let err = host
            .host(Arc::clone(&service) as Arc<dyn Service>)
            .await
            .unwrap_err();

        assert!(matches!(err, NodeError::Context(_)));
        assert_eq!(service.stop_calls.load(Ordering::SeqCst), 1);
        assert!(!registry.contains("svcA"));
        assert!(host.is_empty());

        // The id is free again.
        registry.register_service("svcA", "Lobby", "lobby").unwrap();
    }
}
