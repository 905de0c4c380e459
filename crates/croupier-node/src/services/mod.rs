//! # Hosted Services
//!
//! The uniform start/stop/status contract every service implements, whether
//! it runs inside the node ([`EchoService`]) or as a supervised process
//! ([`ExternalService`]).
//!
//! ```text
//! ServiceCatalog ──create──► Arc<dyn Service> ──► ServiceHost::host
//!                                                     │
//!                     register ◄──────────────────────┤ registry
//!                     start(ServiceContext) ◄─────────┤
//!                     heartbeat task ◄────────────────┤ execution context
//!                     shutdown participant ◄──────────┘ priority SERVICES
//! ```

pub mod catalog;
pub mod echo;
pub mod external;
pub mod host;

use std::sync::Arc;

use async_trait::async_trait;
use croupier_bus::Broker;
use croupier_lifecycle::ExecutionContext;
use croupier_registry::ServiceRegistry;
use croupier_supervisor::ProcessSupervisor;
use croupier_types::{ServiceDescriptor, ServiceStatus};

use crate::error::NodeError;

pub use catalog::{EchoFactory, ServiceCatalog, ServiceFactory};
pub use echo::{EchoService, ECHO_REPLY_TYPE, ECHO_REQUEST_TYPE, ECHO_SERVICE_TYPE};
pub use external::{ExternalService, EXTERNAL_SERVICE_TYPE};
pub use host::ServiceHost;

/// What a service gets when it starts.
#[derive(Clone)]
pub struct ServiceContext {
    /// The node's broker.
    pub broker: Broker,
    /// The node's registry.
    pub registry: ServiceRegistry,
    /// The node's process supervisor.
    pub supervisor: ProcessSupervisor,
    /// Cancellation scope of this service, stopped when the node shuts down.
    pub execution: Arc<ExecutionContext>,
}

/// Trait that all hosted services implement.
#[async_trait]
pub trait Service: Send + Sync {
    /// Identity, fixed for the service's lifetime.
    fn descriptor(&self) -> &ServiceDescriptor;

    /// Service id (also its subscriber id on the broker).
    fn id(&self) -> &str {
        &self.descriptor().service_id
    }

    /// Human-readable name.
    fn name(&self) -> &str {
        &self.descriptor().name
    }

    /// Service type.
    fn service_type(&self) -> &str {
        &self.descriptor().service_type
    }

    /// Start processing. Called once, after registration.
    async fn start(&self, context: ServiceContext) -> Result<(), NodeError>;

    /// Stop processing. Must tolerate being called after a failed start.
    async fn stop(&self) -> Result<(), NodeError>;

    /// Current status.
    fn status(&self) -> ServiceStatus;
}
