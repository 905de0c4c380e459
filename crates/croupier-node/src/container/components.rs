//! # Component Container
//!
//! Builds and owns the core components of one node.
//!
//! ## Initialization Order
//!
//! ```text
//! Phase 1: ShutdownCoordinator (root token)
//! Phase 2: Broker  (metrics middleware, ack timers bound to the root token)
//! Phase 3: ServiceRegistry (subscribes on the broker)
//! Phase 4: ProcessSupervisor (monitor task)
//! Phase 5: ServiceHost + event bridges
//! ```
//!
//! ## Teardown Order
//!
//! | Priority | Participant          |
//! |----------|----------------------|
//! | 10       | `process-supervisor` |
//! | 50       | `service:<id>`       |
//! | 80       | `registry`           |
//! | 100      | `broker`             |

use std::sync::Arc;

use croupier_bus::Broker;
use croupier_lifecycle::{priority, ShutdownCoordinator, ShutdownHandle};
use croupier_registry::ServiceRegistry;
use croupier_supervisor::ProcessSupervisor;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::container::config::NodeConfig;
use crate::error::NodeError;
use crate::services::ServiceHost;
use crate::wiring::{spawn_process_exit_bridge, spawn_registry_gauge, MetricsMiddleware};

/// Participant ids of the core components.
pub mod participants {
    /// The process supervisor.
    pub const SUPERVISOR: &str = "process-supervisor";
    /// The service registry.
    pub const REGISTRY: &str = "registry";
    /// The broker.
    pub const BROKER: &str = "broker";
}

/// Central container holding all core components.
pub struct NodeContainer {
    /// Node configuration (immutable after initialization).
    pub config: NodeConfig,

    /// Priority-ordered teardown.
    pub coordinator: Arc<ShutdownCoordinator>,

    /// Message broker; every service communicates through it.
    pub broker: Broker,

    /// Service registration and discovery.
    pub registry: ServiceRegistry,

    /// External process supervision.
    pub supervisor: ProcessSupervisor,

    /// In-process and external service hosting.
    pub host: ServiceHost,

    /// Stops the event bridges once shutdown completes.
    bridges: CancellationToken,
}

impl NodeContainer {
    /// Build every component and register its teardown.
    ///
    /// Must run inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails only if a component cannot be wired, which indicates a closed
    /// broker or a duplicate participant id.
    #[instrument(name = "node_init", skip(config))]
    pub fn new(config: NodeConfig) -> Result<Self, NodeError> {
        info!(node = %config.node_name, "Initializing Croupier node container");

        // Phase 1: shutdown coordinator
        let coordinator = Arc::new(ShutdownCoordinator::with_config(config.shutdown_config()));

        // Phase 2: broker
        let broker = Broker::builder()
            .config(config.broker_config())
            .middleware(Arc::new(MetricsMiddleware))
            .shutdown_token(coordinator.root_token())
            .build();
        info!(middleware = ?broker.middleware_names(), "  Broker initialized");

        // Phase 3: registry
        let registry = ServiceRegistry::new(broker.clone(), config.registry_config())?;
        info!(registry_id = %config.registry_id, "  Registry initialized");

        // Phase 4: supervisor
        let supervisor = ProcessSupervisor::new(config.supervisor_config());
        info!("  Process supervisor initialized");

        coordinator.register_participant(
            participants::SUPERVISOR,
            priority::PROCESS_SUPERVISOR,
            Arc::new(supervisor.clone()),
        )?;
        coordinator.register_participant(
            participants::REGISTRY,
            priority::REGISTRY,
            Arc::new(registry.clone()),
        )?;
        coordinator.register_participant(
            participants::BROKER,
            priority::BROKER,
            Arc::new(broker.clone()),
        )?;

        // Phase 5: host and bridges
        let host = ServiceHost::new(
            Arc::clone(&coordinator),
            broker.clone(),
            registry.clone(),
            supervisor.clone(),
        );
        let bridges = CancellationToken::new();
        spawn_process_exit_bridge(&supervisor, broker.clone(), bridges.clone());
        spawn_registry_gauge(&registry, bridges.clone());

        info!(
            participants = coordinator.participant_count(),
            "✓ Node container ready"
        );

        Ok(Self {
            config,
            coordinator,
            broker,
            registry,
            supervisor,
            host,
            bridges,
        })
    }

    /// Begin (or join) the shutdown sequence with the configured budget.
    pub fn initiate_shutdown(&self, reason: impl Into<String>) -> ShutdownHandle {
        self.coordinator
            .initiate_shutdown(reason, Some(self.config.shutdown_timeout()))
    }

    /// Stop the event bridges. Called once the shutdown report is in.
    pub fn stop_bridges(&self) {
        self.bridges.cancel();
    }
}

impl Drop for NodeContainer {
    fn drop(&mut self) {
        self.bridges.cancel();
    }
}

impl std::fmt::Debug for NodeContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeContainer")
            .field("node", &self.config.node_name)
            .field("broker", &self.broker)
            .field("services", &self.host.len())
            .field("processes", &self.supervisor.process_count())
            .finish()
    }
}
