//! # Node Runtime
//!
//! Startup and shutdown of a complete node.
//!
//! ## Startup Sequence
//!
//! 1. Build the container (coordinator, broker, registry, supervisor)
//! 2. Host the configured in-process services from the catalog
//! 3. Launch the configured external services
//!
//! ## Shutdown Sequence
//!
//! 1. Cancel the root token (contexts stop, no new ack timers)
//! 2. Tear down participants by ascending priority
//! 3. Record participant outcomes in metrics

use std::sync::Arc;

use croupier_lifecycle::ShutdownReport;
use tracing::{error, info, warn};

use crate::container::{NodeConfig, NodeContainer};
use crate::error::NodeError;
use crate::services::{ExternalService, ServiceCatalog};
use crate::wiring::record_shutdown_report;

/// A running node.
pub struct NodeRuntime {
    container: NodeContainer,
    catalog: ServiceCatalog,
}

impl NodeRuntime {
    /// Build the container with the built-in service catalog.
    ///
    /// # Errors
    ///
    /// See [`NodeContainer::new`].
    pub fn new(config: NodeConfig) -> Result<Self, NodeError> {
        Self::with_catalog(config, ServiceCatalog::with_builtins())
    }

    /// Build the container with a custom catalog.
    ///
    /// # Errors
    ///
    /// See [`NodeContainer::new`].
    pub fn with_catalog(config: NodeConfig, catalog: ServiceCatalog) -> Result<Self, NodeError> {
        Ok(Self {
            container: NodeContainer::new(config)?,
            catalog,
        })
    }

    /// Host every configured service.
    ///
    /// Stops at the first service that fails to come up; services hosted
    /// before it keep running and are torn down by `shutdown`.
    ///
    /// # Errors
    ///
    /// The failing service's error.
    pub async fn start(&self) -> Result<(), NodeError> {
        let config = &self.container.config;
        info!("===========================================");
        info!("  Croupier Node {}", env!("CARGO_PKG_VERSION"));
        info!("  Node: {}", config.node_name);
        info!("===========================================");

        for spec in &config.services {
            self.container
                .host
                .host_from_catalog(&self.catalog, spec)
                .await?;
        }

        for spec in &config.external {
            let service = Arc::new(ExternalService::new(spec.process_spec()));
            self.container.host.host(service).await?;
        }

        info!(
            services = self.container.host.len(),
            processes = self.container.supervisor.process_count(),
            "All services running"
        );
        Ok(())
    }

    /// The component container.
    #[must_use]
    pub fn container(&self) -> &NodeContainer {
        &self.container
    }

    /// The service catalog.
    #[must_use]
    pub fn catalog(&self) -> &ServiceCatalog {
        &self.catalog
    }

    /// Run the shutdown sequence and wait for it.
    ///
    /// Returns `None` if the sequence did not finish within the configured
    /// overall budget plus the slowest participant's allowance.
    pub async fn shutdown(&self, reason: impl Into<String>) -> Option<Arc<ShutdownReport>> {
        let config = &self.container.config;
        let budget = config.shutdown_timeout() + config.shutdown_config().participant_timeout;
        let handle = self.container.initiate_shutdown(reason);

        let report = handle.wait_timeout(budget).await;
        match &report {
            Some(report) => {
                record_shutdown_report(report);
                for failure in report.failures() {
                    warn!(participant = failure.participant_id(), "✗ {failure}");
                }
                info!(
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    clean = report.is_clean(),
                    "Shutdown complete"
                );
            }
            None => error!(budget_ms = budget.as_millis() as u64, "✗ Shutdown timed out"),
        }
        self.container.stop_bridges();
        report
    }
}
