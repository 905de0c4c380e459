//! Factories for in-process services, keyed by service type.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::NodeError;
use crate::services::echo::{EchoService, ECHO_SERVICE_TYPE};
use crate::services::Service;

/// Creates services of one type.
pub trait ServiceFactory: Send + Sync {
    /// The type this factory builds.
    fn service_type(&self) -> &str;

    /// Build a service instance under `service_id`.
    fn create(&self, service_id: &str) -> Result<Arc<dyn Service>, NodeError>;
}

/// Builds [`EchoService`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoFactory;

impl ServiceFactory for EchoFactory {
    fn service_type(&self) -> &str {
        ECHO_SERVICE_TYPE
    }

    fn create(&self, service_id: &str) -> Result<Arc<dyn Service>, NodeError> {
        Ok(Arc::new(EchoService::new(service_id)))
    }
}

/// Explicit registry of service factories.
#[derive(Default, Clone)]
pub struct ServiceCatalog {
    factories: HashMap<String, Arc<dyn ServiceFactory>>,
}

impl ServiceCatalog {
    /// An empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog with the built-in factories.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        catalog.register(Arc::new(EchoFactory));
        catalog
    }

    /// Add a factory, returning the one it replaced.
    pub fn register(&mut self, factory: Arc<dyn ServiceFactory>) -> Option<Arc<dyn ServiceFactory>> {
        self.factories
            .insert(factory.service_type().to_string(), factory)
    }

    /// Whether a factory exists for `service_type`.
    #[must_use]
    pub fn contains(&self, service_type: &str) -> bool {
        self.factories.contains_key(service_type)
    }

    /// Registered types, sorted.
    #[must_use]
    pub fn types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    /// Build a service of `service_type`.
    pub fn create(
        &self,
        service_type: &str,
        service_id: &str,
    ) -> Result<Arc<dyn Service>, NodeError> {
        self.factories
            .get(service_type)
            .ok_or_else(|| NodeError::UnknownServiceType {
                service_type: service_type.to_string(),
            })?
            .create(service_id)
    }
}
