//! # Croupier Node Runtime Library
//!
//! Assembles the Croupier core into a running node. The main entry point is
//! the `croupier-node` binary; the library is exposed for integration tests
//! and embedding.
//!
//! ## Modules
//!
//! - `container/` - Component container and configuration
//! - `services/` - Service contract, built-in services, catalog and host
//! - `wiring/` - Metrics middleware and event bridges
//! - `runtime` - Startup and shutdown of a complete node

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![allow(clippy::cast_precision_loss)]

pub mod container;
pub mod error;
pub mod runtime;
pub mod services;
pub mod wiring;

pub use container::{ExternalServiceSpec, HostedServiceSpec, NodeConfig, NodeContainer};
pub use error::NodeError;
pub use runtime::NodeRuntime;
pub use services::{
    EchoFactory, EchoService, ExternalService, Service, ServiceCatalog, ServiceContext,
    ServiceFactory, ServiceHost,
};
