//! # Node Container
//!
//! Central container holding the node's core components with proper
//! lifetime management and dependency injection.
//!
//! - Components are built in dependency order: coordinator, broker,
//!   registry, supervisor, service host
//! - Each component registers its teardown at a fixed priority
//! - Services talk to each other only through the broker

pub mod components;
pub mod config;

pub use components::NodeContainer;
pub use config::{ExternalServiceSpec, HostedServiceSpec, NodeConfig};
