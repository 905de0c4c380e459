//! # Croupier Registry
//!
//! Service registration, discovery and heartbeat liveness, expressed
//! entirely as broker messages (see [`protocol`]).
//!
//! ```text
//!  register_service ──► ServiceRegistered (broadcast)
//!  discover ──────────► ServiceDiscovery (broadcast) ──► replies to requester
//!  HeartbeatTask ─────► Heartbeat (broadcast) ──► last_heartbeat refreshed
//!  sweep ─────────────► ServiceUnavailable (broadcast)
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod heartbeat;
pub mod protocol;
pub mod record;
pub mod registry;

pub use error::RegistryError;
pub use heartbeat::HeartbeatTask;
pub use protocol::REGISTRY_ID;
pub use record::ServiceRecord;
pub use registry::{RegistryConfig, RegistryEvent, ServiceRegistry};
