//! # Croupier Types
//!
//! The message envelope, service descriptors and the shared error-kind
//! taxonomy used by every other Croupier crate.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: cross-component types are defined here.
//! - **Opaque Payloads**: the envelope never interprets `payload`; only the
//!   core's own system messages put JSON in it.
//! - **Tagged Failures**: expected failures carry an [`ErrorKind`] rather
//!   than being modelled as panics.

pub mod envelope;
pub mod errors;
pub mod service;

pub use envelope::{headers, Message, MessageBuilder, MessageId, MessageType};
pub use errors::ErrorKind;
pub use service::{ServiceDescriptor, ServiceStatus};
