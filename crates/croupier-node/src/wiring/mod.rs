//! # Wiring
//!
//! Glue between the core components and the node's observability:
//!
//! ```text
//! Broker ──Middleware──► MetricsMiddleware ──► croupier_bus_* metrics
//!
//! ProcessSupervisor ──events──► process exit bridge ──► ProcessExited (bus)
//!                                                   └─► croupier_supervisor_*
//!
//! ServiceRegistry ──events──► registry gauge ──► croupier_registry_services
//!
//! ShutdownReport ──► record_shutdown_report ──► croupier_shutdown_*
//! ```

pub mod bridges;
pub mod metrics;

pub use bridges::{spawn_process_exit_bridge, spawn_registry_gauge, SUPERVISOR_SENDER_ID};
pub use metrics::{record_shutdown_report, MetricsMiddleware};
