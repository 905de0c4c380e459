//! # Croupier Telemetry
//!
//! Logging and metrics for Croupier nodes.
//!
//! ## Components
//!
//! - **Logs**: `tracing-subscriber` with an env filter, pretty or JSON output
//! - **Metrics**: Prometheus counters and gauges in a process-wide registry
//!
//! ## Usage
//!
//! ```rust,ignore
//! use croupier_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     let _guard = init_telemetry(&TelemetryConfig::from_env()).expect("telemetry");
//!     // Application code here
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `CROUPIER_LOG_LEVEL` | `info` | Log filter (`RUST_LOG` takes precedence) |
//! | `CROUPIER_JSON_LOGS` | `false` | JSON log lines |
//! | `CROUPIER_SERVICE_NAME` | `croupier` | Service name in logs |

#![cfg_attr(test, allow(clippy::unwrap_used))]

mod config;
mod logging;
pub mod metrics;

pub use config::{parse_flag, TelemetryConfig, DEFAULT_LOG_LEVEL};
pub use logging::{build_filter, init_logging};
pub use metrics::{
    gather_metrics, register_metrics, BUS_ACK_OUTCOMES, BUS_ACK_RETRIES, BUS_DELIVERIES,
    BUS_DELIVERY_DURATION, BUS_MESSAGES_PUBLISHED, REGISTRY_SERVICES, SHUTDOWN_PARTICIPANTS,
    SUPERVISOR_EXITS, SUPERVISOR_PROCESSES,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Register metrics and install the log subscriber.
///
/// Returns a guard to hold for the lifetime of the application.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    register_metrics()?;
    init_logging(config)?;
    Ok(TelemetryGuard {
        service_name: config.service_name.clone(),
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    service_name: String,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service_name, "Shutting down telemetry...");
    }
}
