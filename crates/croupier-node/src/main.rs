//! # Croupier Node
//!
//! Runs one node until it receives SIGINT, SIGTERM or SIGQUIT (Ctrl-C on
//! other platforms), then tears it down by priority.
//!
//! ## Exit status
//!
//! - `0` when shutdown completed within its budget
//! - `1` when startup failed or shutdown timed out

use anyhow::{Context, Result};
use clap::Parser;
use croupier_lifecycle::wait_for_shutdown_signal;
use croupier_node::{NodeConfig, NodeRuntime};
use croupier_telemetry::init_telemetry;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = NodeConfig::parse();
    let _telemetry =
        init_telemetry(&config.telemetry_config()).context("Failed to initialize telemetry")?;

    let runtime = NodeRuntime::new(config).context("Failed to build node")?;
    if let Err(e) = runtime.start().await {
        error!("✗ Startup failed: {e}");
        runtime.shutdown("startup failed").await;
        return Err(e).context("Failed to start services");
    }

    info!("Node is running. Press Ctrl+C to stop.");
    let signal = wait_for_shutdown_signal()
        .await
        .context("Failed to install signal handlers")?;

    match runtime.shutdown(signal.to_string()).await {
        Some(_) => Ok(()),
        None => {
            error!("Shutdown did not complete in time, exiting");
            std::process::exit(1);
        }
    }
}
