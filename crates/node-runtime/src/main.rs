//! # Gnutella Routing Node
//!
//! Entry point for an ultrapeer or leaf running the message-routing core.
//!
//! ## Startup Sequence
//!
//! 1. Initialize telemetry (logging, metrics registry)
//! 2. Load configuration (`GN_CONFIG` file, then environment overrides)
//! 3. Bind the UDP socket and wire the router
//! 4. Start transport loops and the scheduler
//! 5. Run until Ctrl+C, then shut down gracefully

use anyhow::{Context, Result};
use gn_telemetry::{init_telemetry, TelemetryConfig};
use node_runtime::{NodeConfig, NodeRuntime};
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = TelemetryConfig::from_env();
    init_telemetry(&telemetry).context("Failed to initialize telemetry")?;

    let config = NodeConfig::from_env().context("Failed to load configuration")?;

    let mut runtime = NodeRuntime::bind(
        config,
        Duration::from_secs(telemetry.metrics_interval_secs),
    )
    .await?;
    runtime.start()?;

    info!("Node is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    runtime.shutdown().await;
    Ok(())
}
