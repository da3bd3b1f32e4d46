//! # Gnutella Telemetry
//!
//! Logging and metrics for the routing node.
//!
//! ## Components
//!
//! - **Logging**: `tracing` subscriber, human-readable or JSON lines
//! - **Metrics**: Prometheus registry fed from router snapshots
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gn_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env();
//! init_telemetry(&config)?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `GN_SERVICE_NAME` | `gnutella-node` | Service name in logs |
//! | `GN_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `GN_JSON_LOGS` | `false` | JSON log lines |
//! | `GN_METRICS_INTERVAL_SECS` | `10` | Metrics publish period |

mod config;
mod logging;
mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{
    encode_metrics, publish_gauges, publish_router, register_metrics, NodeGauges,
    ACTIVE_QUERIES, CACHED_PONGS, CONNECTIONS, REGISTRY, ROUTER_EVENTS, ROUTES,
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

/// Register metrics, then install logging.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    register_metrics()?;
    init_logging(config)
}
