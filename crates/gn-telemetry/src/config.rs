//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for logging and metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Service name attached to every log line
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error) or a full
    /// `tracing` directive such as `gn_05_message_router=debug`
    pub log_level: String,

    /// Whether to write JSON log lines instead of human-readable ones
    pub json_logs: bool,

    /// Seconds between router metric publishes
    pub metrics_interval_secs: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "gnutella-node".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            metrics_interval_secs: 10,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `GN_SERVICE_NAME`: Service name (default: gnutella-node)
    /// - `GN_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `GN_JSON_LOGS`: Enable JSON logs (default: false)
    /// - `GN_METRICS_INTERVAL_SECS`: Metrics publish period (default: 10)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            service_name: env::var("GN_SERVICE_NAME").unwrap_or(defaults.service_name),

            log_level: env::var("GN_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or(defaults.log_level),

            json_logs: env::var("GN_JSON_LOGS")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.json_logs),

            metrics_interval_secs: env::var("GN_METRICS_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(defaults.metrics_interval_secs),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
