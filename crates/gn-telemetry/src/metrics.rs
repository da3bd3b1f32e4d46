//! Prometheus metrics for the routing node.
//!
//! All metrics follow the naming convention: `gn_<area>_<metric>[_unit]`
//!
//! The router counts on plain atomics; [`publish_router`] copies a
//! [`RouterMetricsSnapshot`] into these collectors on each metrics tick.

use gn_05_message_router::RouterMetricsSnapshot;
use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // ROUTER COUNTERS
    // =========================================================================

    /// Router events by kind, mirrored from the router's own counters
    pub static ref ROUTER_EVENTS: IntCounterVec = IntCounterVec::new(
        Opts::new("gn_router_events_total", "Routing events by kind"),
        &["event"]
    ).expect("metric creation failed");

    // =========================================================================
    // NODE GAUGES
    // =========================================================================

    /// Live connections by role: leaf, ultrapeer, client_of_ultrapeer
    pub static ref CONNECTIONS: IntGaugeVec = IntGaugeVec::new(
        Opts::new("gn_connections", "Live connections by role"),
        &["role"]
    ).expect("metric creation failed");

    /// Routes held per route table: ping, query, push
    pub static ref ROUTES: IntGaugeVec = IntGaugeVec::new(
        Opts::new("gn_route_table_entries", "Routes held per route table"),
        &["table"]
    ).expect("metric creation failed");

    /// Dynamic queries in progress
    pub static ref ACTIVE_QUERIES: IntGauge = IntGauge::new(
        "gn_dynamic_queries_active",
        "Dynamic queries in progress"
    ).expect("metric creation failed");

    /// Pongs held by the pong cache
    pub static ref CACHED_PONGS: IntGauge = IntGauge::new(
        "gn_pong_cache_entries",
        "Pongs held by the pong cache"
    ).expect("metric creation failed");
}

/// Register all metrics with the global registry.
///
/// Registering twice is harmless.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(ROUTER_EVENTS.clone()),
        Box::new(CONNECTIONS.clone()),
        Box::new(ROUTES.clone()),
        Box::new(ACTIVE_QUERIES.clone()),
        Box::new(CACHED_PONGS.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }
    Ok(())
}

/// Bring the event counters up to `snapshot`.
///
/// Counters only move forward; a snapshot behind what was already
/// published (a restarted router) leaves them as they are.
pub fn publish_router(snapshot: &RouterMetricsSnapshot) {
    for (event, value) in snapshot.entries() {
        let counter = ROUTER_EVENTS.with_label_values(&[event]);
        let published = counter.get();
        if value > published {
            counter.inc_by(value - published);
        }
    }
}

/// Point-in-time sizes of the node's tables and connections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeGauges {
    pub leaves: usize,
    pub ultrapeers: usize,
    pub client_of_ultrapeers: usize,
    pub ping_routes: usize,
    pub query_routes: usize,
    pub push_routes: usize,
    pub active_queries: usize,
    pub cached_pongs: usize,
}

/// Set every gauge from `gauges`.
pub fn publish_gauges(gauges: &NodeGauges) {
    let set = |gauge: IntGauge, value: usize| gauge.set(i64::try_from(value).unwrap_or(i64::MAX));
    set(CONNECTIONS.with_label_values(&["leaf"]), gauges.leaves);
    set(CONNECTIONS.with_label_values(&["ultrapeer"]), gauges.ultrapeers);
    set(
        CONNECTIONS.with_label_values(&["client_of_ultrapeer"]),
        gauges.client_of_ultrapeers,
    );
    set(ROUTES.with_label_values(&["ping"]), gauges.ping_routes);
    set(ROUTES.with_label_values(&["query"]), gauges.query_routes);
    set(ROUTES.with_label_values(&["push"]), gauges.push_routes);
    set(ACTIVE_QUERIES.clone(), gauges.active_queries);
    set(CACHED_PONGS.clone(), gauges.cached_pongs);
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
