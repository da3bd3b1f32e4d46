//! # Router Scheduler
//!
//! Periodic maintenance for a [`MessageRouter`]: route table generation
//! swaps, connect-back record expiry, idle UDP handler cleanup, route table
//! propagation and dynamic query steps.
//!
//! Every job runs on its own tokio interval and stops when the shutdown
//! channel changes or its sender is dropped.

use crate::metrics::RouterMetricsSnapshot;
use crate::ports::MessageRouterApi;
use crate::service::MessageRouter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Receives a metrics snapshot on every metrics tick.
pub type MetricsHook = Arc<dyn Fn(RouterMetricsSnapshot) + Send + Sync>;

/// Periods of the maintenance jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerIntervals {
    pub route_purge: Duration,
    pub connect_back_clear: Duration,
    pub udp_clean: Duration,
    pub qrp_propagate: Duration,
    pub dispatch: Duration,
}

impl SchedulerIntervals {
    /// Periods taken from the router's own configuration.
    pub fn for_router(router: &MessageRouter) -> Self {
        let config = router.config();
        Self {
            route_purge: Duration::from_millis(config.route_purge_ms),
            connect_back_clear: Duration::from_millis(config.connect_back_clear_ms),
            udp_clean: Duration::from_millis(config.udp_cache_clean_ms),
            qrp_propagate: Duration::from_millis(config.qrp_propagate_ms),
            dispatch: Duration::from_millis(router.dispatcher().config().dispatch_interval_ms),
        }
    }
}

/// Drives the router's timers.
pub struct RouterScheduler {
    router: Arc<MessageRouter>,
    intervals: SchedulerIntervals,
    metrics: Option<(Duration, MetricsHook)>,
}

impl RouterScheduler {
    pub fn new(router: Arc<MessageRouter>) -> Self {
        let intervals = SchedulerIntervals::for_router(&router);
        Self {
            router,
            intervals,
            metrics: None,
        }
    }

    pub fn with_intervals(mut self, intervals: SchedulerIntervals) -> Self {
        self.intervals = intervals;
        self
    }

    /// Hand a metrics snapshot to `hook` every `every`.
    pub fn with_metrics_hook(mut self, every: Duration, hook: MetricsHook) -> Self {
        self.metrics = Some((every, hook));
        self
    }

    pub fn intervals(&self) -> &SchedulerIntervals {
        &self.intervals
    }

    /// Spawn every job onto the current runtime.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let intervals = self.intervals.clone();
        let mut handles = Vec::with_capacity(6);

        let router = self.router.clone();
        handles.push(spawn_periodic(
            "route purge",
            intervals.route_purge,
            shutdown.clone(),
            move || {
                router.purge_routes();
            },
        ));

        let router = self.router.clone();
        handles.push(spawn_periodic(
            "connect-back expiry",
            intervals.connect_back_clear,
            shutdown.clone(),
            move || router.expire_connect_backs(),
        ));

        let router = self.router.clone();
        handles.push(spawn_periodic(
            "udp handler cleanup",
            intervals.udp_clean,
            shutdown.clone(),
            move || {
                let removed = router.clean_udp_handlers();
                if removed > 0 {
                    debug!("[gn-05] Forgot {} idle UDP handlers", removed);
                }
            },
        ));

        let router = self.router.clone();
        handles.push(spawn_periodic(
            "route table propagation",
            intervals.qrp_propagate,
            shutdown.clone(),
            move || {
                router.forward_query_route_tables(router.now_ms());
            },
        ));

        let router = self.router.clone();
        handles.push(spawn_periodic(
            "dynamic queries",
            intervals.dispatch,
            shutdown.clone(),
            move || router.dispatcher().process_queries(),
        ));

        if let Some((every, hook)) = self.metrics {
            let router = self.router.clone();
            handles.push(spawn_periodic("metrics", every, shutdown, move || {
                hook(router.metrics().snapshot())
            }));
        }

        info!("[gn-05] Scheduler started with {} jobs", handles.len());
        handles
    }
}

/// Run `job` every `period` until shutdown. The first run is one period
/// after spawning.
fn spawn_periodic(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut job: impl FnMut() + Send + 'static,
) -> JoinHandle<()> {
    let period = period.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => job(),
                _ = shutdown.changed() => {
                    debug!("[gn-05] {} task stopping", name);
                    break;
                }
            }
        }
    })
}
