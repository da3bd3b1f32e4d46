//! Router counters.
//!
//! Plain atomics updated on the hot path. The runtime copies a
//! [`RouterMetricsSnapshot`] into the Prometheus registry on each publish
//! tick.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the message router.
#[derive(Debug, Default)]
pub struct RouterMetrics {
    /// Messages handed to the router, from any transport.
    pub messages_received: AtomicU64,
    /// Datagrams or table updates that failed to parse or apply.
    pub malformed_messages: AtomicU64,
    /// Duplicate pings and queries dropped.
    pub duplicates_dropped: AtomicU64,
    /// Replies and pushes with nowhere to go.
    pub route_misses: AtomicU64,
    /// Query replies dropped by the reply policy.
    pub replies_dropped: AtomicU64,
    pub replies_routed: AtomicU64,
    pub pushes_routed: AtomicU64,
    pub pongs_cached: AtomicU64,
    /// Query copies queued on connections.
    pub queries_forwarded: AtomicU64,
    pub pings_forwarded: AtomicU64,
    pub dynamic_queries_started: AtomicU64,
    pub qrp_messages_sent: AtomicU64,
    pub connect_backs_redirected: AtomicU64,
    pub redirects_serviced: AtomicU64,
    /// UDP queries refused for a missing or wrong query key.
    pub udp_queries_rejected: AtomicU64,
}

impl RouterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        if n > 0 {
            counter.fetch_add(n, Ordering::Relaxed);
        }
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> RouterMetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        RouterMetricsSnapshot {
            messages_received: load(&self.messages_received),
            malformed_messages: load(&self.malformed_messages),
            duplicates_dropped: load(&self.duplicates_dropped),
            route_misses: load(&self.route_misses),
            replies_dropped: load(&self.replies_dropped),
            replies_routed: load(&self.replies_routed),
            pushes_routed: load(&self.pushes_routed),
            pongs_cached: load(&self.pongs_cached),
            queries_forwarded: load(&self.queries_forwarded),
            pings_forwarded: load(&self.pings_forwarded),
            dynamic_queries_started: load(&self.dynamic_queries_started),
            qrp_messages_sent: load(&self.qrp_messages_sent),
            connect_backs_redirected: load(&self.connect_backs_redirected),
            redirects_serviced: load(&self.redirects_serviced),
            udp_queries_rejected: load(&self.udp_queries_rejected),
        }
    }
}

/// Point-in-time copy of [`RouterMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterMetricsSnapshot {
    pub messages_received: u64,
    pub malformed_messages: u64,
    pub duplicates_dropped: u64,
    pub route_misses: u64,
    pub replies_dropped: u64,
    pub replies_routed: u64,
    pub pushes_routed: u64,
    pub pongs_cached: u64,
    pub queries_forwarded: u64,
    pub pings_forwarded: u64,
    pub dynamic_queries_started: u64,
    pub qrp_messages_sent: u64,
    pub connect_backs_redirected: u64,
    pub redirects_serviced: u64,
    pub udp_queries_rejected: u64,
}

impl RouterMetricsSnapshot {
    /// Every counter with a stable label, for exporters.
    pub fn entries(&self) -> [(&'static str, u64); 15] {
        [
            ("messages_received", self.messages_received),
            ("malformed_messages", self.malformed_messages),
            ("duplicates_dropped", self.duplicates_dropped),
            ("route_misses", self.route_misses),
            ("replies_dropped", self.replies_dropped),
            ("replies_routed", self.replies_routed),
            ("pushes_routed", self.pushes_routed),
            ("pongs_cached", self.pongs_cached),
            ("queries_forwarded", self.queries_forwarded),
            ("pings_forwarded", self.pings_forwarded),
            ("dynamic_queries_started", self.dynamic_queries_started),
            ("qrp_messages_sent", self.qrp_messages_sent),
            ("connect_backs_redirected", self.connect_backs_redirected),
            ("redirects_serviced", self.redirects_serviced),
            ("udp_queries_rejected", self.udp_queries_rejected),
        ]
    }
}
