//! Per-route state.

use shared_types::{HandlerId, ReplyHandler};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
pub(crate) struct RouteCounters {
    bytes_routed: AtomicU64,
    results_routed: AtomicU64,
    ttl: AtomicU8,
}

/// Live view of a route's counters.
///
/// The counters survive re-routing of the GUID to another handler, so the
/// totals cover every reply routed for the GUID while it stayed in the table.
#[derive(Clone, Default)]
pub struct ResultCounter(pub(crate) Arc<RouteCounters>);

impl ResultCounter {
    /// Query-hit results routed back so far.
    pub fn results_routed(&self) -> u64 {
        self.0.results_routed.load(Ordering::Acquire)
    }

    pub fn bytes_routed(&self) -> u64 {
        self.0.bytes_routed.load(Ordering::Acquire)
    }

    /// TTL recorded for the route, 0 when never set.
    pub fn ttl(&self) -> u8 {
        self.0.ttl.load(Ordering::Acquire)
    }

    pub(crate) fn store_ttl(&self, ttl: u8) {
        self.0.ttl.store(ttl, Ordering::Release);
    }

    pub(crate) fn compare_and_set_ttl(&self, expected: u8, new: u8) -> bool {
        self.0
            .ttl
            .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Add to the totals, returning the totals from before the addition.
    pub(crate) fn add(&self, bytes: u64, results: u64) -> (u64, u64) {
        let b = self.0.bytes_routed.fetch_add(bytes, Ordering::AcqRel);
        let r = self.0.results_routed.fetch_add(results, Ordering::AcqRel);
        (b, r)
    }
}

impl fmt::Debug for ResultCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultCounter")
            .field("bytes_routed", &self.bytes_routed())
            .field("results_routed", &self.results_routed())
            .field("ttl", &self.ttl())
            .finish()
    }
}

/// A routed reply's destination plus the totals routed before it.
#[derive(Clone)]
pub struct ReplyRoutePair {
    pub handler: Arc<dyn ReplyHandler>,
    pub bytes_routed: u64,
    pub results_routed: u64,
}

impl fmt::Debug for ReplyRoutePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyRoutePair")
            .field("handler", &self.handler.id())
            .field("bytes_routed", &self.bytes_routed)
            .field("results_routed", &self.results_routed)
            .finish()
    }
}

/// One GUID's route.
#[derive(Clone, Debug)]
pub(crate) struct RouteEntry {
    pub handler_id: HandlerId,
    pub counter: ResultCounter,
    pub created_ms: u64,
    pub seq: u64,
}
