//! Results of our own searches.
//!
//! The node has no front end; replies are logged and tallied per query so
//! our ultrapeer can be told how many results a search has gathered.

use gn_05_message_router::LocalSearchSink;
use lru::LruCache;
use parking_lot::Mutex;
use shared_types::{Guid, Message};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Searches whose tallies are kept.
pub const TRACKED_SEARCHES: usize = 256;

pub struct TallyingSearchSink {
    results: Mutex<LruCache<Guid, u32>>,
    pushes: AtomicU64,
}

impl TallyingSearchSink {
    pub fn new() -> Self {
        let cap = NonZeroUsize::new(TRACKED_SEARCHES).unwrap_or(NonZeroUsize::MIN);
        Self {
            results: Mutex::new(LruCache::new(cap)),
            pushes: AtomicU64::new(0),
        }
    }

    /// Start counting results for one of our searches.
    pub fn track(&self, guid: Guid) {
        self.results.lock().put(guid, 0);
    }

    /// Upload requests received for us.
    pub fn pushes(&self) -> u64 {
        self.pushes.load(Ordering::Relaxed)
    }
}

impl Default for TallyingSearchSink {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalSearchSink for TallyingSearchSink {
    fn on_query_reply(&self, reply: &Message) {
        let Some(hit) = reply.as_query_reply() else {
            return;
        };
        let hits = u32::from(hit.hit_count);
        let mut results = self.results.lock();
        let total = match results.get_mut(&reply.guid()) {
            Some(total) => {
                *total = total.saturating_add(hits);
                *total
            }
            None => {
                results.put(reply.guid(), hits);
                hits
            }
        };
        info!(
            "[search] {} results from {}:{} for {} ({} total)",
            hit.hit_count,
            hit.ip,
            hit.port,
            reply.guid(),
            total
        );
    }

    fn on_push(&self, push: &Message) {
        self.pushes.fetch_add(1, Ordering::Relaxed);
        if let Some(request) = push.as_push() {
            info!(
                "[search] Push request for file {} from {}:{}",
                request.index, request.ip, request.port
            );
        }
    }

    fn result_count(&self, guid: &Guid) -> Option<u32> {
        self.results.lock().peek(guid).copied()
    }
}
