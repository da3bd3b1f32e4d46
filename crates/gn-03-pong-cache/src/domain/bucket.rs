//! Fixed-capacity hop buckets.

use shared_types::Message;
use std::collections::VecDeque;

/// A pong plus the time it entered the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedPong {
    pub message: Message,
    pub cached_at_ms: u64,
}

/// One queue per hop count, newest at the front.
///
/// Inserting into a full queue evicts its oldest pong.
#[derive(Debug)]
pub(crate) struct HopBuckets {
    buckets: Vec<VecDeque<CachedPong>>,
    capacity: usize,
}

impl HopBuckets {
    pub fn new(hops: u8, capacity: usize) -> Self {
        Self {
            buckets: (0..hops).map(|_| VecDeque::with_capacity(capacity)).collect(),
            capacity: capacity.max(1),
        }
    }

    pub fn insert(&mut self, pong: CachedPong, hops: u8) {
        let Some(bucket) = self.buckets.get_mut(hops as usize) else {
            return;
        };
        if bucket.len() >= self.capacity {
            bucket.pop_back();
        }
        bucket.push_front(pong);
    }

    /// Pongs from the highest hop bucket down, newest first within a bucket.
    pub fn iter(&self) -> impl Iterator<Item = &CachedPong> {
        self.buckets.iter().rev().flat_map(|b| b.iter())
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&CachedPong) -> bool) {
        for bucket in &mut self.buckets {
            bucket.retain(&mut keep);
        }
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
