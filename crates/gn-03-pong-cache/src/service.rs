//! Pong cache service.

use crate::domain::{CachedPong, HopBuckets, PongCacheConfig};
use parking_lot::Mutex;
use shared_types::{Message, NodeRole, TimeSource};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Caches the best recent ultrapeer pongs per locale.
///
/// Only an ultrapeer answers pings from the cache, so a leaf never stores
/// anything.
pub struct PongCacher {
    config: PongCacheConfig,
    clock: Arc<dyn TimeSource>,
    role: Arc<dyn NodeRole>,
    pongs: Mutex<HashMap<String, HopBuckets>>,
}

impl PongCacher {
    pub fn new(
        config: PongCacheConfig,
        clock: Arc<dyn TimeSource>,
        role: Arc<dyn NodeRole>,
    ) -> Self {
        Self {
            config,
            clock,
            role,
            pongs: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &PongCacheConfig {
        &self.config
    }

    /// Offer a pong to the cache. Returns whether it was stored.
    pub fn add_pong(&self, message: &Message) -> bool {
        if !self.role.is_ultrapeer() {
            return false;
        }
        let Some(pong) = message.as_pong() else {
            return false;
        };
        if !pong.is_ultrapeer() || !pong.has_free_slots() {
            return false;
        }
        if message.hops() >= self.config.hop_buckets {
            return false;
        }
        if !pong.has_routable_address() {
            trace!("[gn-03] Not caching pong from unroutable {}", pong.socket_addr());
            return false;
        }

        let locale = pong
            .locale()
            .unwrap_or_else(|| self.config.default_locale.clone());
        let entry = CachedPong {
            message: message.clone(),
            cached_at_ms: self.clock.now_ms(),
        };
        let mut pongs = self.pongs.lock();
        pongs
            .entry(locale)
            .or_insert_with(|| {
                HopBuckets::new(self.config.hop_buckets, self.config.pongs_per_hop)
            })
            .insert(entry, message.hops());
        true
    }

    /// Up to one pong per hop bucket for `locale`, farthest first.
    ///
    /// A locale other than the default is topped up with default-locale pongs
    /// when it cannot fill every bucket.
    pub fn get_best_pongs(&self, locale: &str) -> Vec<Message> {
        let now = self.clock.now_ms();
        let wanted = self.config.hop_buckets as usize;
        let mut pongs = self.pongs.lock();
        let mut out = Vec::with_capacity(wanted);

        self.collect_fresh(&mut pongs, locale, now, &mut out, 0);
        if locale != self.config.default_locale && out.len() < wanted {
            let already = out.len();
            let default_locale = self.config.default_locale.clone();
            self.collect_fresh(&mut pongs, &default_locale, now, &mut out, already);
        }
        out
    }

    /// Walk at most `hop_buckets - start` cached pongs of `locale`, keeping
    /// fresh ones and dropping expired ones.
    fn collect_fresh(
        &self,
        pongs: &mut HashMap<String, HopBuckets>,
        locale: &str,
        now: u64,
        out: &mut Vec<Message>,
        start: usize,
    ) {
        let Some(buckets) = pongs.get_mut(locale) else {
            return;
        };
        let expiry = self.config.expiry_for(locale);
        let budget = (self.config.hop_buckets as usize).saturating_sub(start);
        let mut stale = 0usize;

        for cached in buckets.iter().take(budget) {
            if now.saturating_sub(cached.cached_at_ms) > expiry {
                stale += 1;
            } else {
                out.push(cached.message.clone());
            }
        }
        if stale > 0 {
            buckets.retain(|c| now.saturating_sub(c.cached_at_ms) <= expiry);
            debug!("[gn-03] Expired {} pongs for locale {}", stale, locale);
            if buckets.is_empty() {
                pongs.remove(locale);
            }
        }
    }

    /// Total cached pongs across locales.
    pub fn len(&self) -> usize {
        self.pongs.lock().values().map(HopBuckets::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.pongs.lock().clear();
    }
}

impl std::fmt::Debug for PongCacher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PongCacher")
            .field("config", &self.config)
            .field("cached", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{Guid, ManualTimeSource, Payload, PingReply};
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicBool, Ordering};

    // =========================================================================
    // MOCK IMPLEMENTATIONS FOR TESTING
    // =========================================================================

    struct MockRole(AtomicBool);

    impl NodeRole for MockRole {
        fn is_ultrapeer(&self) -> bool {
            self.0.load(Ordering::Relaxed)
        }
    }

    fn cacher(ultrapeer: bool) -> (PongCacher, Arc<ManualTimeSource>) {
        let clock = Arc::new(ManualTimeSource::new(1_000));
        let cacher = PongCacher::new(
            PongCacheConfig::for_testing(),
            clock.clone(),
            Arc::new(MockRole(AtomicBool::new(ultrapeer))),
        );
        (cacher, clock)
    }

    fn pong(last_octet: u8, hops: u8, locale: Option<&str>) -> Message {
        let mut reply =
            PingReply::new(Ipv4Addr::new(64, 61, 25, last_octet), 6346, 5, 100).with_ultrapeer(2, 1);
        if let Some(loc) = locale {
            reply = reply.with_locale(loc);
        }
        Message::new(Guid::new_random(), 3, hops, Payload::Pong(reply))
    }

    fn addr(message: &Message) -> Option<u8> {
        message.as_pong().map(|p| p.ip.octets()[3])
    }

    #[test]
    fn test_best_pongs_ordered_by_hops_then_expire() {
        let (cacher, clock) = cacher(true);
        assert!(cacher.add_pong(&pong(1, 0, None)));
        assert!(cacher.add_pong(&pong(2, 2, None)));

        let best = cacher.get_best_pongs("en");
        assert_eq!(best.iter().map(addr).collect::<Vec<_>>(), vec![Some(2), Some(1)]);

        clock.advance(6_001);
        assert!(cacher.get_best_pongs("en").is_empty());
        assert!(cacher.is_empty());
    }

    #[test]
    fn test_leaf_never_caches() {
        let (cacher, _) = cacher(false);
        assert!(!cacher.add_pong(&pong(1, 0, None)));
        assert!(cacher.is_empty());
    }

    #[test]
    fn test_rejects_unsuitable_pongs() {
        let (cacher, _) = cacher(true);
        let leaf_pong = Message::new(
            Guid::new_random(),
            3,
            1,
            Payload::Pong(PingReply::new(Ipv4Addr::new(64, 61, 25, 1), 6346, 0, 0)),
        );
        let full = Message::new(
            Guid::new_random(),
            3,
            1,
            Payload::Pong(
                PingReply::new(Ipv4Addr::new(64, 61, 25, 2), 6346, 0, 0).with_ultrapeer(0, 0),
            ),
        );
        let private = Message::new(
            Guid::new_random(),
            3,
            1,
            Payload::Pong(
                PingReply::new(Ipv4Addr::new(10, 0, 0, 1), 6346, 0, 0).with_ultrapeer(1, 1),
            ),
        );
        assert!(!cacher.add_pong(&leaf_pong));
        assert!(!cacher.add_pong(&full));
        assert!(!cacher.add_pong(&private));
        assert!(!cacher.add_pong(&pong(3, 6, None)));
        assert!(cacher.is_empty());
    }

    #[test]
    fn test_newer_pong_replaces_same_hop() {
        let (cacher, _) = cacher(true);
        cacher.add_pong(&pong(1, 3, None));
        cacher.add_pong(&pong(2, 3, None));
        assert_eq!(cacher.len(), 1);
        assert_eq!(addr(&cacher.get_best_pongs("en")[0]), Some(2));
    }

    #[test]
    fn test_foreign_locale_filled_from_default() {
        let (cacher, _) = cacher(true);
        cacher.add_pong(&pong(10, 1, Some("de")));
        for hops in 0..6 {
            cacher.add_pong(&pong(20 + hops, hops, None));
        }
        let best = cacher.get_best_pongs("de");
        assert_eq!(best.len(), 6);
        assert_eq!(addr(&best[0]), Some(10));
        // Top-up starts from the farthest default-locale pongs.
        assert_eq!(addr(&best[1]), Some(25));
        assert_eq!(addr(&best[5]), Some(21));
    }

    #[test]
    fn test_foreign_pongs_outlive_default_ones() {
        let (cacher, clock) = cacher(true);
        cacher.add_pong(&pong(1, 1, Some("ja")));
        cacher.add_pong(&pong(2, 1, None));
        clock.advance(10_000);
        let best = cacher.get_best_pongs("ja");
        assert_eq!(best.iter().map(addr).collect::<Vec<_>>(), vec![Some(1)]);
        assert_eq!(cacher.len(), 1);
    }

    #[test]
    fn test_clear() {
        let (cacher, _) = cacher(true);
        cacher.add_pong(&pong(1, 1, None));
        cacher.clear();
        assert!(cacher.get_best_pongs("en").is_empty());
    }
}
