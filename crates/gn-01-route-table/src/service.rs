//! Route table service.

use crate::domain::{ReplyRoutePair, ResultCounter, RouteEntry, RouteTableConfig};
use crate::error::RouteError;
use parking_lot::Mutex;
use shared_types::{Guid, HandlerId, ReplyHandler, TimeSource};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, trace};

/// GUID → reply handler map with two time generations and a hard capacity.
///
/// Every operation first runs the lazy generation swap, so a table that is
/// never purged by the scheduler still ages its entries correctly.
pub struct RouteTable {
    name: &'static str,
    config: RouteTableConfig,
    clock: Arc<dyn TimeSource>,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    new_gen: HashMap<Guid, RouteEntry>,
    old_gen: HashMap<Guid, RouteEntry>,
    handlers: HashMap<HandlerId, Arc<dyn ReplyHandler>>,
    routes_by_handler: HashMap<HandlerId, HashSet<Guid>>,
    /// Insertion order across both generations, for capacity eviction.
    by_seq: BTreeMap<u64, Guid>,
    next_seq: u64,
    next_switch_ms: u64,
}

impl Inner {
    fn lookup(&self, guid: &Guid) -> Option<&RouteEntry> {
        self.new_gen.get(guid).or_else(|| self.old_gen.get(guid))
    }

    fn handler_for(&self, guid: &Guid) -> Option<(&RouteEntry, &Arc<dyn ReplyHandler>)> {
        let entry = self.lookup(guid)?;
        let handler = self.handlers.get(&entry.handler_id)?;
        Some((entry, handler))
    }

    fn take(&mut self, guid: &Guid) -> Option<RouteEntry> {
        let entry = self
            .new_gen
            .remove(guid)
            .or_else(|| self.old_gen.remove(guid))?;
        self.unlink(guid, &entry);
        Some(entry)
    }

    fn unlink(&mut self, guid: &Guid, entry: &RouteEntry) {
        self.by_seq.remove(&entry.seq);
        if let Some(guids) = self.routes_by_handler.get_mut(&entry.handler_id) {
            guids.remove(guid);
            if guids.is_empty() {
                self.routes_by_handler.remove(&entry.handler_id);
                self.handlers.remove(&entry.handler_id);
            }
        }
    }

    fn insert(
        &mut self,
        guid: Guid,
        handler: Arc<dyn ReplyHandler>,
        counter: ResultCounter,
        created_ms: u64,
    ) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let handler_id = handler.id();
        self.by_seq.insert(seq, guid);
        self.routes_by_handler
            .entry(handler_id)
            .or_default()
            .insert(guid);
        self.handlers.insert(handler_id, handler);
        self.new_gen.insert(
            guid,
            RouteEntry {
                handler_id,
                counter,
                created_ms,
                seq,
            },
        );
    }

    /// Swap generations if the window elapsed or the new generation is full.
    fn purge(&mut self, now: u64, config: &RouteTableConfig) -> bool {
        if now < self.next_switch_ms && self.new_gen.len() < config.max_size {
            return false;
        }
        let promoted = std::mem::take(&mut self.new_gen);
        let dropped = std::mem::replace(&mut self.old_gen, promoted);
        for (guid, entry) in &dropped {
            self.unlink(guid, entry);
        }
        self.next_switch_ms = now.saturating_add(config.window_ms);
        true
    }

    fn enforce_capacity(&mut self, max_size: usize) -> usize {
        let mut evicted = 0;
        while self.new_gen.len() + self.old_gen.len() > max_size {
            let Some((_, guid)) = self.by_seq.iter().next().map(|(s, g)| (*s, *g)) else {
                break;
            };
            if self.take(&guid).is_none() {
                break;
            }
            evicted += 1;
        }
        evicted
    }

    fn len(&self) -> usize {
        self.new_gen.len() + self.old_gen.len()
    }
}

impl RouteTable {
    /// Create a table. `name` only labels log output.
    pub fn new(name: &'static str, config: RouteTableConfig, clock: Arc<dyn TimeSource>) -> Self {
        let inner = Inner {
            next_switch_ms: clock.now_ms().saturating_add(config.window_ms),
            ..Inner::default()
        };
        Self {
            name,
            config,
            clock,
            inner: Mutex::new(inner),
        }
    }

    pub fn config(&self) -> &RouteTableConfig {
        &self.config
    }

    fn locked_purged(&self) -> parking_lot::MutexGuard<'_, Inner> {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();
        if inner.purge(now, &self.config) {
            trace!(table = self.name, "[gn-01] generation swap");
        }
        inner
    }

    /// Route replies for `guid` to `handler`, replacing any existing route.
    ///
    /// An existing route keeps its counters and moves to the new generation.
    /// Returns `None` if the handler is already closed.
    pub fn route_reply(&self, guid: Guid, handler: Arc<dyn ReplyHandler>) -> Option<ResultCounter> {
        if !handler.is_open() {
            return None;
        }
        let now = self.clock.now_ms();
        let mut inner = self.locked_purged();
        let counter = inner
            .take(&guid)
            .map(|entry| entry.counter)
            .unwrap_or_default();
        inner.insert(guid, handler, counter.clone(), now);
        let evicted = inner.enforce_capacity(self.config.max_size);
        if evicted > 0 {
            debug!(table = self.name, evicted, "[gn-01] capacity eviction");
        }
        Some(counter)
    }

    /// Route replies for `guid` to `handler` only if no route exists yet.
    ///
    /// Returns `None` for a duplicate GUID or a closed handler.
    pub fn try_to_route_reply(
        &self,
        guid: Guid,
        handler: Arc<dyn ReplyHandler>,
    ) -> Option<ResultCounter> {
        if !handler.is_open() {
            return None;
        }
        let now = self.clock.now_ms();
        let mut inner = self.locked_purged();
        if inner.lookup(&guid).is_some() {
            return None;
        }
        let counter = ResultCounter::default();
        inner.insert(guid, handler, counter.clone(), now);
        let evicted = inner.enforce_capacity(self.config.max_size);
        if evicted > 0 {
            debug!(table = self.name, evicted, "[gn-01] capacity eviction");
        }
        Some(counter)
    }

    /// The open handler routed for `guid`, if any.
    pub fn get_reply_handler(&self, guid: &Guid) -> Option<Arc<dyn ReplyHandler>> {
        let inner = self.locked_purged();
        let (_, handler) = inner.handler_for(guid)?;
        handler.is_open().then(|| Arc::clone(handler))
    }

    /// Like [`get_reply_handler`](Self::get_reply_handler), and account
    /// `bytes` and `results` to the route.
    ///
    /// The returned pair carries the totals from before this reply.
    pub fn get_reply_handler_counted(
        &self,
        guid: &Guid,
        bytes: u64,
        results: u64,
    ) -> Option<ReplyRoutePair> {
        let inner = self.locked_purged();
        let (entry, handler) = inner.handler_for(guid)?;
        if !handler.is_open() {
            return None;
        }
        let (bytes_routed, results_routed) = entry.counter.add(bytes, results);
        Some(ReplyRoutePair {
            handler: Arc::clone(handler),
            bytes_routed,
            results_routed,
        })
    }

    /// True if any route exists for `guid`, open or not.
    pub fn has_route(&self, guid: &Guid) -> bool {
        self.locked_purged().lookup(guid).is_some()
    }

    /// Counters of the route for `guid`.
    pub fn result_counter(&self, guid: &Guid) -> Option<ResultCounter> {
        self.locked_purged()
            .lookup(guid)
            .map(|entry| entry.counter.clone())
    }

    /// Remove every route pointing at `handler_id`. Returns how many went.
    pub fn remove_reply_handler(&self, handler_id: HandlerId) -> usize {
        let mut inner = self.inner.lock();
        let guids: Vec<Guid> = inner
            .routes_by_handler
            .get(&handler_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        for guid in &guids {
            inner.take(guid);
        }
        inner.handlers.remove(&handler_id);
        if !guids.is_empty() {
            debug!(table = self.name, handler = %handler_id, removed = guids.len(), "[gn-01] handler removed");
        }
        guids.len()
    }

    /// Record the TTL a route was created with.
    pub fn set_ttl(&self, counter: &ResultCounter, ttl: u8) -> Result<(), RouteError> {
        if ttl == 0 {
            return Err(RouteError::InvalidTtl(ttl));
        }
        counter.store_ttl(ttl);
        Ok(())
    }

    /// Atomically raise the TTL of `guid` from `expected` to `new`.
    ///
    /// Returns `Ok(true)` only if the route existed with TTL `expected`.
    pub fn get_and_set_ttl(&self, guid: &Guid, expected: u8, new: u8) -> Result<bool, RouteError> {
        if expected < 1 || new <= expected {
            return Err(RouteError::InvalidTtlTransition { expected, new });
        }
        let inner = self.locked_purged();
        Ok(inner
            .lookup(guid)
            .is_some_and(|entry| entry.counter.compare_and_set_ttl(expected, new)))
    }

    /// Run the generation swap if due. Returns true if a swap happened.
    pub fn purge(&self) -> bool {
        let now = self.clock.now_ms();
        let swapped = self.inner.lock().purge(now, &self.config);
        if swapped {
            trace!(table = self.name, "[gn-01] generation swap");
        }
        swapped
    }

    /// Routes held across both generations.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Human-readable listing for diagnostics.
    pub fn dump(&self) -> String {
        let inner = self.inner.lock();
        let mut out = String::new();
        for (label, generation) in [("new", &inner.new_gen), ("old", &inner.old_gen)] {
            let _ = writeln!(out, "{} {label} ({}):", self.name, generation.len());
            for (guid, entry) in generation {
                let _ = writeln!(
                    out,
                    "  {guid} -> {} created={} results={} bytes={}",
                    entry.handler_id,
                    entry.created_ms,
                    entry.counter.results_routed(),
                    entry.counter.bytes_routed()
                );
            }
        }
        out
    }
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTable")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("len", &self.len())
            .finish()
    }
}

// =============================================================================
// MOCK IMPLEMENTATIONS FOR TESTING
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use shared_types::{HandlerKind, ManualTimeSource, Message};
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug)]
    struct MockHandler {
        id: HandlerId,
        open: AtomicBool,
    }

    impl MockHandler {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                id: HandlerId::next(),
                open: AtomicBool::new(true),
            })
        }

        fn close(&self) {
            self.open.store(false, Ordering::SeqCst);
        }
    }

    impl ReplyHandler for MockHandler {
        fn id(&self) -> HandlerId {
            self.id
        }
        fn kind(&self) -> HandlerKind {
            HandlerKind::Connection
        }
        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }
        fn address(&self) -> Option<SocketAddr> {
            None
        }
        fn handle_ping_reply(&self, _: &Message, _: Option<&dyn ReplyHandler>) {}
        fn handle_query_reply(&self, _: &Message, _: Option<&dyn ReplyHandler>) {}
        fn handle_push_request(&self, _: &Message, _: Option<&dyn ReplyHandler>) {}
        fn count_dropped_message(&self) {}
    }

    const WINDOW: u64 = 1_000;

    fn table(max_size: usize) -> (RouteTable, Arc<ManualTimeSource>) {
        let clock = Arc::new(ManualTimeSource::new(0));
        let table = RouteTable::new(
            "test",
            RouteTableConfig::new(WINDOW, max_size),
            clock.clone(),
        );
        (table, clock)
    }

    fn id_of(handler: Option<Arc<dyn ReplyHandler>>) -> Option<HandlerId> {
        handler.map(|h| h.id())
    }

    #[test]
    fn test_route_reply_and_lookup() {
        let (table, _) = table(100);
        let c1 = MockHandler::new();
        let g = Guid::new_random();
        assert!(table.route_reply(g, c1.clone()).is_some());
        assert_eq!(id_of(table.get_reply_handler(&g)), Some(c1.id));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_try_to_route_reply_refuses_duplicate() {
        let (table, _) = table(100);
        let g = Guid::new_random();
        let c1 = MockHandler::new();
        let c2 = MockHandler::new();
        assert!(table.try_to_route_reply(g, c1.clone()).is_some());
        assert!(table.try_to_route_reply(g, c2).is_none());
        assert_eq!(id_of(table.get_reply_handler(&g)), Some(c1.id));
    }

    #[test]
    fn test_closed_handler_is_not_routed() {
        let (table, _) = table(100);
        let c1 = MockHandler::new();
        c1.close();
        let g = Guid::new_random();
        assert!(table.route_reply(g, c1.clone()).is_none());
        assert!(table.try_to_route_reply(g, c1).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_lookup_skips_handler_closed_after_routing() {
        let (table, _) = table(100);
        let c1 = MockHandler::new();
        let g = Guid::new_random();
        table.route_reply(g, c1.clone());
        c1.close();
        assert!(table.get_reply_handler(&g).is_none());
        assert!(table.get_reply_handler_counted(&g, 10, 1).is_none());
        assert!(table.has_route(&g));
    }

    #[test]
    fn test_reroute_preserves_counters() {
        let (table, _) = table(100);
        let g = Guid::new_random();
        let c1 = MockHandler::new();
        let c2 = MockHandler::new();
        table.route_reply(g, c1.clone());
        table.get_reply_handler_counted(&g, 500, 5);

        let counter = table.route_reply(g, c2.clone()).unwrap();
        assert_eq!(counter.results_routed(), 5);
        assert_eq!(counter.bytes_routed(), 500);
        assert_eq!(id_of(table.get_reply_handler(&g)), Some(c2.id));
        // c1 no longer owns any route.
        assert_eq!(table.remove_reply_handler(c1.id), 0);
    }

    #[test]
    fn test_counted_lookup_returns_prior_totals() {
        let (table, _) = table(100);
        let g = Guid::new_random();
        let counter = table.route_reply(g, MockHandler::new()).unwrap();

        let first = table.get_reply_handler_counted(&g, 100, 3).unwrap();
        assert_eq!((first.bytes_routed, first.results_routed), (0, 0));
        let second = table.get_reply_handler_counted(&g, 50, 2).unwrap();
        assert_eq!((second.bytes_routed, second.results_routed), (100, 3));
        assert_eq!(counter.results_routed(), 5);
        assert_eq!(counter.bytes_routed(), 150);
    }

    #[test]
    fn test_remove_reply_handler_removes_all_routes() {
        let (table, _) = table(100);
        let c1 = MockHandler::new();
        let c2 = MockHandler::new();
        let guids: Vec<Guid> = (0..5).map(|_| Guid::new_random()).collect();
        for g in &guids {
            table.route_reply(*g, c1.clone());
        }
        let other = Guid::new_random();
        table.route_reply(other, c2.clone());

        assert_eq!(table.remove_reply_handler(c1.id), 5);
        for g in &guids {
            assert!(table.get_reply_handler(g).is_none());
        }
        assert_eq!(id_of(table.get_reply_handler(&other)), Some(c2.id));
    }

    #[test]
    fn test_remove_reply_handler_covers_old_generation() {
        let (table, clock) = table(100);
        let c1 = MockHandler::new();
        let g_old = Guid::new_random();
        table.route_reply(g_old, c1.clone());
        clock.advance(WINDOW + 1);
        let g_new = Guid::new_random();
        table.route_reply(g_new, c1.clone());

        assert_eq!(table.remove_reply_handler(c1.id), 2);
        assert!(table.is_empty());
    }

    #[test]
    fn test_generation_expiry_between_one_and_two_windows() {
        let (table, clock) = table(100);
        let c1 = MockHandler::new();
        let c2 = MockHandler::new();
        let g1 = Guid::new_random();
        let g2 = Guid::new_random();

        table.route_reply(g1, c1.clone());
        clock.advance(WINDOW + 1);
        table.route_reply(g2, c2.clone());
        assert_eq!(id_of(table.get_reply_handler(&g1)), Some(c1.id));

        clock.advance(WINDOW + 1);
        assert!(table.get_reply_handler(&g1).is_none());
        assert_eq!(id_of(table.get_reply_handler(&g2)), Some(c2.id));

        clock.advance(WINDOW + 1);
        assert!(table.get_reply_handler(&g2).is_none());
    }

    #[test]
    fn test_capacity_one_evicts_oldest() {
        let (table, _) = table(1);
        let c1 = MockHandler::new();
        let c2 = MockHandler::new();
        let g1 = Guid::new_random();
        let g2 = Guid::new_random();

        table.route_reply(g1, c1);
        table.route_reply(g2, c2.clone());

        assert!(table.get_reply_handler(&g1).is_none());
        assert_eq!(id_of(table.get_reply_handler(&g2)), Some(c2.id));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_capacity_bound_holds_under_load() {
        let (table, _) = table(10);
        let handler = MockHandler::new();
        let guids: Vec<Guid> = (0..50).map(|_| Guid::new_random()).collect();
        for g in &guids {
            table.route_reply(*g, handler.clone());
            assert!(table.len() <= 10);
        }
        assert!(table.get_reply_handler(&guids[49]).is_some());
        assert!(table.get_reply_handler(&guids[0]).is_none());
    }

    #[test]
    fn test_set_ttl_rejects_zero() {
        let (table, _) = table(100);
        let counter = table.route_reply(Guid::new_random(), MockHandler::new()).unwrap();
        assert_eq!(table.set_ttl(&counter, 0), Err(RouteError::InvalidTtl(0)));
        assert!(table.set_ttl(&counter, 3).is_ok());
        assert_eq!(counter.ttl(), 3);
    }

    #[test]
    fn test_get_and_set_ttl() {
        let (table, _) = table(100);
        let g = Guid::new_random();
        let counter = table.route_reply(g, MockHandler::new()).unwrap();
        table.set_ttl(&counter, 1).unwrap();

        assert!(table.get_and_set_ttl(&g, 0, 2).is_err());
        assert!(table.get_and_set_ttl(&g, 2, 2).is_err());
        assert_eq!(table.get_and_set_ttl(&g, 1, 3), Ok(true));
        assert_eq!(counter.ttl(), 3);
        assert_eq!(table.get_and_set_ttl(&g, 1, 3), Ok(false));
        assert_eq!(table.get_and_set_ttl(&Guid::new_random(), 1, 3), Ok(false));
    }

    #[test]
    fn test_purge_swaps_when_new_generation_full() {
        let (table, _) = table(2);
        table.route_reply(Guid::new_random(), MockHandler::new());
        table.route_reply(Guid::new_random(), MockHandler::new());
        assert!(table.purge());
        assert!(!table.purge());
    }

    #[test]
    fn test_dump_lists_routes() {
        let (table, _) = table(100);
        let g = Guid::new_random();
        table.route_reply(g, MockHandler::new());
        assert!(table.dump().contains(&g.to_hex()));
    }

    proptest! {
        #[test]
        fn prop_guid_routes_at_most_once(picks in proptest::collection::vec(0usize..8, 1..64)) {
            let (table, _) = table(1_000);
            let guids: Vec<Guid> = (0..8).map(|_| Guid::new_random()).collect();
            let mut seen = HashSet::new();
            for pick in picks {
                let accepted = table.try_to_route_reply(guids[pick], MockHandler::new()).is_some();
                prop_assert_eq!(accepted, seen.insert(pick));
            }
        }
    }
}
