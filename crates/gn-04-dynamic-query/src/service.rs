//! Query dispatcher.
//!
//! Owns every active [`DynamicQuery`] and advances them on each tick of the
//! background scheduler.

use crate::domain::{DynamicQuery, DynamicQueryConfig, QueryState};
use crate::error::DynamicQueryError;
use crate::ports::{DynamicQueryApi, QueryNetwork};
use parking_lot::Mutex;
use shared_types::{Guid, HandlerId, TimeSource};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// A running query and the parts of it readable while its step runs.
struct ActiveQuery {
    handler: HandlerId,
    /// Highest count the leaf reported, folded into the query before each step.
    leaf_results: AtomicU32,
    state: Mutex<QueryState>,
    query: Mutex<DynamicQuery>,
}

impl ActiveQuery {
    fn new(query: DynamicQuery) -> Self {
        Self {
            handler: query.handler().id(),
            leaf_results: AtomicU32::new(query.leaf_results()),
            state: Mutex::new(query.state()),
            query: Mutex::new(query),
        }
    }

    fn sync_leaf_results(&self, query: &mut DynamicQuery) {
        query.update_leaf_results(self.leaf_results.load(Ordering::Acquire));
    }
}

/// Drives all dynamic queries.
///
/// Each query keeps its place in the map while its step runs and is locked on
/// its own, so the network port may call back into the dispatcher (stop,
/// leaf reports, handler removal) from inside a step.
pub struct QueryDispatcher {
    config: DynamicQueryConfig,
    clock: Arc<dyn TimeSource>,
    network: Arc<dyn QueryNetwork>,
    queries: Mutex<HashMap<Guid, Arc<ActiveQuery>>>,
    /// Recently finished queries and when they finished.
    finished: Mutex<HashMap<Guid, (QueryState, u64)>>,
}

impl QueryDispatcher {
    pub fn new(
        config: DynamicQueryConfig,
        clock: Arc<dyn TimeSource>,
        network: Arc<dyn QueryNetwork>,
    ) -> Self {
        Self {
            config,
            clock,
            network,
            queries: Mutex::new(HashMap::new()),
            finished: Mutex::new(HashMap::new()),
        }
    }

    fn record_finished(&self, guid: Guid, state: QueryState, now_ms: u64) {
        self.finished.lock().insert(guid, (state, now_ms));
    }

    fn purge_finished(&self, now_ms: u64) {
        let retention = self.config.finished_retention_ms;
        self.finished
            .lock()
            .retain(|_, (_, at)| now_ms.saturating_sub(*at) <= retention);
    }

    /// Remove `guid` only if it still maps to `active`.
    fn remove_if_current(&self, guid: &Guid, active: &Arc<ActiveQuery>) -> bool {
        let mut queries = self.queries.lock();
        let current = queries
            .get(guid)
            .is_some_and(|entry| Arc::ptr_eq(entry, active));
        if current {
            queries.remove(guid);
        }
        current
    }

    fn step(&self, guid: Guid, active: &Arc<ActiveQuery>, now: u64) {
        let mut query = active.query.lock();
        active.sync_leaf_results(&mut query);
        query.send_step(now, self.network.as_ref(), &self.config);
        // Reports that arrived during the step.
        active.sync_leaf_results(&mut query);

        match query.finish_reason(now, &self.config) {
            Some(state) => {
                query.finish(state);
                *active.state.lock() = query.state();
                // Stopped or dropped while its step ran: already accounted for.
                if self.remove_if_current(&guid, active) {
                    info!(
                        "[gn-04] Query {} finished as {:?} after {} hosts",
                        guid,
                        state,
                        query.theoretical_hosts()
                    );
                    self.record_finished(guid, state, now);
                }
            }
            None => *active.state.lock() = query.state(),
        }
    }
}

impl DynamicQueryApi for QueryDispatcher {
    fn config(&self) -> &DynamicQueryConfig {
        &self.config
    }

    fn add_query(&self, query: DynamicQuery) -> Result<(), DynamicQueryError> {
        let guid = query.guid();
        if self.is_finished(&guid) {
            return Err(DynamicQueryError::AlreadyFinished(guid));
        }

        let target = query.target();
        let active = Arc::new(ActiveQuery::new(query));
        // Held until the first step is out so no tick runs ahead of it.
        let mut first = active.query.lock();
        match self.queries.lock().entry(guid) {
            Entry::Occupied(_) => return Err(DynamicQueryError::AlreadyRunning(guid)),
            Entry::Vacant(slot) => {
                slot.insert(active.clone());
            }
        }

        let now = self.clock.now_ms();
        first.send_step(now, self.network.as_ref(), &self.config);
        active.sync_leaf_results(&mut first);
        *active.state.lock() = first.state();
        debug!("[gn-04] Started dynamic query {} (target {})", guid, target);
        Ok(())
    }

    fn process_queries(&self) {
        let now = self.clock.now_ms();
        let batch: Vec<(Guid, Arc<ActiveQuery>)> = self
            .queries
            .lock()
            .iter()
            .map(|(guid, active)| (*guid, active.clone()))
            .collect();

        for (guid, active) in &batch {
            self.step(*guid, active, now);
        }
        self.purge_finished(now);
    }

    fn update_leaf_results(&self, guid: &Guid, results: u32) {
        let now = self.clock.now_ms();
        if results >= self.config.satisfaction_threshold {
            if let Some(active) = self.queries.lock().remove(guid) {
                *active.state.lock() = QueryState::Satisfied;
            }
            debug!("[gn-04] Leaf reported {} done", guid);
            self.record_finished(*guid, QueryState::Satisfied, now);
            return;
        }
        if let Some(active) = self.queries.lock().get(guid) {
            active.leaf_results.fetch_max(results, Ordering::AcqRel);
        }
    }

    fn leaf_results(&self, guid: &Guid) -> Option<u32> {
        self.queries
            .lock()
            .get(guid)
            .map(|active| active.leaf_results.load(Ordering::Acquire))
    }

    fn stop_query(&self, guid: &Guid) -> bool {
        let removed = self.queries.lock().remove(guid).is_some();
        if removed {
            debug!("[gn-04] Stopped query {}", guid);
        }
        self.record_finished(*guid, QueryState::Terminated, self.clock.now_ms());
        removed
    }

    fn remove_reply_handler(&self, handler: HandlerId) {
        self.queries
            .lock()
            .retain(|_, active| active.handler != handler);
    }

    fn is_finished(&self, guid: &Guid) -> bool {
        let now = self.clock.now_ms();
        self.finished
            .lock()
            .get(guid)
            .is_some_and(|(_, at)| now.saturating_sub(*at) <= self.config.finished_retention_ms)
    }

    fn query_state(&self, guid: &Guid) -> Option<QueryState> {
        if let Some(active) = self.queries.lock().get(guid) {
            return Some(*active.state.lock());
        }
        self.finished.lock().get(guid).map(|(state, _)| *state)
    }

    fn active_queries(&self) -> usize {
        self.queries.lock().len()
    }
}

impl std::fmt::Debug for QueryDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryDispatcher")
            .field("active", &self.queries.lock().len())
            .field("finished", &self.finished.lock().len())
            .finish()
    }
}
