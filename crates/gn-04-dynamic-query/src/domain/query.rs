//! Per-query controller state.

use super::config::DynamicQueryConfig;
use super::host_math::{calculate_ttl, hosts_reached};
use super::probe::ProbePlan;
use crate::error::DynamicQueryError;
use crate::ports::{QueryNetwork, UltrapeerLink};
use gn_01_route_table::ResultCounter;
use rand::seq::SliceRandom;
use shared_types::{Guid, HandlerId, Message, ReplyHandler};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Lifecycle of a dynamic query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryState {
    /// Leaf and probe steps.
    Probe,
    /// At least one extended step went out.
    Extended,
    /// Enough results, or the leaf said it is done.
    Satisfied,
    /// Stopped, timed out, or out of hosts.
    Terminated,
}

impl QueryState {
    pub fn is_finished(&self) -> bool {
        matches!(self, QueryState::Satisfied | QueryState::Terminated)
    }
}

/// Who the query runs for, which sets its result target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOrigin {
    /// This node's own search.
    Local,
    /// A query from another ultrapeer.
    Ultrapeer,
    /// A leaf that reports its results.
    NewLeaf,
    /// A leaf that does not.
    OldLeaf,
}

/// A query being widened step by step.
pub struct DynamicQuery {
    query: Message,
    target: u32,
    handler: Arc<dyn ReplyHandler>,
    counter: ResultCounter,
    pref_locale: String,
    state: QueryState,

    leaf_results: u32,
    theoretical_hosts: u64,
    wait_per_hop_ms: u64,
    decrease_per_hop_ms: u64,
    decrements: u64,
    next_query_ms: u64,
    start_ms: Option<u64>,

    forwarded_to_leaves: bool,
    probe_sent: bool,
    queried: HashSet<HandlerId>,
    probe_queried: Vec<Arc<dyn UltrapeerLink>>,
}

impl DynamicQuery {
    /// Wrap `query`, routed back through `handler` and tallied by `counter`.
    pub fn new(
        query: Message,
        origin: QueryOrigin,
        handler: Arc<dyn ReplyHandler>,
        counter: ResultCounter,
        config: &DynamicQueryConfig,
    ) -> Result<Self, DynamicQueryError> {
        let request = query
            .as_query()
            .ok_or(DynamicQueryError::NotAQuery(query.guid()))?;
        let target = if request.is_urn_query() {
            config.hash_query_results
        } else {
            match origin {
                QueryOrigin::Local => config.own_results(),
                QueryOrigin::Ultrapeer => config.ultrapeer_results,
                QueryOrigin::NewLeaf => config.new_leaf_results,
                QueryOrigin::OldLeaf => config.old_leaf_results,
            }
        };
        let pref_locale = handler.locale_pref();
        Ok(Self {
            query,
            target,
            handler,
            counter,
            pref_locale,
            state: QueryState::Probe,
            leaf_results: 0,
            theoretical_hosts: 1,
            wait_per_hop_ms: config.initial_wait_per_hop_ms,
            decrease_per_hop_ms: config.initial_decrease_per_hop_ms,
            decrements: 0,
            next_query_ms: 0,
            start_ms: None,
            forwarded_to_leaves: false,
            probe_sent: false,
            queried: HashSet::new(),
            probe_queried: Vec::new(),
        })
    }

    pub fn guid(&self) -> Guid {
        self.query.guid()
    }

    pub fn query(&self) -> &Message {
        &self.query
    }

    pub fn handler(&self) -> &Arc<dyn ReplyHandler> {
        &self.handler
    }

    pub fn state(&self) -> QueryState {
        self.state
    }

    pub fn target(&self) -> u32 {
        self.target
    }

    pub fn leaf_results(&self) -> u32 {
        self.leaf_results
    }

    pub fn theoretical_hosts(&self) -> u64 {
        self.theoretical_hosts
    }

    pub fn wait_per_hop_ms(&self) -> u64 {
        self.wait_per_hop_ms
    }

    pub fn next_query_ms(&self) -> u64 {
        self.next_query_ms
    }

    /// Keep the highest count a leaf has reported.
    pub fn update_leaf_results(&mut self, results: u32) {
        if results > self.leaf_results {
            self.leaf_results = results;
        }
    }

    /// Move to a finished state. Finished queries stay finished.
    pub fn finish(&mut self, state: QueryState) {
        if !self.state.is_finished() {
            self.state = state;
        }
    }

    /// The state the query should end in, if it should end now.
    pub fn finish_reason(&self, now_ms: u64, config: &DynamicQueryConfig) -> Option<QueryState> {
        let start = self.start_ms?;
        let routed = self.counter.results_routed();

        if self.leaf_results >= config.satisfaction_threshold {
            return Some(QueryState::Satisfied);
        }
        if self.leaf_results > 0 {
            if routed >= config.max_routed_for_leaves || self.leaf_results > self.target {
                return Some(QueryState::Satisfied);
            }
        } else if routed >= u64::from(self.target) {
            return Some(QueryState::Satisfied);
        }
        if routed >= config.ultrapeer_result_cap {
            return Some(QueryState::Satisfied);
        }
        if self.theoretical_hosts > config.max_theoretical_hosts {
            return Some(QueryState::Terminated);
        }
        if now_ms.saturating_sub(start) > config.max_query_time_ms {
            return Some(QueryState::Terminated);
        }
        None
    }

    /// Perform the next step, if its wait has elapsed.
    pub fn send_step(&mut self, now_ms: u64, network: &dyn QueryNetwork, config: &DynamicQueryConfig) {
        if self.state.is_finished() || self.finish_reason(now_ms, config).is_some() {
            return;
        }
        if now_ms < self.next_query_ms {
            return;
        }
        if self.start_ms.is_none() {
            self.start_ms = Some(now_ms);
        }
        trace!(
            "[gn-04] Step for {} ({:?}), hosts so far {}",
            self.guid(),
            self.state,
            self.theoretical_hosts
        );

        if !self.forwarded_to_leaves {
            self.forwarded_to_leaves = true;
            self.theoretical_hosts += config.leaf_step_hosts;
            let leaf_copy = self.query.with_ttl(1);
            if network.leaves_might_match(&leaf_copy) {
                network.forward_to_leaves(&leaf_copy, &self.handler);
                self.next_query_ms = now_ms + self.wait_per_hop_ms;
                return;
            }
        }

        if !self.probe_sent {
            self.send_probe(now_ms, network, config);
            return;
        }

        let new_hosts = self.send_extended(now_ms, network, config);
        if new_hosts == 0 {
            self.next_query_ms = now_ms + config.no_new_hosts_delay_ms;
        }
        self.theoretical_hosts += new_hosts;
        self.decay_wait(now_ms, config);
    }

    fn send_probe(&mut self, now_ms: u64, network: &dyn QueryNetwork, config: &DynamicQueryConfig) {
        let links = network.ultrapeers();
        let plan = ProbePlan::build(&links, &self.query, config);
        let wait = plan.time_to_wait(self.wait_per_hop_ms, config);
        debug!(
            "[gn-04] Probing {} with {} TTL-1 and {} TTL-2 copies",
            self.guid(),
            plan.ttl1.len(),
            plan.ttl2.len()
        );

        let mut hosts = 0;
        for link in &plan.ttl1 {
            hosts += self.send_to_link(1, link, now_ms);
        }
        for link in &plan.ttl2 {
            hosts += self.send_to_link(2, link, now_ms);
        }
        self.theoretical_hosts += hosts;
        self.next_query_ms = now_ms + wait;
        self.probe_sent = true;
    }

    /// Send to one more ultrapeer with a TTL sized from the result rate.
    /// Returns the hosts the copy should reach.
    fn send_extended(
        &mut self,
        now_ms: u64,
        network: &dyn QueryNetwork,
        config: &DynamicQueryConfig,
    ) -> u64 {
        let all = network.ultrapeers();
        let live: HashSet<HandlerId> = all.iter().map(|l| l.id()).collect();
        self.queried.retain(|id| live.contains(id));
        self.probe_queried.retain(|l| live.contains(&l.id()));

        let unqueried = |link: &&Arc<dyn UltrapeerLink>| {
            !self.queried.contains(&link.id())
                && !self.probe_queried.iter().any(|p| p.id() == link.id())
        };
        let mut candidates: Vec<Arc<dyn UltrapeerLink>> = all
            .iter()
            .filter(|l| l.locale() == self.pref_locale)
            .filter(unqueried)
            .cloned()
            .collect();
        if candidates.is_empty() {
            candidates = all.iter().filter(unqueried).cloned().collect();
        }
        candidates.shuffle(&mut rand::thread_rng());

        let length = candidates.len();
        let mut chosen = candidates.into_iter().find(|l| l.is_stable(now_ms));

        let mut remaining = (length + self.probe_queried.len()) as u64;
        if remaining == 0 {
            return 0;
        }
        if remaining > 4 {
            remaining -= 4;
        }

        let mut reusing_probe = false;
        if chosen.is_none() {
            if self.probe_queried.is_empty() {
                return 0;
            }
            chosen = Some(self.probe_queried.remove(0));
            reusing_probe = true;
        }
        let Some(link) = chosen else {
            return 0;
        };

        let results = if self.leaf_results > 0 {
            u64::from(self.leaf_results)
        } else {
            self.counter.results_routed()
        };
        let results_per_host = results as f64 / self.theoretical_hosts as f64;
        let needed = u64::from(self.target).saturating_sub(results);
        let hosts_to_query = if results_per_host > 0.0 {
            (needed as f64 / results_per_host) as u64
        } else {
            config.default_hosts_to_query
        };
        let per_connection = hosts_to_query / remaining;

        let mut ttl = calculate_ttl(
            per_connection,
            link.degree(),
            link.max_ttl(),
            config.max_query_ttl,
        );
        if ttl == 1
            && ((link.is_query_routing() && !link.should_forward_query(&self.query))
                || reusing_probe)
        {
            ttl = 2;
        }

        self.state = QueryState::Extended;
        debug!(
            "[gn-04] Extending {} to {} at TTL {} ({} hosts per link wanted)",
            self.guid(),
            link.id(),
            ttl,
            per_connection
        );
        self.send_to_link(ttl, &link, now_ms)
    }

    fn send_to_link(&mut self, ttl: u8, link: &Arc<dyn UltrapeerLink>, now_ms: u64) -> u64 {
        if !link.send_query(self.query.with_ttl(ttl)) {
            return 0;
        }
        if ttl == 1 && link.supports_probe_queries() {
            self.probe_queried.push(link.clone());
        } else {
            self.queried.insert(link.id());
        }
        self.next_query_ms = now_ms + u64::from(ttl) * self.wait_per_hop_ms;
        hosts_reached(link.degree(), ttl)
    }

    /// Shrink the per-hop wait once the query has run for a while, faster
    /// when few results have come back.
    fn decay_wait(&mut self, now_ms: u64, config: &DynamicQueryConfig) {
        let Some(start) = self.start_ms else {
            return;
        };
        if self.wait_per_hop_ms <= config.min_wait_per_hop_ms
            || now_ms.saturating_sub(start) <= config.decay_after_ms
        {
            return;
        }
        self.wait_per_hop_ms = self.wait_per_hop_ms.saturating_sub(self.decrease_per_hop_ms);

        let routed = self.counter.results_routed() as i64;
        let result_factor = (i64::from(self.target) / 2 - 30 * routed).max(1);
        let decrement_factor = (self.decrements as i64 / 6).max(1);
        let decrease = (result_factor * decrement_factor).max(5);
        self.decrease_per_hop_ms += decrease as u64;
        self.decrements += 1;
        self.wait_per_hop_ms = self.wait_per_hop_ms.max(config.min_wait_per_hop_ms);
    }
}

impl fmt::Debug for DynamicQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicQuery")
            .field("guid", &self.guid())
            .field("state", &self.state)
            .field("target", &self.target)
            .field("handler", &self.handler.id())
            .field("routed", &self.counter.results_routed())
            .field("leaf_results", &self.leaf_results)
            .field("theoretical_hosts", &self.theoretical_hosts)
            .finish()
    }
}
