//! Probe planning.
//!
//! The first network step sends cheap TTL-1 and TTL-2 copies to a few
//! ultrapeers, chosen by what their query route tables say about the query.

use super::config::DynamicQueryConfig;
use crate::ports::UltrapeerLink;
use shared_types::Message;
use std::sync::Arc;

/// Links to probe at TTL 1 and at TTL 2.
#[derive(Default)]
pub struct ProbePlan {
    pub ttl1: Vec<Arc<dyn UltrapeerLink>>,
    pub ttl2: Vec<Arc<dyn UltrapeerLink>>,
}

impl ProbePlan {
    /// Split `links` into tables that admit the query (hits), tables that
    /// block it (misses) and links without a table, then choose probes.
    pub fn build(
        links: &[Arc<dyn UltrapeerLink>],
        query: &Message,
        config: &DynamicQueryConfig,
    ) -> Self {
        let mut hits = Vec::new();
        let mut misses = Vec::new();
        let mut old = Vec::new();
        for link in links {
            if !link.is_query_routing() {
                old.push(link.clone());
            } else if link.should_forward_query(query) {
                hits.push(link.clone());
            } else {
                misses.push(link.clone());
            }
        }

        let mut plan = ProbePlan::default();
        let adequate = misses.len() + hits.len() > config.adequate_probe_links;

        if hits.is_empty() || !adequate {
            // Too little to go on: probe some hits plus a few unknowns at TTL 2.
            plan.ttl2 = take_from(&old, &misses, config.ttl2_probes);
            let n = hits.len().min(config.max_aggressive_hit_probes);
            plan.ttl1 = hits[..n].to_vec();
            return plan;
        }

        if misses.is_empty() {
            // Every table matches: the content is popular, one probe will do.
            plan.ttl1.push(hits[0].clone());
            return plan;
        }

        if hits.len() > 3 {
            let n = hits.len().min(config.max_hit_probes);
            plan.ttl1 = hits[hits.len() - n..].to_vec();
            return plan;
        }

        plan.ttl1 = hits;
        plan.ttl2 = take_from(&old, &misses, config.ttl2_probes);
        plan
    }

    /// How long to wait for probe results before the next step.
    pub fn time_to_wait(&self, wait_per_hop_ms: u64, config: &DynamicQueryConfig) -> u64 {
        if !self.ttl2.is_empty() {
            (wait_per_hop_ms as f64 * config.ttl2_probe_wait_factor) as u64
        } else if !self.ttl1.is_empty() {
            (wait_per_hop_ms as f64 * (self.ttl1.len() as f64 / 2.0)) as u64
        } else {
            0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ttl1.is_empty() && self.ttl2.is_empty()
    }
}

/// Up to `n` links from `first`, topped up from `second`.
fn take_from(
    first: &[Arc<dyn UltrapeerLink>],
    second: &[Arc<dyn UltrapeerLink>],
    n: usize,
) -> Vec<Arc<dyn UltrapeerLink>> {
    first.iter().chain(second.iter()).take(n).cloned().collect()
}

impl std::fmt::Debug for ProbePlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids = |links: &[Arc<dyn UltrapeerLink>]| links.iter().map(|l| l.id()).collect::<Vec<_>>();
        f.debug_struct("ProbePlan")
            .field("ttl1", &ids(&self.ttl1))
            .field("ttl2", &ids(&self.ttl2))
            .finish()
    }
}
