//! Dynamic query thresholds.

/// Tuning for the controller. Defaults match long-standing network practice.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicQueryConfig {
    /// Highest TTL the controller ever sends.
    pub max_query_ttl: u8,
    /// Result target for queries from other ultrapeers.
    pub ultrapeer_results: u32,
    /// Multiplier on `ultrapeer_results` for our own queries.
    pub own_result_bump: f64,
    /// Result target for leaves that report their results.
    pub new_leaf_results: u32,
    /// Result target for leaves that do not.
    pub old_leaf_results: u32,
    /// Result target for URN queries.
    pub hash_query_results: u32,
    /// Once a leaf reports, routing this many results ends the query.
    pub max_routed_for_leaves: u64,
    /// Routed results that end any query.
    pub ultrapeer_result_cap: u64,
    /// Leaf report meaning "stop, I have enough".
    pub satisfaction_threshold: u32,

    pub initial_wait_per_hop_ms: u64,
    pub initial_decrease_per_hop_ms: u64,
    pub min_wait_per_hop_ms: u64,
    /// Query age after which the per-hop wait starts shrinking.
    pub decay_after_ms: u64,
    /// Delay before retrying when a step reached nobody.
    pub no_new_hosts_delay_ms: u64,
    pub max_query_time_ms: u64,
    /// Estimated hosts reached that end the query.
    pub max_theoretical_hosts: u64,
    /// Hosts credited for the leaf step.
    pub leaf_step_hosts: u64,
    /// Hosts assumed still needed when no result rate is known.
    pub default_hosts_to_query: u64,

    /// More than this many route-table links makes probe data adequate.
    pub adequate_probe_links: usize,
    pub max_hit_probes: usize,
    pub max_aggressive_hit_probes: usize,
    pub ttl2_probes: usize,
    /// Wait multiplier when a TTL-2 probe went out.
    pub ttl2_probe_wait_factor: f64,

    /// Dispatcher tick.
    pub dispatch_interval_ms: u64,
    /// How long finished queries stay known, to refuse late duplicates.
    pub finished_retention_ms: u64,
}

impl Default for DynamicQueryConfig {
    fn default() -> Self {
        Self {
            max_query_ttl: 6,
            ultrapeer_results: 150,
            own_result_bump: 1.15,
            new_leaf_results: 38,
            old_leaf_results: 20,
            hash_query_results: 10,
            max_routed_for_leaves: 75,
            ultrapeer_result_cap: 250,
            satisfaction_threshold: u16::MAX as u32,
            initial_wait_per_hop_ms: 2_400,
            initial_decrease_per_hop_ms: 10,
            min_wait_per_hop_ms: 100,
            decay_after_ms: 6_000,
            no_new_hosts_delay_ms: 6_000,
            max_query_time_ms: 200_000,
            max_theoretical_hosts: 110_000,
            leaf_step_hosts: 25,
            default_hosts_to_query: 40_000,
            adequate_probe_links: 8,
            max_hit_probes: 9,
            max_aggressive_hit_probes: 4,
            ttl2_probes: 3,
            ttl2_probe_wait_factor: 1.3,
            dispatch_interval_ms: 400,
            finished_retention_ms: 5 * 60 * 1_000,
        }
    }
}

impl DynamicQueryConfig {
    /// Same thresholds as production; tests drive time explicitly.
    pub fn for_testing() -> Self {
        Self::default()
    }

    /// Result target for our own queries.
    pub fn own_results(&self) -> u32 {
        (self.ultrapeer_results as f64 * self.own_result_bump) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_own_query_target() {
        assert_eq!(DynamicQueryConfig::default().own_results(), 172);
    }
}
