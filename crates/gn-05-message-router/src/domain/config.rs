//! Router configuration.

use shared_types::Guid;
use std::net::Ipv4Addr;

/// Who we are on the network.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalNode {
    /// Our servent identifier, carried in our query replies.
    pub client_guid: Guid,
    pub ip: Ipv4Addr,
    pub port: u16,
    pub locale: String,
}

impl Default for LocalNode {
    fn default() -> Self {
        Self {
            client_guid: Guid::new_random(),
            ip: Ipv4Addr::UNSPECIFIED,
            port: 6346,
            locale: "en".to_string(),
        }
    }
}

/// Per-connection timing thresholds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionTimings {
    /// Minimum gap between pings we answer on one connection.
    pub ping_throttle_ms: u64,
    /// Minimum gap between pongs we forward to one leaf.
    pub pong_throttle_ms: u64,
    /// Age after which a connection counts as stable.
    pub stable_after_ms: u64,
    /// Interval between route table updates sent to an ultrapeer.
    pub ultrapeer_qrp_interval_ms: u64,
    /// Interval between route table updates sent to our ultrapeer as a leaf.
    pub leaf_qrp_interval_ms: u64,
    /// Outbound queue length per connection.
    pub send_queue_len: usize,
}

impl Default for ConnectionTimings {
    fn default() -> Self {
        Self {
            ping_throttle_ms: 2_500,
            pong_throttle_ms: 12_000,
            stable_after_ms: 5_000,
            ultrapeer_qrp_interval_ms: 60 * 1000,
            leaf_qrp_interval_ms: 5 * 60 * 1000,
            send_queue_len: 256,
        }
    }
}

/// Message router configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct RouterConfig {
    pub local: LocalNode,
    pub timings: ConnectionTimings,

    /// Leaf slots we offer as an ultrapeer.
    pub max_leaves: usize,
    /// Ultrapeer connections we keep as an ultrapeer.
    pub max_ultrapeers: usize,
    /// Ultrapeers we keep as a leaf.
    pub max_leaf_ultrapeers: usize,

    /// Connections tried when forwarding from an ultrapeer we do not trust.
    pub limited_forward_connections: usize,
    /// Ultrapeers a leaf sends its own queries to.
    pub leaf_originate_connections: usize,
    /// Leaves above which a mostly-matching query goes to a random quarter.
    pub leaf_quarter_min_leaves: usize,
    pub leaf_quarter_hit_ratio: f64,

    /// Results routed for one query after which replies are dropped.
    pub max_routed_results: u64,
    /// Bytes routed per query before further replies are dropped, by TTL.
    pub reply_budget_ttl1: u64,
    pub reply_budget_ttl2: u64,
    pub reply_budget_far: u64,

    /// Peers above which ping broadcasts are thinned out.
    pub ping_fanout_threshold: usize,
    /// Chance to skip a pong-caching peer when thinning.
    pub ping_skip_pong_caching: f64,
    /// Chance to skip any other peer when thinning.
    pub ping_skip_other: f64,

    /// Peers a connect-back request is redirected to.
    pub connect_back_redirects: usize,
    /// Addresses remembered per connect-back kind.
    pub connect_back_memory: usize,
    pub connect_back_clear_ms: u64,

    /// Minimum gap between query keys handed out.
    pub query_key_delay_ms: u64,
    /// Idle time after which a UDP reply handler is forgotten.
    pub udp_handler_idle_ms: u64,
    pub udp_cache_clean_ms: u64,
    pub qrp_propagate_ms: u64,
    pub route_purge_ms: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            local: LocalNode::default(),
            timings: ConnectionTimings::default(),
            max_leaves: 30,
            max_ultrapeers: 32,
            max_leaf_ultrapeers: 3,
            limited_forward_connections: 15,
            leaf_originate_connections: 3,
            leaf_quarter_min_leaves: 8,
            leaf_quarter_hit_ratio: 0.8,
            max_routed_results: 100,
            reply_budget_ttl1: 200 * 1024,
            reply_budget_ttl2: 100 * 1024,
            reply_budget_far: 50 * 1024,
            ping_fanout_threshold: 3,
            ping_skip_pong_caching: 0.7,
            ping_skip_other: 0.9,
            connect_back_redirects: 5,
            connect_back_memory: 200,
            connect_back_clear_ms: 5 * 60 * 1000,
            query_key_delay_ms: 1_000,
            udp_handler_idle_ms: 60 * 1000,
            udp_cache_clean_ms: 60 * 1000,
            qrp_propagate_ms: 10 * 1000,
            route_purge_ms: 30 * 1000,
        }
    }
}

impl RouterConfig {
    /// Create a configuration for testing.
    ///
    /// Random thinning is disabled so fan-out is deterministic.
    pub fn for_testing() -> Self {
        Self {
            local: LocalNode {
                client_guid: Guid::from_bytes([0x11; 16]),
                ip: Ipv4Addr::new(64, 61, 25, 171),
                port: 6346,
                locale: "en".to_string(),
            },
            ping_skip_pong_caching: 0.0,
            ping_skip_other: 0.0,
            query_key_delay_ms: 0,
            ..Self::default()
        }
    }
}
