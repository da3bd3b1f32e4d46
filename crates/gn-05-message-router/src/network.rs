//! The router's face towards the dynamic query controller.

use crate::domain::{ConnectionRegistry, ManagedConnection, RouterConfig};
use gn_02_query_routing::QueryRouteTable;
use gn_04_dynamic_query::{QueryNetwork, UltrapeerLink};
use parking_lot::RwLock;
use rand::Rng;
use shared_types::{HandlerId, Message, NodeRole, ReplyHandler};
use std::sync::Arc;
use tracing::trace;

/// Connection-level view used by both the router and the dispatcher.
///
/// Holds the last-hop table: our own content merged with the tables of
/// leaves that are not busy.
pub struct RouterNetwork {
    registry: Arc<ConnectionRegistry>,
    aggregate: RwLock<Option<QueryRouteTable>>,
    quarter_min_leaves: usize,
    quarter_hit_ratio: f64,
}

impl RouterNetwork {
    pub fn new(registry: Arc<ConnectionRegistry>, config: &RouterConfig) -> Self {
        Self {
            registry,
            aggregate: RwLock::new(None),
            quarter_min_leaves: config.leaf_quarter_min_leaves,
            quarter_hit_ratio: config.leaf_quarter_hit_ratio,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Merge `local` with every non-busy leaf's table.
    pub fn build_last_hop_table(&self, local: &QueryRouteTable) -> QueryRouteTable {
        let mut table = local.clone();
        for leaf in self.registry.client_connections() {
            if leaf.is_busy_leaf() {
                continue;
            }
            if let Some(received) = leaf.received_table() {
                table.add_all(&received);
            }
        }
        table
    }

    /// Rebuild and keep the last-hop table. Returns a copy.
    pub fn rebuild_aggregate(&self, local: &QueryRouteTable) -> QueryRouteTable {
        let table = self.build_last_hop_table(local);
        *self.aggregate.write() = Some(table.clone());
        trace!("[gn-05] Last-hop table rebuilt, {:.1}% full", table.percent_full());
        table
    }

    pub fn aggregate(&self) -> Option<QueryRouteTable> {
        self.aggregate.read().clone()
    }

    /// Send `query` to the leaves whose tables match, skipping `source`.
    ///
    /// When many leaves match, only a random quarter of them gets it.
    /// Returns how many copies were queued.
    pub fn forward_to_matching_leaves(&self, query: &Message, source: HandlerId) -> usize {
        if !self.registry.is_ultrapeer() {
            return 0;
        }
        let leaves = self.registry.client_connections();
        let hits: Vec<Arc<ManagedConnection>> = leaves
            .iter()
            .filter(|leaf| leaf.id() != source && leaf.hits_route_table(query))
            .cloned()
            .collect();
        let targets = self.thin_hits(&hits, leaves.len());

        let mut sent = 0;
        for leaf in targets {
            if leaf.send(query.clone()) {
                sent += 1;
            }
        }
        trace!(
            "[gn-05] Query {} to {}/{} matching leaves",
            query.guid(),
            sent,
            hits.len()
        );
        sent
    }

    fn thin_hits<'a>(
        &self,
        hits: &'a [Arc<ManagedConnection>],
        leaf_count: usize,
    ) -> &'a [Arc<ManagedConnection>] {
        if leaf_count <= self.quarter_min_leaves || hits.is_empty() {
            return hits;
        }
        let ratio = hits.len() as f64 / leaf_count as f64;
        if ratio <= self.quarter_hit_ratio {
            return hits;
        }
        let quarter = hits.len() / 4;
        let start = (rand::thread_rng().gen::<f64>() * hits.len() as f64 * 0.75) as usize;
        let start = start.min(hits.len() - quarter);
        &hits[start..start + quarter]
    }
}

impl QueryNetwork for RouterNetwork {
    fn ultrapeers(&self) -> Vec<Arc<dyn UltrapeerLink>> {
        self.registry
            .ultrapeer_connections()
            .into_iter()
            .map(|c| c as Arc<dyn UltrapeerLink>)
            .collect()
    }

    fn leaves_might_match(&self, query: &Message) -> bool {
        if let Some(table) = self.aggregate.read().as_ref() {
            return query.as_query().is_some_and(|q| table.contains(q));
        }
        self.registry
            .client_connections()
            .iter()
            .any(|leaf| leaf.hits_route_table(query))
    }

    fn forward_to_leaves(&self, query: &Message, handler: &Arc<dyn ReplyHandler>) {
        self.forward_to_matching_leaves(query, handler.id());
    }
}

impl std::fmt::Debug for RouterNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterNetwork")
            .field("registry", &self.registry)
            .field("has_aggregate", &self.aggregate.read().is_some())
            .finish()
    }
}
