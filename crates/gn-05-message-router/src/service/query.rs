//! Queries: duplicate and probe handling, forwarding, local evaluation and
//! our own searches.

use super::MessageRouter;
use crate::domain::{ConnectionRole, ManagedConnection};
use crate::error::RouterError;
use crate::metrics::RouterMetrics;
use gn_01_route_table::ResultCounter;
use gn_04_dynamic_query::{DynamicQuery, DynamicQueryError, QueryOrigin, UltrapeerLink};
use shared_types::{Message, NodeRole, ReplyHandler};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// A probe after hopping: sent with TTL 1 by us or by one of our leaves'
/// ultrapeers.
fn is_probe_query(query: &Message) -> bool {
    query.ttl() == 0 && (query.hops() == 1 || query.hops() == 2)
}

impl MessageRouter {
    /// Route a hopped query unless it is a duplicate.
    ///
    /// A probe seen for the first time records TTL 1 on its route. A later
    /// copy with a higher TTL extends the probe exactly once and is only
    /// forwarded. Anything else already routed is a duplicate, as is any
    /// query the dispatcher has already finished.
    pub(super) fn handle_query_possible_duplicate(
        &self,
        query: &Message,
        handler: &Arc<dyn ReplyHandler>,
    ) -> Result<(), RouterError> {
        let guid = query.guid();
        if self.dispatcher.is_finished(&guid) {
            self.tally_duplicate(query);
            return Ok(());
        }

        let probe = is_probe_query(query);
        match self.query_routes.try_to_route_reply(guid, handler.clone()) {
            Some(counter) => {
                if probe {
                    self.query_routes.set_ttl(&counter, 1)?;
                }
                self.handle_query_request(query, handler, Some(counter), true)
            }
            None if !probe && self.was_probe_query(query)? => {
                debug!("[gn-05] Probe {} extended to ttl {}", guid, query.ttl());
                self.handle_query_request(query, handler, None, false)
            }
            None => {
                self.tally_duplicate(query);
                Ok(())
            }
        }
    }

    fn was_probe_query(&self, query: &Message) -> Result<bool, RouterError> {
        if query.ttl() == 0 {
            return Ok(false);
        }
        let extended = query.ttl().saturating_add(1);
        Ok(self
            .query_routes
            .get_and_set_ttl(&query.guid(), 1, extended)?)
    }

    fn tally_duplicate(&self, query: &Message) {
        RouterMetrics::incr(&self.metrics.duplicates_dropped);
        trace!(
            "[gn-05] Duplicate query {} (ttl {}, hops {})",
            query.guid(),
            query.ttl(),
            query.hops()
        );
    }

    /// Forward and answer a query that passed the duplicate check.
    ///
    /// A new query from one of our leaves becomes a dynamic query. Otherwise
    /// an ultrapeer forwards it to the ultrapeer mesh while TTL remains.
    /// Local evaluation sends it to matching leaves and answers it from our
    /// own content.
    pub(super) fn handle_query_request(
        &self,
        query: &Message,
        handler: &Arc<dyn ReplyHandler>,
        counter: Option<ResultCounter>,
        locally_evaluate: bool,
    ) -> Result<(), RouterError> {
        let mut locally_evaluate = locally_evaluate;

        match counter {
            Some(counter) if handler.is_leaf() => {
                // The dispatcher reaches our other leaves itself.
                locally_evaluate = false;
                let origin = if handler.is_good_leaf() {
                    QueryOrigin::NewLeaf
                } else {
                    QueryOrigin::OldLeaf
                };
                let dynamic = DynamicQuery::new(
                    query.clone(),
                    origin,
                    handler.clone(),
                    counter,
                    self.dispatcher.config(),
                )?;
                match self.dispatcher.add_query(dynamic) {
                    Ok(()) => {}
                    // Its route was evicted while the dynamic query lives on.
                    Err(DynamicQueryError::AlreadyRunning(_))
                    | Err(DynamicQueryError::AlreadyFinished(_)) => {
                        self.tally_duplicate(query);
                        return Ok(());
                    }
                    Err(e) => return Err(e.into()),
                }
                RouterMetrics::incr(&self.metrics.dynamic_queries_started);
                self.respond_to_query(query);
            }
            _ if query.ttl() > 0 && self.registry.is_ultrapeer() => {
                let sent = if handler.is_good_ultrapeer() {
                    self.forward_query_to_ultrapeers(query, handler)
                } else {
                    self.forward_limited_query_to_ultrapeers(query, handler)
                };
                RouterMetrics::add(&self.metrics.queries_forwarded, sent as u64);
            }
            _ => {}
        }

        if locally_evaluate {
            let sent = self.network.forward_to_matching_leaves(query, handler.id());
            RouterMetrics::add(&self.metrics.queries_forwarded, sent as u64);
            self.respond_to_query(query);
        }
        Ok(())
    }

    /// Answer from our own content, routing each reply back like our own.
    pub(super) fn respond_to_query(&self, query: &Message) {
        let ttl = query.hops().saturating_add(1);
        for reply in self.ports.responder.respond(query) {
            let reply = reply.with_guid(query.guid()).with_ttl(ttl).with_hops(0);
            if let Err(e) = self.route_local_reply(&reply) {
                debug!("[gn-05] Local reply for {} not sent: {}", query.guid(), e);
            }
        }
    }

    /// Send to every ultrapeer except the source.
    fn forward_query_to_ultrapeers(&self, query: &Message, handler: &Arc<dyn ReplyHandler>) -> usize {
        self.registry
            .initialized_connections()
            .iter()
            .filter(|peer| self.forward_query_to_ultrapeer(query, handler, peer))
            .count()
    }

    /// Send to a limited number of ultrapeers, preferring ones that are not
    /// high-degree until only the required number remain.
    fn forward_limited_query_to_ultrapeers(
        &self,
        query: &Message,
        handler: &Arc<dyn ReplyHandler>,
    ) -> usize {
        let peers = self.registry.initialized_connections();
        let total = peers.len();
        let mut needed = self.config.limited_forward_connections;
        let mut sent = 0;

        for (i, peer) in peers.iter().enumerate() {
            if needed == 0 {
                break;
            }
            if peer.is_good_ultrapeer() && total - i > needed {
                continue;
            }
            if self.forward_query_to_ultrapeer(query, handler, peer) {
                sent += 1;
            }
            needed -= 1;
        }
        sent
    }

    /// On its last hop a query only reaches a route-table ultrapeer whose
    /// table matches.
    fn forward_query_to_ultrapeer(
        &self,
        query: &Message,
        handler: &Arc<dyn ReplyHandler>,
        peer: &Arc<ManagedConnection>,
    ) -> bool {
        if peer.id() == handler.id() || peer.role() == ConnectionRole::ClientOfUltrapeer {
            return false;
        }
        if query.ttl() == 1 && !peer.should_forward_query(query) {
            return false;
        }
        peer.send(query.clone())
    }

    // -------------------------------------------------------------------------
    // Our own searches
    // -------------------------------------------------------------------------

    /// An ultrapeer runs its own search as a dynamic query; a leaf hands it
    /// to its first few ultrapeers.
    pub(super) fn start_local_query(&self, query: &Message) -> Result<(), RouterError> {
        if query.as_query().is_none() {
            return Err(RouterError::WrongMessageKind { expected: "query" });
        }
        let guid = query.guid();
        let local = self.local_handler();
        let counter = self
            .query_routes
            .route_reply(guid, local.clone())
            .ok_or(RouterError::NoReplyRoute(guid))?;

        if self.registry.is_ultrapeer() {
            let dynamic = DynamicQuery::new(
                query.clone(),
                QueryOrigin::Local,
                local,
                counter,
                self.dispatcher.config(),
            )?;
            self.dispatcher.add_query(dynamic)?;
            RouterMetrics::incr(&self.metrics.dynamic_queries_started);
            debug!("[gn-05] Started our query {}", guid);
            return Ok(());
        }

        let mut sent = 0;
        for peer in self
            .registry
            .initialized_connections()
            .into_iter()
            .take(self.config.leaf_originate_connections)
        {
            if peer.send(query.clone()) {
                sent += 1;
            }
        }
        if sent == 0 {
            warn!("[gn-05] Query {} reached no ultrapeer", guid);
        }
        RouterMetrics::add(&self.metrics.queries_forwarded, sent as u64);
        Ok(())
    }
}
