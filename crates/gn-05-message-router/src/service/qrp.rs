//! Query route table exchange.

use super::MessageRouter;
use crate::domain::{ConnectionRole, ManagedConnection};
use crate::metrics::RouterMetrics;
use gn_02_query_routing::QueryRouteTable;
use gn_04_dynamic_query::UltrapeerLink;
use shared_types::{Guid, Message, NodeRole, Payload, RouteTableMessage};
use std::sync::Arc;
use tracing::{debug, trace, warn};

impl MessageRouter {
    /// Apply a reset or patch from a leaf or a route-table ultrapeer.
    ///
    /// A table that fails to apply is dropped until the next reset. Once a
    /// leaf's table is complete our last-hop table is rebuilt.
    pub(super) fn handle_route_table_update(
        &self,
        update: &RouteTableMessage,
        connection: &Arc<ManagedConnection>,
    ) {
        let eligible = match connection.role() {
            ConnectionRole::Leaf => true,
            ConnectionRole::Ultrapeer => connection.is_query_routing(),
            ConnectionRole::ClientOfUltrapeer => false,
        };
        if !eligible {
            trace!(
                "[gn-05] Ignoring route table update from {}",
                connection.socket_addr()
            );
            return;
        }

        let complete = match connection.apply_route_table(update) {
            Ok(()) => matches!(
                update,
                RouteTableMessage::Patch { seq_no, seq_size, .. } if seq_no == seq_size
            ),
            Err(e) => {
                RouterMetrics::incr(&self.metrics.malformed_messages);
                warn!(
                    "[gn-05] Bad route table update from {}: {}",
                    connection.socket_addr(),
                    e
                );
                true
            }
        };
        if complete && connection.role() == ConnectionRole::Leaf {
            self.rebuild_last_hop_table();
        }
    }

    /// Merge our content with our leaves' tables, when we are an ultrapeer.
    pub(super) fn rebuild_last_hop_table(&self) -> Option<QueryRouteTable> {
        if !self.registry.is_ultrapeer() {
            return None;
        }
        Some(
            self.network
                .rebuild_aggregate(&self.ports.responder.route_table()),
        )
    }

    /// Send route table updates to every connection that is due one.
    ///
    /// An ultrapeer sends its last-hop table to route-table ultrapeers; a
    /// leaf sends its own table to its ultrapeers. Each update is the
    /// difference from what that connection last received. When a send
    /// fails the next update starts from a reset.
    pub(super) fn propagate_route_tables(&self, now_ms: u64) -> usize {
        let ultrapeer = self.registry.is_ultrapeer();
        let due: Vec<Arc<ManagedConnection>> = self
            .registry
            .initialized_connections()
            .into_iter()
            .filter(|c| {
                if ultrapeer {
                    c.role() == ConnectionRole::Ultrapeer && c.is_query_routing()
                } else {
                    c.role() == ConnectionRole::ClientOfUltrapeer
                }
            })
            .filter(|c| c.qrp_update_due(now_ms))
            .collect();
        if due.is_empty() {
            return 0;
        }

        let table = match self.rebuild_last_hop_table() {
            Some(table) => table,
            None => self.ports.responder.route_table(),
        };

        let mut queued = 0;
        for connection in due {
            connection.advance_qrp_forward_time(now_ms);
            let previous = connection.sent_table();
            let updates = match table.encode(previous.as_ref()) {
                Ok(updates) => updates,
                Err(e) => {
                    warn!(
                        "[gn-05] Cannot encode route table for {}: {}",
                        connection.socket_addr(),
                        e
                    );
                    connection.forget_sent_table();
                    continue;
                }
            };
            if updates.is_empty() {
                continue;
            }

            let count = updates.len();
            let all_sent = updates.into_iter().all(|update| {
                connection.send(Message::originate(
                    Guid::new_random(),
                    1,
                    Payload::RouteTable(update),
                ))
            });
            if all_sent {
                connection.record_sent_table(table.clone());
                queued += count;
                debug!(
                    "[gn-05] Sent {} route table messages to {}",
                    count,
                    connection.socket_addr()
                );
            } else {
                connection.forget_sent_table();
                warn!(
                    "[gn-05] Route table update to {} incomplete",
                    connection.socket_addr()
                );
            }
        }
        RouterMetrics::add(&self.metrics.qrp_messages_sent, queued as u64);
        queued
    }
}
