//! Unicast and multicast datagrams.

use super::MessageRouter;
use crate::domain::UdpReplyHandler;
use crate::error::RouterError;
use crate::metrics::RouterMetrics;
use shared_types::{Message, Payload, ReplyHandler};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, trace};

impl MessageRouter {
    /// Decode one datagram and route it. Undecodable datagrams are counted
    /// and dropped.
    pub fn handle_udp_packet(&self, bytes: &[u8], addr: SocketAddr) -> Result<(), RouterError> {
        match shared_types::decode(bytes) {
            Ok(message) => self.route_udp(&message, addr),
            Err(e) => {
                RouterMetrics::incr(&self.metrics.malformed_messages);
                debug!("[gn-05] Malformed datagram from {}: {}", addr, e);
                Ok(())
            }
        }
    }

    pub(super) fn route_udp(&self, message: &Message, addr: SocketAddr) -> Result<(), RouterError> {
        RouterMetrics::incr(&self.metrics.messages_received);
        let msg = message.hopped();
        let handler = self.udp_handlers.get(addr, self.clock.now_ms());
        let routed: Arc<dyn ReplyHandler> = handler.clone();

        match msg.payload() {
            Payload::Ping(_) => self.handle_udp_ping(&msg, addr, handler.clone()),
            Payload::Pong(_) => {
                if self.listeners.notify(&msg, handler.as_ref()) == 0 {
                    self.handle_udp_pong(&msg, addr, handler);
                }
                return Ok(());
            }
            Payload::Query(_) => self.handle_udp_query(&msg, addr, &handler)?,
            Payload::QueryReply(_) => self.handle_query_reply(&msg, &routed),
            Payload::Push(_) => self.handle_push_request(&msg, &routed),
            Payload::Vendor(_) | Payload::RouteTable(_) => {
                trace!("[gn-05] Ignoring {} datagram from {}", msg.kind().as_str(), addr);
            }
        }
        self.listeners.notify(&msg, routed.as_ref());
        Ok(())
    }

    /// A unicast query must carry a query key issued to its sender. New
    /// queries are acknowledged with a pong and evaluated locally.
    fn handle_udp_query(
        &self,
        query: &Message,
        addr: SocketAddr,
        handler: &Arc<UdpReplyHandler>,
    ) -> Result<(), RouterError> {
        let keyed = query
            .as_query()
            .and_then(|q| q.query_key())
            .is_some_and(|key| self.ports.query_keys.is_valid(key, addr));
        if !keyed {
            RouterMetrics::incr(&self.metrics.udp_queries_rejected);
            debug!("[gn-05] UDP query {} from {} without valid key", query.guid(), addr);
            return Ok(());
        }
        if !self.handle_udp_query_possible_duplicate(query, handler)? {
            return Ok(());
        }
        handler.handle_ping_reply(&self.our_pong(query.guid(), 1), None);
        Ok(())
    }

    /// Route and answer a datagram query unless already seen. Returns false
    /// for a duplicate.
    fn handle_udp_query_possible_duplicate(
        &self,
        query: &Message,
        handler: &Arc<UdpReplyHandler>,
    ) -> Result<bool, RouterError> {
        let routed: Arc<dyn ReplyHandler> = handler.clone();
        match self.query_routes.try_to_route_reply(query.guid(), routed.clone()) {
            Some(counter) => {
                self.handle_query_request(query, &routed, Some(counter), true)?;
                Ok(true)
            }
            None => {
                RouterMetrics::incr(&self.metrics.duplicates_dropped);
                Ok(false)
            }
        }
    }

    /// Multicast traffic is local-network only: anything sent with a TTL
    /// above 1 is ignored.
    pub(super) fn route_multicast(
        &self,
        message: &Message,
        addr: SocketAddr,
    ) -> Result<(), RouterError> {
        if message.ttl() > 1 {
            return Ok(());
        }
        RouterMetrics::incr(&self.metrics.messages_received);
        let msg = message.hopped();
        let handler = self.udp_handlers.get(addr, self.clock.now_ms());
        let routed: Arc<dyn ReplyHandler> = handler.clone();

        match msg.payload() {
            Payload::Ping(_) => self.handle_udp_ping(&msg, addr, handler.clone()),
            Payload::Query(_) => {
                self.handle_udp_query_possible_duplicate(&msg, &handler)?;
            }
            Payload::QueryReply(_) => self.handle_query_reply(&msg, &routed),
            Payload::Push(_) => self.handle_push_request(&msg, &routed),
            _ => trace!("[gn-05] Ignoring multicast {} from {}", msg.kind().as_str(), addr),
        }
        self.listeners.notify(&msg, routed.as_ref());
        Ok(())
    }
}
