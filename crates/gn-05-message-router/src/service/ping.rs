//! Pings and pongs.

use super::MessageRouter;
use crate::domain::{ConnectionRole, ManagedConnection, UdpReplyHandler};
use crate::metrics::RouterMetrics;
use gn_04_dynamic_query::UltrapeerLink;
use rand::Rng;
use shared_types::{Guid, HandlerId, Message, NodeRole, Payload, PingReply, ReplyHandler};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, trace};

fn clamp_slots(slots: usize) -> u8 {
    u8::try_from(slots).unwrap_or(u8::MAX)
}

impl MessageRouter {
    /// A ping read from a TCP connection, already hopped.
    pub(super) fn handle_ping_request(&self, ping: &Message, connection: &Arc<ManagedConnection>) {
        let handler: Arc<dyn ReplyHandler> = connection.clone();
        if self
            .ping_routes
            .try_to_route_reply(ping.guid(), handler)
            .is_none()
        {
            RouterMetrics::incr(&self.metrics.duplicates_dropped);
            trace!("[gn-05] Duplicate ping {}", ping.guid());
            return;
        }

        if ping.is_heartbeat() || connection.allow_new_pings() {
            self.respond_to_ping_request(ping, connection);
        }

        if ping.ttl() > 0
            && self.registry.is_ultrapeer()
            && connection.role() == ConnectionRole::Ultrapeer
        {
            self.broadcast_ping(ping, Some(connection.id()));
        }
    }

    /// Answer with our own pong and the cached pongs for the ping's locale.
    fn respond_to_ping_request(&self, ping: &Message, connection: &Arc<ManagedConnection>) {
        let hops = ping.hops() as u16;
        let ttl = ping.ttl() as u16;
        let short_range = hops + ttl <= 2;

        if !short_range && !self.registry.allow_any_connection() {
            return;
        }
        if !self.has_valid_address() {
            return;
        }

        if ping.is_heartbeat() {
            connection.send(self.our_pong(ping.guid(), 1));
            return;
        }

        let pong_ttl = if short_range { 1 } else { ping.hops().saturating_add(1) };
        if self.registry.allow_any_connection() {
            connection.send(self.our_pong(ping.guid(), pong_ttl));
        }

        let locale = ping
            .as_ping()
            .and_then(|p| p.locale())
            .unwrap_or_else(|| connection.locale_pref());
        let pinger = connection.socket_addr().ip();
        let mut sent = 0;
        for cached in self.pong_cacher.get_best_pongs(&locale) {
            let about_pinger = cached
                .as_pong()
                .is_some_and(|p| std::net::IpAddr::V4(p.ip) == pinger);
            if about_pinger {
                continue;
            }
            if connection.send(cached.with_guid(ping.guid())) {
                sent += 1;
            }
        }
        trace!(
            "[gn-05] Answered ping {} with {} cached pongs",
            ping.guid(),
            sent
        );
    }

    fn has_valid_address(&self) -> bool {
        let local = &self.config.local;
        !local.ip.is_unspecified() && !local.ip.is_broadcast() && local.port != 0
    }

    /// A pong describing this node.
    pub(super) fn our_pong(&self, guid: Guid, ttl: u8) -> Message {
        Message::originate(guid, ttl, Payload::Pong(self.our_pong_body()))
    }

    fn our_pong_body(&self) -> PingReply {
        let local = &self.config.local;
        let (files, kilobytes) = self.ports.responder.shared_stats();
        let pong = PingReply::new(local.ip, local.port, files, kilobytes).with_locale(&local.locale);
        if self.registry.is_ultrapeer() {
            pong.with_ultrapeer(
                clamp_slots(self.registry.free_leaf_slots()),
                clamp_slots(self.registry.free_ultrapeer_slots()),
            )
        } else {
            pong
        }
    }

    /// Send `ping` to our stable non-leaf connections.
    ///
    /// `source` is the connection the ping came from, or `None` for our own
    /// pings. Pings from others never go up to our ultrapeers when we are a
    /// leaf. With many peers, each one is skipped at random.
    pub(super) fn broadcast_ping(&self, ping: &Message, source: Option<HandlerId>) -> usize {
        let targets = self.registry.initialized_connections();
        let thin = targets.len() > self.config.ping_fanout_threshold;
        let now = self.clock.now_ms();
        let mut rng = rand::thread_rng();
        let mut sent = 0;

        for peer in targets {
            if !peer.is_stable(now) {
                continue;
            }
            if let Some(source) = source {
                if peer.id() == source || peer.role() == ConnectionRole::ClientOfUltrapeer {
                    continue;
                }
            }
            let skip = if peer.capabilities().pong_caching {
                self.config.ping_skip_pong_caching
            } else {
                self.config.ping_skip_other
            };
            if thin && rng.gen::<f64>() < skip {
                continue;
            }
            if peer.send(ping.clone()) {
                sent += 1;
            }
        }
        RouterMetrics::add(&self.metrics.pings_forwarded, sent as u64);
        sent
    }

    /// A pong nobody is listening for.
    ///
    /// Its address goes to the host catcher and, when new, the pong cache.
    /// The pong then travels back along the ping route. New ultrapeer or
    /// unicast pongs are also handed to our leaves.
    pub(super) fn handle_ping_reply(&self, pong: &Message, handler: &Arc<dyn ReplyHandler>) {
        let Some(reply) = pong.as_pong() else {
            return;
        };

        let new_address = self.ports.host_catcher.add(pong);
        if new_address && !reply.is_udp_host_cache() && self.pong_cacher.add_pong(pong) {
            RouterMetrics::incr(&self.metrics.pongs_cached);
        }

        let routed = self.ping_routes.get_reply_handler(&pong.guid());
        match &routed {
            Some(target) => target.handle_ping_reply(pong, Some(handler.as_ref())),
            None => {
                handler.count_dropped_message();
                RouterMetrics::incr(&self.metrics.route_misses);
            }
        }

        if new_address && (reply.is_ultrapeer() || reply.supports_unicast()) {
            let routed_id = routed.as_ref().map(|r| r.id());
            for leaf in self.registry.client_connections() {
                if leaf.id() == handler.id() || Some(leaf.id()) == routed_id {
                    continue;
                }
                if leaf.allow_new_pongs() {
                    leaf.handle_ping_reply(pong, Some(handler.as_ref()));
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // UDP
    // -------------------------------------------------------------------------

    pub(super) fn handle_udp_ping(
        &self,
        ping: &Message,
        addr: SocketAddr,
        handler: Arc<UdpReplyHandler>,
    ) {
        let routed: Arc<dyn ReplyHandler> = handler.clone();
        if self
            .ping_routes
            .try_to_route_reply(ping.guid(), routed)
            .is_none()
        {
            RouterMetrics::incr(&self.metrics.duplicates_dropped);
            return;
        }
        if ping.is_query_key_request() {
            self.send_query_key_pong(ping, addr);
        } else if self.has_valid_address() {
            handler.handle_ping_reply(&self.our_pong(ping.guid(), 1), None);
        }
    }

    /// Hand out a query key, at most once per key delay across all askers.
    pub(super) fn send_query_key_pong(&self, ping: &Message, addr: SocketAddr) -> bool {
        let now = self.clock.now_ms();
        {
            let mut last = self.last_query_key_ms.lock();
            if let Some(previous) = *last {
                if now.saturating_sub(previous) < self.config.query_key_delay_ms {
                    debug!("[gn-05] Query key request from {} throttled", addr);
                    return false;
                }
            }
            *last = Some(now);
        }
        let key = self.ports.query_keys.key_for(addr);
        let pong = Message::originate(
            ping.guid(),
            1,
            Payload::Pong(self.our_pong_body().with_query_key(key)),
        );
        self.ports.datagrams.send(&pong, addr)
    }

    /// A unicast pong that no listener claimed.
    ///
    /// Query-key pongs belong to whoever asked for the key and stop here.
    /// Pongs describing a host other than the sender are ignored.
    pub(super) fn handle_udp_pong(
        &self,
        pong: &Message,
        addr: SocketAddr,
        handler: Arc<UdpReplyHandler>,
    ) {
        let Some(reply) = pong.as_pong() else {
            return;
        };
        if reply.query_key().is_some() {
            return;
        }
        if reply.socket_addr() != addr {
            trace!(
                "[gn-05] Ignoring pong for {} sent from {}",
                reply.socket_addr(),
                addr
            );
            return;
        }
        let handler: Arc<dyn ReplyHandler> = handler;
        self.handle_ping_reply(pong, &handler);
    }
}
