//! Vendor messages: capabilities, leaf guidance, push proxying, flow control
//! and connect-back redirects.

use super::MessageRouter;
use crate::domain::{ConnectionRole, ManagedConnection};
use crate::metrics::RouterMetrics;
use rand::seq::SliceRandom;
use shared_types::{
    Guid, Message, Payload, PingRequest, ReplyHandler, VendorMessage,
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, trace};

fn vendor_message(guid: Guid, body: VendorMessage) -> Message {
    Message::originate(guid, 1, Payload::Vendor(body))
}

impl MessageRouter {
    pub(super) fn handle_vendor_message(
        &self,
        msg: &Message,
        vendor: &VendorMessage,
        connection: &Arc<ManagedConnection>,
    ) {
        match vendor {
            VendorMessage::MessagesSupported(supported) => {
                connection.update_supported(supported);
                trace!(
                    "[gn-05] {} supports {} vendor messages",
                    connection.socket_addr(),
                    supported.len()
                );
            }
            VendorMessage::PushProxyRequest => self.handle_push_proxy_request(msg, connection),
            VendorMessage::QueryStatusRequest => self.handle_query_status_request(msg, connection),
            VendorMessage::QueryStatusResponse { results } => {
                if connection.role() == ConnectionRole::Leaf {
                    self.dispatcher
                        .update_leaf_results(&msg.guid(), u32::from(*results));
                }
            }
            VendorMessage::HopsFlow { hops } => self.handle_hops_flow(*hops, connection),
            VendorMessage::TcpConnectBack { port } => {
                let redirect = VendorMessage::TcpConnectBackRedirect {
                    ip: connection_ipv4(connection),
                    port: *port,
                };
                self.redirect_connect_back(Guid::new_random(), redirect, false, connection);
            }
            VendorMessage::UdpConnectBack { port } => {
                let redirect = VendorMessage::UdpConnectBackRedirect {
                    ip: connection_ipv4(connection),
                    port: *port,
                };
                self.redirect_connect_back(msg.guid(), redirect, true, connection);
            }
            VendorMessage::TcpConnectBackRedirect { ip, port } => {
                self.handle_tcp_redirect(*ip, *port, connection)
            }
            VendorMessage::UdpConnectBackRedirect { ip, port } => {
                self.handle_udp_redirect(msg.guid(), *ip, *port, connection)
            }
            VendorMessage::PushProxyAck { .. } | VendorMessage::Unknown { .. } => {
                trace!("[gn-05] Ignoring vendor message {:?}", vendor.id());
            }
        }
    }

    /// Become push proxy for a leaf: acknowledge with our address and route
    /// pushes for its client GUID (the request's GUID) to it.
    fn handle_push_proxy_request(&self, msg: &Message, connection: &Arc<ManagedConnection>) {
        if connection.role() != ConnectionRole::Leaf {
            return;
        }
        let local = &self.config.local;
        if local.ip.is_unspecified() || local.port == 0 {
            return;
        }
        let ack = VendorMessage::PushProxyAck {
            ip: local.ip,
            port: local.port,
        };
        connection.send(vendor_message(msg.guid(), ack));
        let handler: Arc<dyn ReplyHandler> = connection.clone();
        self.push_routes.route_reply(msg.guid(), handler);
        connection.set_push_proxy_for(msg.guid());
        debug!("[gn-05] Push proxy for {} at {}", msg.guid(), connection.socket_addr());
    }

    /// Our ultrapeer asks how a search of ours is going.
    fn handle_query_status_request(&self, msg: &Message, connection: &Arc<ManagedConnection>) {
        if connection.role() != ConnectionRole::ClientOfUltrapeer {
            return;
        }
        let Some(count) = self.ports.search_sink.result_count(&msg.guid()) else {
            return;
        };
        let results = u16::try_from(count).unwrap_or(u16::MAX);
        connection.send(vendor_message(
            msg.guid(),
            VendorMessage::QueryStatusResponse { results },
        ));
    }

    /// A leaf at hops-flow 0 is busy and leaves our last-hop table.
    fn handle_hops_flow(&self, hops: u8, connection: &Arc<ManagedConnection>) {
        let was_busy = connection.is_busy_leaf();
        connection.set_hops_flow(hops);
        if connection.is_busy_leaf() != was_busy {
            debug!(
                "[gn-05] Leaf {} is {}",
                connection.socket_addr(),
                if was_busy { "free again" } else { "busy" }
            );
            self.rebuild_last_hop_table();
        }
    }

    /// Ask up to a few shuffled peers that understand redirects to connect
    /// back to the requester for us.
    fn redirect_connect_back(
        &self,
        guid: Guid,
        redirect: VendorMessage,
        udp: bool,
        source: &Arc<ManagedConnection>,
    ) {
        let mut peers = self.registry.initialized_connections();
        peers.shuffle(&mut rand::thread_rng());

        let mut sent = 0;
        for peer in peers {
            if sent >= self.config.connect_back_redirects {
                break;
            }
            if peer.id() == source.id() || !peer.capabilities().supports_redirect(udp) {
                continue;
            }
            if peer.send(vendor_message(guid, redirect.clone())) {
                sent += 1;
            }
        }
        RouterMetrics::add(&self.metrics.connect_backs_redirected, sent as u64);
        trace!("[gn-05] Connect-back for {} redirected to {} peers", source.socket_addr(), sent);
    }

    /// Redirects are only honoured from other ultrapeers, for hosts we are
    /// not connected to, once per address until the records are cleared.
    fn should_service_redirect(
        &self,
        ip: Ipv4Addr,
        udp: bool,
        connection: &Arc<ManagedConnection>,
    ) -> bool {
        if connection.role() != ConnectionRole::Ultrapeer {
            return false;
        }
        if self.registry.is_connected_to(IpAddr::V4(ip)) {
            return false;
        }
        if udp {
            self.connect_backs.should_service_udp(ip)
        } else {
            self.connect_backs.should_service_tcp(ip)
        }
    }

    fn handle_tcp_redirect(&self, ip: Ipv4Addr, port: u16, connection: &Arc<ManagedConnection>) {
        if !self.should_service_redirect(ip, false, connection) {
            return;
        }
        self.ports.dialer.connect_back(ip, port);
        RouterMetrics::incr(&self.metrics.redirects_serviced);
        debug!("[gn-05] TCP connect-back to {}:{}", ip, port);
    }

    fn handle_udp_redirect(
        &self,
        guid: Guid,
        ip: Ipv4Addr,
        port: u16,
        connection: &Arc<ManagedConnection>,
    ) {
        if !self.should_service_redirect(ip, true, connection) {
            return;
        }
        let ping = Message::originate(guid, 1, Payload::Ping(PingRequest::new()));
        self.ports
            .datagrams
            .send(&ping, SocketAddr::new(IpAddr::V4(ip), port));
        RouterMetrics::incr(&self.metrics.redirects_serviced);
        debug!("[gn-05] UDP connect-back to {}:{}", ip, port);
    }
}

fn connection_ipv4(connection: &ManagedConnection) -> Ipv4Addr {
    match connection.socket_addr().ip() {
        IpAddr::V4(ip) => ip,
        IpAddr::V6(ip) => ip.to_ipv4_mapped().unwrap_or(Ipv4Addr::UNSPECIFIED),
    }
}
