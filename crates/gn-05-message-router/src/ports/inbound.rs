//! # Inbound Port - MessageRouterApi
//!
//! Driving port used by the transports (TCP connection readers, the UDP
//! socket loop) and by our own search front end.

use crate::domain::{ManagedConnection, MessageListener};
use crate::error::RouterError;
use gn_04_dynamic_query::QueryState;
use shared_types::{Guid, HandlerId, Message};
use std::net::SocketAddr;
use std::sync::Arc;

/// Primary API of the message router.
pub trait MessageRouterApi: Send + Sync {
    /// Route a message read from a TCP connection.
    fn handle_message(
        &self,
        message: &Message,
        connection: &Arc<ManagedConnection>,
    ) -> Result<(), RouterError>;

    /// Route a unicast datagram from `addr`.
    fn handle_udp_message(&self, message: &Message, addr: SocketAddr) -> Result<(), RouterError>;

    /// Route a multicast datagram from `addr`.
    fn handle_multicast_message(
        &self,
        message: &Message,
        addr: SocketAddr,
    ) -> Result<(), RouterError>;

    /// Route replies for `guid` to this node.
    fn originate_query_guid(&self, guid: Guid);

    /// Start one of our own searches.
    ///
    /// An ultrapeer runs it as a dynamic query; a leaf hands it to its
    /// ultrapeers.
    fn send_dynamic_query(&self, query: &Message) -> Result<(), RouterError>;

    /// Send our own query on one connection.
    fn send_query_request(&self, query: &Message, connection: &Arc<ManagedConnection>) -> bool;

    /// Send our own ping on one connection.
    fn send_ping_request(&self, ping: &Message, connection: &Arc<ManagedConnection>) -> bool;

    /// Send our own ping to the network. Returns the copies queued.
    fn broadcast_ping_request(&self, ping: &Message) -> usize;

    /// Send a reply along the route its query took.
    fn send_query_reply(&self, reply: &Message) -> Result<(), RouterError>;

    /// Send a push towards the firewalled host it names.
    fn send_push_request(&self, push: &Message) -> Result<(), RouterError>;

    fn query_status(&self, guid: &Guid) -> Option<QueryState>;

    fn stop_query(&self, guid: &Guid) -> bool;

    fn register_listener(&self, guid: Guid, listener: Arc<dyn MessageListener>);

    fn unregister_listener(&self, guid: &Guid, listener: &Arc<dyn MessageListener>) -> bool;

    /// Forget a closed connection everywhere.
    fn remove_connection(&self, id: HandlerId) -> Option<Arc<ManagedConnection>>;

    /// Send route table updates that are due. Returns the messages queued.
    fn forward_query_route_tables(&self, now_ms: u64) -> usize;
}
