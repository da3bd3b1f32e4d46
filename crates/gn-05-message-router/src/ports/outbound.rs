//! Outbound (Driven) ports.
//!
//! Everything outside routing proper: our shared content, the host cache,
//! the search front end, the UDP socket and outgoing TCP dials. Adapters
//! live in node-runtime.

use gn_02_query_routing::QueryRouteTable;
use shared_types::{Guid, Message};
use std::net::{Ipv4Addr, SocketAddr};

/// Answers queries from our own shared content.
pub trait LocalResponder: Send + Sync {
    /// Query replies for `query`. The router readdresses them with the
    /// query's GUID and a TTL that reaches its origin.
    fn respond(&self, query: &Message) -> Vec<Message>;

    /// Route table describing our shared content.
    fn route_table(&self) -> QueryRouteTable;

    /// Shared file count and total kilobytes, advertised in our pongs.
    fn shared_stats(&self) -> (u32, u32) {
        (0, 0)
    }
}

/// Host addresses learned from pongs.
pub trait HostCatcher: Send + Sync {
    /// Remember the pong's address. True if the address was new.
    fn add(&self, pong: &Message) -> bool;
}

/// Where replies for this node end up.
pub trait LocalSearchSink: Send + Sync {
    fn on_query_reply(&self, reply: &Message);

    fn on_pong(&self, _pong: &Message) {}

    /// A push naming our client GUID: someone wants us to upload.
    fn on_push(&self, push: &Message);

    /// Results gathered so far for one of our queries, reported to our
    /// ultrapeer when it asks.
    fn result_count(&self, _guid: &Guid) -> Option<u32> {
        None
    }
}

/// Sends single datagrams.
pub trait DatagramSender: Send + Sync {
    /// False when the datagram could not be handed to the socket.
    fn send(&self, message: &Message, to: SocketAddr) -> bool;
}

/// Opens TCP connect-backs on behalf of a redirecting ultrapeer.
pub trait ConnectBackDialer: Send + Sync {
    fn connect_back(&self, ip: Ipv4Addr, port: u16);
}

/// Issues and checks the keys UDP queriers must present.
pub trait QueryKeyValidator: Send + Sync {
    fn key_for(&self, addr: SocketAddr) -> Vec<u8>;

    fn is_valid(&self, key: &[u8], addr: SocketAddr) -> bool;
}
