//! # Reply Handlers
//!
//! A reply handler is anything a routed reply can be delivered to: a TCP
//! connection, a UDP endpoint, or this node itself. Route tables store
//! handlers and later hand replies to them.

use crate::message::Message;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique handler identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    /// Allocate a fresh id.
    pub fn next() -> Self {
        Self(NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// Which transport a handler delivers over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    /// A TCP connection to a peer.
    Connection,
    /// A UDP endpoint.
    Udp,
    /// This node.
    Local,
}

/// Capability trait for reply destinations.
///
/// Delivery methods never fail loudly: a handler that cannot take a message
/// drops it and counts the drop.
pub trait ReplyHandler: Send + Sync + fmt::Debug {
    fn id(&self) -> HandlerId;

    fn kind(&self) -> HandlerKind;

    /// False once the handler can no longer deliver anything.
    fn is_open(&self) -> bool;

    /// Remote address, if the handler has one.
    fn address(&self) -> Option<SocketAddr>;

    /// Preferred locale of the remote host.
    fn locale_pref(&self) -> String {
        "en".to_string()
    }

    /// The remote host is one of our leaves.
    fn is_leaf(&self) -> bool {
        false
    }

    /// The remote host is an ultrapeer.
    fn is_ultrapeer(&self) -> bool {
        false
    }

    /// A leaf we consider well-behaved enough to serve queries for.
    fn is_good_leaf(&self) -> bool {
        false
    }

    /// An ultrapeer we trust to forward queries to many hosts.
    fn is_good_ultrapeer(&self) -> bool {
        false
    }

    fn handle_ping_reply(&self, pong: &Message, source: Option<&dyn ReplyHandler>);

    fn handle_query_reply(&self, reply: &Message, source: Option<&dyn ReplyHandler>);

    fn handle_push_request(&self, push: &Message, source: Option<&dyn ReplyHandler>);

    /// Count a message from this handler that we could not route.
    fn count_dropped_message(&self);
}

/// Whether this node currently acts as an ultrapeer.
pub trait NodeRole: Send + Sync {
    fn is_ultrapeer(&self) -> bool;
}
