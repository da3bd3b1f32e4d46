//! Outbound (Driven) ports.
//!
//! The controller never touches connections directly. It sees ultrapeers
//! through [`UltrapeerLink`] and the rest of the node through
//! [`QueryNetwork`].

use shared_types::{HandlerId, Message, ReplyHandler};
use std::sync::Arc;

/// One connected ultrapeer, as the controller needs to see it.
pub trait UltrapeerLink: Send + Sync {
    fn id(&self) -> HandlerId;

    /// Connected long enough to be trusted with an extended query.
    fn is_stable(&self, now_ms: u64) -> bool;

    /// The remote sent us its query route table.
    fn is_query_routing(&self) -> bool;

    /// The remote's route table lets `query` through. Always true for links
    /// without a table.
    fn should_forward_query(&self, query: &Message) -> bool;

    /// Ultrapeer connections the remote keeps.
    fn degree(&self) -> u32;

    /// Largest TTL the remote accepts.
    fn max_ttl(&self) -> u8;

    fn supports_probe_queries(&self) -> bool;

    fn locale(&self) -> String;

    /// Queue `query` on the link. False when it could not be queued.
    fn send_query(&self, query: Message) -> bool;
}

/// The node around the controller.
pub trait QueryNetwork: Send + Sync {
    /// Currently connected ultrapeers.
    fn ultrapeers(&self) -> Vec<Arc<dyn UltrapeerLink>>;

    /// Our aggregate route table (own content plus leaves) admits `query`.
    fn leaves_might_match(&self, query: &Message) -> bool;

    /// Forward `query` to the leaves whose tables match.
    fn forward_to_leaves(&self, query: &Message, handler: &Arc<dyn ReplyHandler>);
}
