//! The reply handler standing for this node.

use crate::ports::LocalSearchSink;
use shared_types::{HandlerId, HandlerKind, Message, ReplyHandler};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

/// Routes registered to this handler end at our own search and upload
/// logic.
pub struct LocalReplyHandler {
    id: HandlerId,
    sink: Arc<dyn LocalSearchSink>,
}

impl LocalReplyHandler {
    pub fn new(sink: Arc<dyn LocalSearchSink>) -> Self {
        Self {
            id: HandlerId::next(),
            sink,
        }
    }
}

impl ReplyHandler for LocalReplyHandler {
    fn id(&self) -> HandlerId {
        self.id
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Local
    }

    fn is_open(&self) -> bool {
        true
    }

    fn address(&self) -> Option<SocketAddr> {
        None
    }

    fn handle_ping_reply(&self, pong: &Message, _source: Option<&dyn ReplyHandler>) {
        self.sink.on_pong(pong);
    }

    fn handle_query_reply(&self, reply: &Message, _source: Option<&dyn ReplyHandler>) {
        self.sink.on_query_reply(reply);
    }

    fn handle_push_request(&self, push: &Message, _source: Option<&dyn ReplyHandler>) {
        self.sink.on_push(push);
    }

    fn count_dropped_message(&self) {}
}

impl fmt::Debug for LocalReplyHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalReplyHandler")
            .field("id", &self.id)
            .finish()
    }
}
