//! Query replies and pushes.

use super::MessageRouter;
use crate::domain::should_drop_reply;
use crate::error::RouterError;
use crate::metrics::RouterMetrics;
use shared_types::{Guid, Message, NodeRole, ReplyHandler};
use std::sync::Arc;
use tracing::trace;

impl MessageRouter {
    /// Send a reply back along its query's route.
    ///
    /// Every reply that finds a route also routes pushes for the responding
    /// client back through `handler`. Replies for busy routes are dropped.
    pub(super) fn handle_query_reply(&self, reply: &Message, handler: &Arc<dyn ReplyHandler>) {
        let Some(body) = reply.as_query_reply() else {
            return;
        };
        let Some(route) = self.query_routes.get_reply_handler_counted(
            &reply.guid(),
            reply.total_length() as u64,
            body.result_count() as u64,
        ) else {
            handler.count_dropped_message();
            RouterMetrics::incr(&self.metrics.route_misses);
            trace!("[gn-05] No route for reply {}", reply.guid());
            return;
        };

        self.push_routes.route_reply(body.client_guid, handler.clone());

        if should_drop_reply(&route, reply.ttl(), &self.config) {
            handler.count_dropped_message();
            RouterMetrics::incr(&self.metrics.replies_dropped);
            trace!(
                "[gn-05] Dropping reply {} after {} results / {} bytes",
                reply.guid(),
                route.results_routed,
                route.bytes_routed
            );
            return;
        }
        route.handler.handle_query_reply(reply, Some(handler.as_ref()));
        RouterMetrics::incr(&self.metrics.replies_routed);
    }

    /// Deliver a push to the host it names, or count a drop on the sender.
    pub(super) fn handle_push_request(&self, push: &Message, handler: &Arc<dyn ReplyHandler>) {
        let Some(body) = push.as_push() else {
            return;
        };
        match self.push_target(&body.client_guid) {
            Some(target) => {
                target.handle_push_request(push, Some(handler.as_ref()));
                RouterMetrics::incr(&self.metrics.pushes_routed);
            }
            None => {
                handler.count_dropped_message();
                RouterMetrics::incr(&self.metrics.route_misses);
                trace!("[gn-05] No route for push to {}", body.client_guid);
            }
        }
    }

    /// Where pushes for `client_guid` go: the push route learned from its
    /// replies, this node, or a leaf we are push proxy for.
    fn push_target(&self, client_guid: &Guid) -> Option<Arc<dyn ReplyHandler>> {
        if let Some(handler) = self.push_routes.get_reply_handler(client_guid) {
            return Some(handler);
        }
        if *client_guid == self.config.local.client_guid {
            return Some(self.local_handler());
        }
        if self.registry.is_ultrapeer() {
            return self
                .registry
                .push_proxy_leaf(client_guid)
                .map(|leaf| leaf as Arc<dyn ReplyHandler>);
        }
        None
    }

    /// Route a reply we generated.
    pub(super) fn route_local_reply(&self, reply: &Message) -> Result<(), RouterError> {
        let body = reply
            .as_query_reply()
            .ok_or(RouterError::WrongMessageKind {
                expected: "query reply",
            })?;
        let guid = reply.guid();
        let route = self
            .query_routes
            .get_reply_handler_counted(
                &guid,
                reply.total_length() as u64,
                body.result_count() as u64,
            )
            .ok_or(RouterError::NoReplyRoute(guid))?;
        route.handler.handle_query_reply(reply, None);
        Ok(())
    }

    /// Route a push we generated.
    pub(super) fn route_local_push(&self, push: &Message) -> Result<(), RouterError> {
        let body = push
            .as_push()
            .ok_or(RouterError::WrongMessageKind { expected: "push" })?;
        let target = self
            .push_target(&body.client_guid)
            .ok_or(RouterError::NoPushRoute(body.client_guid))?;
        let local = self.local_handler();
        target.handle_push_request(push, Some(local.as_ref()));
        Ok(())
    }
}
