//! Router errors.

use gn_01_route_table::RouteError;
use gn_02_query_routing::QrpError;
use gn_04_dynamic_query::DynamicQueryError;
use shared_types::{Guid, WireError};
use thiserror::Error;

/// Errors surfaced by the message router.
///
/// Network trouble (unroutable replies, full queues, bad packets) is counted
/// and dropped rather than returned. What comes back here is either a
/// request from our own node that cannot be honoured or a broken contract
/// between routing components.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    #[error("No route for push to client {0}")]
    NoPushRoute(Guid),

    #[error("No route for query reply {0}")]
    NoReplyRoute(Guid),

    #[error("Expected a {expected} message")]
    WrongMessageKind { expected: &'static str },

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Qrp(#[from] QrpError),

    #[error(transparent)]
    DynamicQuery(#[from] DynamicQueryError),

    #[error(transparent)]
    Wire(#[from] WireError),
}
