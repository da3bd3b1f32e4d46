//! # Inbound Port - DynamicQueryApi
//!
//! Driving port used by the message router.

use crate::domain::{DynamicQuery, DynamicQueryConfig, QueryState};
use crate::error::DynamicQueryError;
use shared_types::{Guid, HandlerId};

/// Primary API of the dynamic query controller.
pub trait DynamicQueryApi: Send + Sync {
    /// Thresholds new queries are built with.
    fn config(&self) -> &DynamicQueryConfig;

    /// Start a query and send its first step right away.
    fn add_query(&self, query: DynamicQuery) -> Result<(), DynamicQueryError>;

    /// Advance every active query by one step.
    fn process_queries(&self);

    /// Record a leaf's result count for a query.
    ///
    /// A count at or above the satisfaction threshold ends the query.
    fn update_leaf_results(&self, guid: &Guid, results: u32);

    /// Results the leaf has reported, `None` for unknown queries.
    fn leaf_results(&self, guid: &Guid) -> Option<u32>;

    /// Terminate a query. Returns false when it was not running.
    fn stop_query(&self, guid: &Guid) -> bool;

    /// Drop every query run on behalf of `handler`.
    fn remove_reply_handler(&self, handler: HandlerId);

    /// The query ended recently; duplicates of it must not be forwarded.
    fn is_finished(&self, guid: &Guid) -> bool;

    fn query_state(&self, guid: &Guid) -> Option<QueryState>;

    fn active_queries(&self) -> usize;
}
