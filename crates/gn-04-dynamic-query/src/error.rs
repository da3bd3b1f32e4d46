//! Error types for the dynamic query controller

use shared_types::Guid;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DynamicQueryError {
    #[error("Message {0} is not a query")]
    NotAQuery(Guid),

    #[error("Query {0} is already running")]
    AlreadyRunning(Guid),

    #[error("Query {0} already finished")]
    AlreadyFinished(Guid),
}
