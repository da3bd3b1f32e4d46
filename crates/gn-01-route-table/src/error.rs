//! Route table errors.
//!
//! These signal a misuse by the calling routing logic, never a network
//! condition.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// A route TTL must be at least 1.
    #[error("Invalid route TTL {0}: must be at least 1")]
    InvalidTtl(u8),

    /// Compare-and-set TTL called with an unusable pair.
    #[error("Invalid TTL transition {expected} -> {new}: expected >= 1 and new > expected")]
    InvalidTtlTransition { expected: u8, new: u8 },
}
