//! # Dynamic Query Controller
//!
//! Widens a query one step at a time until it has enough results, instead of
//! flooding the whole network at a fixed TTL.
//!
//! ## State Machine
//!
//! ```text
//!   ┌─────────┐  first extended send  ┌──────────┐
//!   │  Probe  │ ────────────────────► │ Extended │
//!   └────┬────┘                       └────┬─────┘
//!        │ enough results / leaf says done │
//!        ▼                                 ▼
//!   ┌───────────┐                    ┌────────────┐
//!   │ Satisfied │                    │ Terminated │ ◄── stop_query, timeout
//!   └───────────┘                    └────────────┘
//! ```
//!
//! ## Steps (one per dispatcher tick, once the wait has elapsed)
//!
//! 1. Forward a TTL-1 copy to our own leaves when our aggregate route table
//!    says one of them might match.
//! 2. Probe: TTL-1 and TTL-2 copies to a handful of ultrapeers, picked by
//!    their query route tables.
//! 3. Extend: one more ultrapeer per step, with a TTL sized from the result
//!    rate seen so far.
//!
//! Leaves report how many results they have through query-status vendor
//! messages; a report at the satisfaction threshold ends the query.

pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

pub use domain::{
    calculate_ttl, hosts_reached, DynamicQuery, DynamicQueryConfig, ProbePlan, QueryOrigin,
    QueryState,
};
pub use error::DynamicQueryError;
pub use ports::{DynamicQueryApi, QueryNetwork, UltrapeerLink};
pub use service::QueryDispatcher;
