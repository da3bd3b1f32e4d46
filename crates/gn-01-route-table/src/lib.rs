//! # Route Table
//!
//! Remembers, per message GUID, which [`ReplyHandler`](shared_types::ReplyHandler)
//! should receive replies, so pongs, query hits and pushes travel back along
//! the path the request took.
//!
//! ## Generations
//!
//! ```text
//!            route_reply(g)
//!                 │
//!                 ▼
//!   ┌──────────────────────┐  window elapsed   ┌──────────────────────┐
//!   │   new generation     │ ─────────────────►│   old generation     │──► dropped
//!   └──────────────────────┘  or new is full   └──────────────────────┘
//! ```
//!
//! An entry therefore lives between one and two windows. Independently, a
//! hard capacity bound evicts the oldest entry (by insertion sequence)
//! whenever both generations together exceed `max_size`.
//!
//! ## Concurrency
//!
//! Each table has its own lock. Per-route counters are shared atomics, so a
//! [`ResultCounter`] can be read without taking the table lock.

pub mod domain;
pub mod error;
pub mod service;

pub use domain::{ReplyRoutePair, ResultCounter, RouteTableConfig};
pub use error::RouteError;
pub use service::RouteTable;
