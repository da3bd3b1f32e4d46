//! # Message Router
//!
//! The ultrapeer routing core. Every message read from a connection or a
//! datagram passes through [`MessageRouter`], which answers it, forwards it
//! or sends it back along the route its request took.
//!
//! ## Message Flow
//!
//! ```text
//!   TCP reader ─┐                       ┌─► ping / query routes (gn-01)
//!   UDP loop  ──┼─► MessageRouter ──────┼─► pong cache (gn-03)
//!   multicast ──┘        │              ├─► dynamic queries (gn-04)
//!                        │              └─► leaves by route table (gn-02)
//!                        ▼
//!                listeners by GUID
//!
//!   reply ─► route table lookup ─► drop policy ─► handler that asked
//! ```
//!
//! ## Roles
//!
//! As an ultrapeer the router floods pings and queries across the mesh,
//! runs dynamic queries for its leaves and keeps a last-hop route table
//! built from its leaves' tables. As a leaf it answers, hands its own
//! searches to its ultrapeers and sends them its route table.
//!
//! [`RouterScheduler`] drives the timers: route table generation swaps,
//! connect-back expiry, UDP handler cleanup, route table propagation and
//! dynamic query steps.

pub mod domain;
pub mod error;
pub mod metrics;
pub mod network;
pub mod ports;
pub mod scheduler;
pub mod service;

pub use domain::*;
pub use error::RouterError;
pub use metrics::{RouterMetrics, RouterMetricsSnapshot};
pub use network::RouterNetwork;
pub use ports::*;
pub use scheduler::{MetricsHook, RouterScheduler, SchedulerIntervals};
pub use service::{MessageRouter, RouteTableSet, RouterPorts};
