//! # Domain Layer for Message Routing
//!
//! - **config**: thresholds and identity (`RouterConfig`, `LocalNode`)
//! - **capabilities**: negotiated features and connection roles
//! - **connection**: a live peer connection (`ManagedConnection`)
//! - **registry**: every live connection (`ConnectionRegistry`)
//! - **udp_handler** / **local_handler**: the other reply handler variants
//! - **listeners**: per-GUID message listeners
//! - **connect_back**: redirect bookkeeping
//! - **drop_policy**: when a query reply is not worth forwarding

mod capabilities;
mod config;
mod connect_back;
mod connection;
mod drop_policy;
mod listeners;
mod local_handler;
mod registry;
mod udp_handler;

pub use capabilities::*;
pub use config::*;
pub use connect_back::ConnectBackRecords;
pub use connection::{ConnectionStats, ManagedConnection};
pub use drop_policy::should_drop_reply;
pub use listeners::{ListenerRegistry, MessageListener};
pub use local_handler::LocalReplyHandler;
pub use registry::ConnectionRegistry;
pub use udp_handler::{UdpHandlerCache, UdpReplyHandler};
