//! # Node Runtime Library
//!
//! This library exposes the internal modules of the node runtime for testing.
//! The main entry point is the `main.rs` binary.
//!
//! ## Modular Structure
//!
//! - `container/` - Configuration and wiring of the router with its adapters
//! - `adapters/` - Implementations of the router's outbound ports
//! - `runtime` - Socket loops, scheduler and graceful shutdown

pub mod adapters;
pub mod container;
pub mod runtime;

pub use container::{ConfigError, NodeConfig, NodeContainer};
pub use runtime::NodeRuntime;
