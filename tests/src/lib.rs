//! # Gnutella Routing Core Test Suite
//!
//! Unified test crate containing:
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── src/
//! │   ├── overlay.rs        # In-process network of routing nodes
//! │   └── integration/      # Multi-node scenarios
//! │       ├── scenarios.rs  # Route expiry, leaf guidance, pong cache, listeners
//! │       └── flows.rs      # Searches, QRP exchange, UDP query keys
//! └── benches/
//!     └── routing_benchmarks.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p gn-tests
//!
//! # By category
//! cargo test -p gn-tests integration::scenarios::
//! cargo test -p gn-tests integration::flows::
//!
//! # Benchmarks
//! cargo bench -p gn-tests
//! ```

#![allow(unused_variables)]
#![allow(unused_imports)]
#![allow(dead_code)]

pub mod integration;
pub mod overlay;
