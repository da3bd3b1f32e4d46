//! # Integration Tests
//!
//! Several complete nodes linked through [`Overlay`](crate::overlay::Overlay),
//! exercising the router, the dynamic query controller, QRP and the pong
//! cache together with the production adapters of `node-runtime`.
//!
//! | Module | Covers |
//! |--------|--------|
//! | `scenarios` | Route expiry and capacity, leaf guidance, pong caching, listeners |
//! | `flows` | Probe searches, push routing, leaf QRP, UDP query keys |

pub mod flows;
pub mod scenarios;
