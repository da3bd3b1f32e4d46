//! # Pong Cache
//!
//! Keeps a handful of recently seen ultrapeer pongs so pings can be answered
//! without being broadcast.
//!
//! ```text
//!   "en"  hop 0 │ pong │   "de"  hop 0 │      │
//!         hop 1 │ pong │         hop 1 │ pong │
//!         hop 2 │      │         hop 2 │ pong │
//!          ...                    ...
//!         hop 5 │ pong │         hop 5 │      │
//! ```
//!
//! Each locale has one bucket per hop count. [`PongCacher::get_best_pongs`]
//! returns the freshest pong of each bucket, farthest first, and tops up rare
//! locales from the default one. Expired pongs are dropped while reading.

pub mod domain;
pub mod service;

pub use domain::{CachedPong, PongCacheConfig};
pub use service::PongCacher;
