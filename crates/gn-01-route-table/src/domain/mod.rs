//! # Domain Layer for Reply Routing
//!
//! - **config**: window length and capacity (`RouteTableConfig`)
//! - **entry**: per-route state and counters (`RouteEntry`, `ResultCounter`, `ReplyRoutePair`)

mod config;
mod entry;

pub use config::*;
pub use entry::{ReplyRoutePair, ResultCounter};
pub(crate) use entry::RouteEntry;
