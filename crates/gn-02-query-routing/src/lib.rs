//! # Query Routing Protocol
//!
//! A [`QueryRouteTable`] summarises which keywords a host (or the subtree of
//! leaves behind an ultrapeer) could possibly answer. Queries whose keywords
//! do not all hash to set slots are not forwarded to that host.
//!
//! ## Wire exchange
//!
//! ```text
//!   sender                                       receiver
//!   ──────                                       ────────
//!   encode(None)      ── Reset(size, inf) ──►    reset()
//!                     ── Patch 1/n ─────────►    patch()
//!                     ── ...                     ...
//!                     ── Patch n/n ─────────►    patch()  (sequence complete)
//!   encode(Some(prev)) ── Patch 1/m ────────►    patch()  (only changed slots)
//! ```
//!
//! Patch entries are signed deltas: negative marks a slot present,
//! positive marks it absent, zero leaves it alone. When every delta fits in
//! a nibble the patch is sent with 4-bit entries.

pub mod domain;
pub mod error;

pub use domain::{
    hash, keywords, QueryRouteTable, DEFAULT_INFINITY, DEFAULT_TABLE_SIZE, MAX_PATCH_SIZE,
};
pub use error::QrpError;
