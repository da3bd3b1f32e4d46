//! # Shared Types Crate
//!
//! This crate contains the identifiers, wire messages and capability traits
//! shared by every routing subsystem.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: All cross-subsystem types are defined here.
//! - **Immutable Messages**: A [`Message`] is never mutated in place. Hopping
//!   or re-addressing a message produces a new value.
//! - **Capabilities, not hierarchies**: Anything that can receive a routed
//!   reply implements [`ReplyHandler`].
//!
//! ## Wire Format
//!
//! ```text
//! ┌──────────────────┬──────┬─────┬──────┬──────────────┬─────────────┐
//! │ GUID (16 bytes)  │ func │ TTL │ hops │ len (u32 LE) │ payload ... │
//! └──────────────────┴──────┴─────┴──────┴──────────────┴─────────────┘
//! ```

pub mod codec;
pub mod errors;
pub mod ggep;
pub mod guid;
pub mod handler;
pub mod message;
pub mod time;

pub use codec::{decode, decode_frame, encode, HEADER_LEN, MAX_PAYLOAD_LEN};
pub use errors::*;
pub use ggep::GgepBlock;
pub use guid::Guid;
pub use handler::{HandlerId, HandlerKind, NodeRole, ReplyHandler};
pub use message::*;
pub use time::{SystemTimeSource, TimeSource};

#[cfg(any(test, feature = "test-utils"))]
pub use time::ManualTimeSource;
