//! # Message Model
//!
//! A [`Message`] is an immutable header plus a typed [`Payload`].
//!
//! ## Function Codes
//!
//! | Code | Payload |
//! |------|---------|
//! | 0x00 | [`PingRequest`] |
//! | 0x01 | [`PingReply`] |
//! | 0x30 | [`RouteTableMessage`] |
//! | 0x31 | [`VendorMessage`] |
//! | 0x40 | [`PushRequest`] |
//! | 0x80 | [`QueryRequest`] |
//! | 0x81 | [`QueryReply`] |

mod ping;
mod push;
mod query;
mod route_table;
mod vendor;

pub use ping::{PingReply, PingRequest};
pub use push::PushRequest;
pub use query::{QueryReply, QueryRequest};
pub use route_table::{RouteTableMessage, COMPRESSOR_DEFLATE, COMPRESSOR_NONE};
pub use vendor::{SupportedMessage, VendorId, VendorMessage};

use crate::codec::HEADER_LEN;
use crate::errors::WireError;
use crate::guid::Guid;

/// Function code of a ping.
pub const F_PING: u8 = 0x00;
/// Function code of a pong.
pub const F_PING_REPLY: u8 = 0x01;
/// Function code of a query route table update.
pub const F_ROUTE_TABLE_UPDATE: u8 = 0x30;
/// Function code of a vendor message.
pub const F_VENDOR_MESSAGE: u8 = 0x31;
/// Function code of a vendor message in the standard (non-LimeWire) format.
pub const F_VENDOR_MESSAGE_STABLE: u8 = 0x32;
/// Function code of a push request.
pub const F_PUSH: u8 = 0x40;
/// Function code of a query.
pub const F_QUERY: u8 = 0x80;
/// Function code of a query reply.
pub const F_QUERY_REPLY: u8 = 0x81;

/// Coarse message category, used for statistics and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Ping,
    Pong,
    Query,
    QueryReply,
    Push,
    Vendor,
    RouteTable,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Ping => "ping",
            MessageKind::Pong => "pong",
            MessageKind::Query => "query",
            MessageKind::QueryReply => "query_reply",
            MessageKind::Push => "push",
            MessageKind::Vendor => "vendor",
            MessageKind::RouteTable => "route_table",
        }
    }
}

/// Typed body of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Ping(PingRequest),
    Pong(PingReply),
    Query(QueryRequest),
    QueryReply(QueryReply),
    Push(PushRequest),
    Vendor(VendorMessage),
    RouteTable(RouteTableMessage),
}

impl Payload {
    /// Function code written in the header.
    pub fn function_code(&self) -> u8 {
        match self {
            Payload::Ping(_) => F_PING,
            Payload::Pong(_) => F_PING_REPLY,
            Payload::Query(_) => F_QUERY,
            Payload::QueryReply(_) => F_QUERY_REPLY,
            Payload::Push(_) => F_PUSH,
            Payload::Vendor(_) => F_VENDOR_MESSAGE,
            Payload::RouteTable(_) => F_ROUTE_TABLE_UPDATE,
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Payload::Ping(_) => MessageKind::Ping,
            Payload::Pong(_) => MessageKind::Pong,
            Payload::Query(_) => MessageKind::Query,
            Payload::QueryReply(_) => MessageKind::QueryReply,
            Payload::Push(_) => MessageKind::Push,
            Payload::Vendor(_) => MessageKind::Vendor,
            Payload::RouteTable(_) => MessageKind::RouteTable,
        }
    }

    /// Serialize the body.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        let mut out = Vec::new();
        match self {
            Payload::Ping(p) => p.encode_into(&mut out)?,
            Payload::Pong(p) => p.encode_into(&mut out)?,
            Payload::Query(q) => q.encode_into(&mut out)?,
            Payload::QueryReply(r) => r.encode_into(&mut out),
            Payload::Push(p) => p.encode_into(&mut out)?,
            Payload::Vendor(v) => v.encode_into(&mut out),
            Payload::RouteTable(r) => r.encode_into(&mut out),
        }
        Ok(out)
    }

    /// Parse a body for the given function code.
    pub fn from_bytes(function: u8, bytes: &[u8]) -> Result<Self, WireError> {
        Ok(match function {
            F_PING => Payload::Ping(PingRequest::decode(bytes)?),
            F_PING_REPLY => Payload::Pong(PingReply::decode(bytes)?),
            F_QUERY => Payload::Query(QueryRequest::decode(bytes)?),
            F_QUERY_REPLY => Payload::QueryReply(QueryReply::decode(bytes)?),
            F_PUSH => Payload::Push(PushRequest::decode(bytes)?),
            F_VENDOR_MESSAGE | F_VENDOR_MESSAGE_STABLE => {
                Payload::Vendor(VendorMessage::decode(bytes)?)
            }
            F_ROUTE_TABLE_UPDATE => Payload::RouteTable(RouteTableMessage::decode(bytes)?),
            other => return Err(WireError::UnknownFunction(other)),
        })
    }
}

/// An immutable network message.
///
/// Hopping or re-addressing returns a new value; the original is never
/// changed, so a message can be shared between listeners and send queues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    guid: Guid,
    ttl: u8,
    hops: u8,
    payload: Payload,
}

impl Message {
    pub fn new(guid: Guid, ttl: u8, hops: u8, payload: Payload) -> Self {
        Self {
            guid,
            ttl,
            hops,
            payload,
        }
    }

    /// A freshly originated message (hops 0).
    pub fn originate(guid: Guid, ttl: u8, payload: Payload) -> Self {
        Self::new(guid, ttl, 0, payload)
    }

    pub fn guid(&self) -> Guid {
        self.guid
    }

    pub fn ttl(&self) -> u8 {
        self.ttl
    }

    pub fn hops(&self) -> u8 {
        self.hops
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }

    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }

    pub fn function_code(&self) -> u8 {
        self.payload.function_code()
    }

    /// Copy with TTL decremented and hops incremented.
    pub fn hopped(&self) -> Self {
        Self {
            guid: self.guid,
            ttl: self.ttl.saturating_sub(1),
            hops: self.hops.saturating_add(1),
            payload: self.payload.clone(),
        }
    }

    pub fn with_ttl(&self, ttl: u8) -> Self {
        Self {
            ttl,
            ..self.clone()
        }
    }

    pub fn with_guid(&self, guid: Guid) -> Self {
        Self {
            guid,
            ..self.clone()
        }
    }

    pub fn with_hops(&self, hops: u8) -> Self {
        Self {
            hops,
            ..self.clone()
        }
    }

    /// Header plus payload size on the wire.
    pub fn total_length(&self) -> usize {
        HEADER_LEN + self.payload.to_bytes().map(|b| b.len()).unwrap_or(0)
    }

    /// A ping that has travelled exactly one hop and may go no further.
    pub fn is_heartbeat(&self) -> bool {
        matches!(self.payload, Payload::Ping(_)) && self.hops == 1 && self.ttl == 0
    }

    /// A ping asking for a query key.
    pub fn is_query_key_request(&self) -> bool {
        match &self.payload {
            Payload::Ping(ping) => self.hops == 1 && self.ttl == 0 && ping.requests_query_key(),
            _ => false,
        }
    }

    pub fn as_ping(&self) -> Option<&PingRequest> {
        match &self.payload {
            Payload::Ping(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_pong(&self) -> Option<&PingReply> {
        match &self.payload {
            Payload::Pong(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_query(&self) -> Option<&QueryRequest> {
        match &self.payload {
            Payload::Query(q) => Some(q),
            _ => None,
        }
    }

    pub fn as_query_reply(&self) -> Option<&QueryReply> {
        match &self.payload {
            Payload::QueryReply(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_push(&self) -> Option<&PushRequest> {
        match &self.payload {
            Payload::Push(p) => Some(p),
            _ => None,
        }
    }
}
