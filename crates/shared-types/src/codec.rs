//! # Wire Codec
//!
//! Converts between [`Message`] values and their 23-byte-header wire form.

use crate::errors::{ensure_len, WireError};
use crate::guid::{Guid, GUID_LEN};
use crate::message::{Message, Payload};

/// Size of the fixed message header.
pub const HEADER_LEN: usize = 23;

/// Largest payload we accept.
pub const MAX_PAYLOAD_LEN: usize = 64 * 1024;

/// Serialize a message.
pub fn encode(msg: &Message) -> Result<Vec<u8>, WireError> {
    let payload = msg.payload().to_bytes()?;
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(WireError::PayloadTooLarge {
            length: payload.len(),
            limit: MAX_PAYLOAD_LEN,
        });
    }
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(msg.guid().as_bytes());
    out.push(msg.function_code());
    out.push(msg.ttl());
    out.push(msg.hops());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Parse a complete datagram holding exactly one message.
pub fn decode(bytes: &[u8]) -> Result<Message, WireError> {
    match decode_frame(bytes)? {
        Some((msg, used)) if used == bytes.len() => Ok(msg),
        Some((_, used)) => Err(WireError::TrailingBytes(bytes.len() - used)),
        None => {
            let needed = declared_len(bytes).map_or(HEADER_LEN, |len| HEADER_LEN + len);
            Err(WireError::Truncated {
                needed,
                available: bytes.len(),
            })
        }
    }
}

/// Parse the first message of a stream buffer.
///
/// Returns `Ok(None)` when the buffer does not yet hold a complete message,
/// otherwise the message and the number of bytes it occupied.
pub fn decode_frame(bytes: &[u8]) -> Result<Option<(Message, usize)>, WireError> {
    let Some(len) = declared_len(bytes) else {
        return Ok(None);
    };
    if len > MAX_PAYLOAD_LEN {
        return Err(WireError::PayloadTooLarge {
            length: len,
            limit: MAX_PAYLOAD_LEN,
        });
    }
    if bytes.len() < HEADER_LEN + len {
        return Ok(None);
    }
    let mut guid = [0u8; GUID_LEN];
    guid.copy_from_slice(&bytes[..GUID_LEN]);
    let function = bytes[16];
    let ttl = bytes[17];
    let hops = bytes[18];
    let payload = Payload::from_bytes(function, &bytes[HEADER_LEN..HEADER_LEN + len])?;
    Ok(Some((
        Message::new(Guid::from_bytes(guid), ttl, hops, payload),
        HEADER_LEN + len,
    )))
}

fn declared_len(bytes: &[u8]) -> Option<usize> {
    ensure_len(bytes, HEADER_LEN).ok()?;
    Some(u32::from_le_bytes([bytes[19], bytes[20], bytes[21], bytes[22]]) as usize)
}
