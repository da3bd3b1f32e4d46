//! # Error Types
//!
//! Defines error types used when parsing identifiers and wire messages.

use thiserror::Error;

/// Errors raised while decoding or encoding wire messages.
///
/// Every variant means "bad packet": the caller counts the message as
/// malformed and drops it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// Fewer bytes than the structure requires.
    #[error("Truncated message: needed {needed} bytes, had {available}")]
    Truncated { needed: usize, available: usize },

    /// Header announces a payload larger than we accept.
    #[error("Payload too large: {length} bytes exceeds limit of {limit}")]
    PayloadTooLarge { length: usize, limit: usize },

    /// Unknown function code in the header.
    #[error("Unknown function code: 0x{0:02X}")]
    UnknownFunction(u8),

    /// Route table message with an unknown variant byte.
    #[error("Unknown route table variant: {0}")]
    UnknownRouteTableVariant(u8),

    /// Malformed GGEP extension block.
    #[error("Bad GGEP block: {0}")]
    BadGgep(String),

    /// A field holds a value outside its legal range.
    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// Trailing bytes after a complete payload.
    #[error("Unexpected {0} trailing bytes")]
    TrailingBytes(usize),
}

/// Errors raised while parsing a GUID.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuidError {
    /// Hex string was not 32 characters long.
    #[error("GUID hex must be 32 characters, got {0}")]
    BadLength(usize),

    /// Hex string contained a non-hex character.
    #[error("GUID hex is not valid hexadecimal")]
    BadHex,
}

/// Convenience: check that `bytes` has at least `needed` bytes.
pub(crate) fn ensure_len(bytes: &[u8], needed: usize) -> Result<(), WireError> {
    if bytes.len() < needed {
        return Err(WireError::Truncated {
            needed,
            available: bytes.len(),
        });
    }
    Ok(())
}
