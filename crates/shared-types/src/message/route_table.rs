//! Query route table update payloads.

use crate::errors::{ensure_len, WireError};

const VARIANT_RESET: u8 = 0x0;
const VARIANT_PATCH: u8 = 0x1;

/// Patch data is sent raw.
pub const COMPRESSOR_NONE: u8 = 0x0;
/// Patch data is zlib-deflated.
pub const COMPRESSOR_DEFLATE: u8 = 0x1;

/// Reset or patch a peer's copy of our query route table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTableMessage {
    /// Start over with an empty table of `table_size` slots.
    Reset { table_size: u32, infinity: u8 },
    /// One chunk of a sequence of patches. `seq_no` runs from 1 to `seq_size`.
    Patch {
        seq_no: u8,
        seq_size: u8,
        compressor: u8,
        entry_bits: u8,
        data: Vec<u8>,
    },
}

impl RouteTableMessage {
    pub(crate) fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            RouteTableMessage::Reset {
                table_size,
                infinity,
            } => {
                out.push(VARIANT_RESET);
                out.extend_from_slice(&table_size.to_le_bytes());
                out.push(*infinity);
            }
            RouteTableMessage::Patch {
                seq_no,
                seq_size,
                compressor,
                entry_bits,
                data,
            } => {
                out.push(VARIANT_PATCH);
                out.extend_from_slice(&[*seq_no, *seq_size, *compressor, *entry_bits]);
                out.extend_from_slice(data);
            }
        }
    }

    pub(crate) fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        ensure_len(bytes, 1)?;
        match bytes[0] {
            VARIANT_RESET => {
                ensure_len(bytes, 6)?;
                Ok(RouteTableMessage::Reset {
                    table_size: u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]),
                    infinity: bytes[5],
                })
            }
            VARIANT_PATCH => {
                ensure_len(bytes, 5)?;
                Ok(RouteTableMessage::Patch {
                    seq_no: bytes[1],
                    seq_size: bytes[2],
                    compressor: bytes[3],
                    entry_bits: bytes[4],
                    data: bytes[5..].to_vec(),
                })
            }
            other => Err(WireError::UnknownRouteTableVariant(other)),
        }
    }
}
