//! Error types for query routing tables

use thiserror::Error;

/// Errors raised while applying or producing route table updates.
///
/// A patch error means the remote sent a bad packet; its table should be
/// discarded until the next reset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QrpError {
    #[error("Invalid table size {0}: must be a power of two between 2 and 2^24")]
    InvalidTableSize(u64),

    #[error("Invalid infinity {0}: must be between 2 and 127")]
    InvalidInfinity(u8),

    #[error("Inconsistent sequence size: got {got}, expected {expected}")]
    InconsistentSequenceSize { got: u8, expected: u8 },

    #[error("Inconsistent sequence number: got {got}, expected {expected}")]
    InconsistentSequenceNumber { got: u8, expected: u8 },

    #[error("Unsupported patch compressor: {0}")]
    UnsupportedCompressor(u8),

    #[error("Unsupported entry bits: {0}")]
    UnsupportedEntryBits(u8),

    #[error("Patch overflows table: slot {index} of {size}")]
    PatchOverflow { index: usize, size: usize },

    #[error("Cannot diff tables of different sizes: {ours} vs {previous}")]
    SizeMismatch { ours: usize, previous: usize },

    #[error("Table needs {0} patch messages, more than a sequence can hold")]
    TooManyPatches(usize),
}
