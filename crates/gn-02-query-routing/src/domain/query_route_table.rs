//! Query route table.
//!
//! INVARIANTS:
//! - A query passes only if every keyword and every URN hashes to a set slot.
//! - Applying `encode(prev)` to a copy of `prev` reproduces this table.

use bitvec::prelude::*;
use shared_types::{QueryRequest, RouteTableMessage, COMPRESSOR_NONE};

use super::hash_functions::{hash, keywords, with_prefixes};
use super::nibbles::{halve, unhalve};
use crate::error::QrpError;
use tracing::{debug, trace};

/// Default "infinity" hop value.
pub const DEFAULT_INFINITY: u8 = 7;

/// Default number of slots.
pub const DEFAULT_TABLE_SIZE: usize = 1 << 16;

/// Largest patch payload per message.
pub const MAX_PATCH_SIZE: usize = 1 << 12;

const MAX_TABLE_BITS: u32 = 24;

/// Bit-vector summary of answerable keywords.
#[derive(Clone, Debug)]
pub struct QueryRouteTable {
    bits: BitVec<u8, Lsb0>,
    log2: u8,
    infinity: u8,
    /// Last sequence number applied in the current patch sequence.
    seq_no: Option<u8>,
    seq_size: Option<u8>,
    /// Next slot the current patch sequence writes.
    next_patch: usize,
}

impl Default for QueryRouteTable {
    fn default() -> Self {
        Self::empty(DEFAULT_TABLE_SIZE.trailing_zeros() as u8, DEFAULT_INFINITY)
    }
}

impl PartialEq for QueryRouteTable {
    fn eq(&self, other: &Self) -> bool {
        self.bits == other.bits
    }
}

impl Eq for QueryRouteTable {}

impl QueryRouteTable {
    /// An empty table with the default size and infinity.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty table of `size` slots.
    pub fn with_size(size: u64, infinity: u8) -> Result<Self, QrpError> {
        let log2 = validate_size(size)?;
        if !(2..=127).contains(&infinity) {
            return Err(QrpError::InvalidInfinity(infinity));
        }
        Ok(Self::empty(log2, infinity))
    }

    fn empty(log2: u8, infinity: u8) -> Self {
        Self {
            bits: bitvec![u8, Lsb0; 0; 1usize << log2],
            log2,
            infinity,
            seq_no: None,
            seq_size: None,
            next_patch: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.bits.len()
    }

    pub fn infinity(&self) -> u8 {
        self.infinity
    }

    fn keyword_present(&self) -> i8 {
        1 - self.infinity as i8
    }

    fn keyword_absent(&self) -> i8 {
        self.infinity as i8 - 1
    }

    /// Number of set slots.
    pub fn bits_set(&self) -> usize {
        self.bits.count_ones()
    }

    /// Percentage of set slots, 0.0 to 100.0.
    pub fn percent_full(&self) -> f64 {
        self.bits_set() as f64 * 100.0 / self.size() as f64
    }

    /// Add every keyword of a file path, plus shortened prefixes of long words.
    pub fn add(&mut self, path: &str) {
        for word in with_prefixes(&keywords(path)) {
            let slot = hash(&word, self.log2);
            self.bits.set(slot, true);
        }
    }

    /// Add `token` as one unit, without splitting it.
    pub fn add_indivisible(&mut self, token: &str) {
        let slot = hash(token, self.log2);
        self.bits.set(slot, true);
    }

    /// OR `other` into this table, rescaling it if sizes differ.
    pub fn add_all(&mut self, other: &QueryRouteTable) {
        if other.size() != self.size() {
            trace!("[gn-02] Rescaling {} slots to {}", other.size(), self.size());
        }
        let resized = other.resized(self.size());
        for slot in resized.iter_ones() {
            self.bits.set(slot, true);
        }
    }

    /// Keywords and URNs of `query` all hash to set slots.
    pub fn contains(&self, query: &QueryRequest) -> bool {
        self.contains_terms(query.text(), query.urns())
    }

    /// Like [`contains`](Self::contains) for raw text and URNs.
    pub fn contains_terms(&self, text: &str, urns: &[String]) -> bool {
        let words = keywords(text);
        if words.is_empty() && urns.is_empty() {
            return false;
        }
        words
            .iter()
            .all(|w| self.bits[hash(w, self.log2)])
            && urns.iter().all(|u| self.bits[hash(u, self.log2)])
    }

    /// This table's bits scaled to `new_size` slots.
    ///
    /// Each run of set slots maps to the proportional run in the target.
    fn resized(&self, new_size: usize) -> BitVec<u8, Lsb0> {
        let old_size = self.size();
        if old_size == new_size {
            return self.bits.clone();
        }
        let mut out = bitvec![u8, Lsb0; 0; new_size];
        let mut i = 0;
        while let Some(offset) = self.bits[i..].first_one() {
            let start = i + offset;
            let end = self.bits[start..]
                .first_zero()
                .map_or(old_size, |z| start + z);
            let first_set = start * new_size / old_size;
            let last_not_set = ((end * new_size).saturating_sub(1) / old_size + 1).min(new_size);
            out[first_set..last_not_set].fill(true);
            if end >= old_size {
                break;
            }
            i = end;
        }
        out
    }

    /// Reinitialise to an empty table of the given shape.
    pub fn reset(&mut self, table_size: u32, infinity: u8) -> Result<(), QrpError> {
        *self = Self::with_size(u64::from(table_size), infinity)?;
        Ok(())
    }

    /// Apply a reset or patch message.
    pub fn apply(&mut self, message: &RouteTableMessage) -> Result<(), QrpError> {
        let applied = match message {
            RouteTableMessage::Reset {
                table_size,
                infinity,
            } => {
                trace!("[gn-02] Reset to {} slots, infinity {}", table_size, infinity);
                self.reset(*table_size, *infinity)
            }
            RouteTableMessage::Patch { .. } => self.patch(message),
        };
        if let Err(e) = &applied {
            debug!("[gn-02] Route table update rejected: {}", e);
        }
        applied
    }

    /// Apply one patch message of a sequence. Reset messages are ignored.
    pub fn patch(&mut self, message: &RouteTableMessage) -> Result<(), QrpError> {
        let RouteTableMessage::Patch {
            seq_no,
            seq_size,
            compressor,
            entry_bits,
            data,
        } = message
        else {
            return Ok(());
        };
        let (seq_no, seq_size) = (*seq_no, *seq_size);

        if let Some(expected) = self.seq_size {
            if expected != seq_size {
                return Err(QrpError::InconsistentSequenceSize {
                    got: seq_size,
                    expected,
                });
            }
        }
        let expected_no = self.seq_no.map_or(1, |n| n.wrapping_add(1));
        if seq_no != expected_no {
            return Err(QrpError::InconsistentSequenceNumber {
                got: seq_no,
                expected: expected_no,
            });
        }
        if *compressor != COMPRESSOR_NONE {
            return Err(QrpError::UnsupportedCompressor(*compressor));
        }
        let deltas: Vec<i8> = match entry_bits {
            4 => unhalve(data),
            8 => data.iter().map(|&b| b as i8).collect(),
            other => return Err(QrpError::UnsupportedEntryBits(*other)),
        };

        let size = self.size();
        for delta in deltas {
            if self.next_patch >= size {
                return Err(QrpError::PatchOverflow {
                    index: self.next_patch,
                    size,
                });
            }
            if delta < 0 {
                self.bits.set(self.next_patch, true);
            } else if delta > 0 {
                self.bits.set(self.next_patch, false);
            }
            self.next_patch += 1;
        }

        if seq_no == seq_size {
            trace!("[gn-02] Patch sequence complete, {:.1}% full", self.percent_full());
            self.seq_no = None;
            self.seq_size = None;
            self.next_patch = 0;
        } else {
            self.seq_no = Some(seq_no);
            self.seq_size = Some(seq_size);
        }
        Ok(())
    }

    /// Messages that bring a holder of `previous` up to this table.
    ///
    /// With no previous table the sequence starts with a reset. An unchanged
    /// table produces no patches.
    pub fn encode(
        &self,
        previous: Option<&QueryRouteTable>,
    ) -> Result<Vec<RouteTableMessage>, QrpError> {
        let mut out = Vec::new();
        let mut deltas = vec![0i8; self.size()];
        let mut needs_patch = false;

        match previous {
            None => {
                out.push(RouteTableMessage::Reset {
                    table_size: self.size() as u32,
                    infinity: self.infinity,
                });
                for slot in self.bits.iter_ones() {
                    deltas[slot] = self.keyword_present();
                    needs_patch = true;
                }
            }
            Some(prev) => {
                if prev.size() != self.size() {
                    return Err(QrpError::SizeMismatch {
                        ours: self.size(),
                        previous: prev.size(),
                    });
                }
                let changed = self.bits.iter().by_vals().zip(prev.bits.iter().by_vals());
                for (slot, (now, before)) in changed.enumerate() {
                    if now != before {
                        deltas[slot] = if now {
                            self.keyword_present()
                        } else {
                            self.keyword_absent()
                        };
                        needs_patch = true;
                    }
                }
            }
        }
        if !needs_patch {
            return Ok(out);
        }

        let (entry_bits, data) = if self.keyword_present() >= -8 && self.keyword_absent() <= 7 {
            (4u8, halve(&deltas))
        } else {
            (8u8, deltas.iter().map(|&d| d as u8).collect())
        };

        let chunks = data.len().div_ceil(MAX_PATCH_SIZE);
        if chunks > u8::MAX as usize {
            return Err(QrpError::TooManyPatches(chunks));
        }
        for (i, chunk) in data.chunks(MAX_PATCH_SIZE).enumerate() {
            out.push(RouteTableMessage::Patch {
                seq_no: (i + 1) as u8,
                seq_size: chunks as u8,
                compressor: COMPRESSOR_NONE,
                entry_bits,
                data: chunk.to_vec(),
            });
        }
        Ok(out)
    }
}

fn validate_size(size: u64) -> Result<u8, QrpError> {
    if size < 2 || !size.is_power_of_two() || size.trailing_zeros() > MAX_TABLE_BITS {
        return Err(QrpError::InvalidTableSize(size));
    }
    Ok(size.trailing_zeros() as u8)
}
