//! # GGEP Extension Blocks
//!
//! Generic extension blocks carried inside pings, pongs, queries and pushes.
//!
//! ```text
//! 0xC3 │ flags │ id (1-15 bytes) │ length (1-3 bytes) │ data │ flags │ ...
//!
//! flags:  0x80 last extension
//!         0x40 COBS encoded      (rejected)
//!         0x20 deflate compressed (rejected)
//!         0x0F id length
//!
//! length: big-endian 6-bit groups; 0x80 = more follow, 0x40 = final group
//! ```

use crate::errors::{ensure_len, WireError};

/// First byte of every GGEP block.
pub const GGEP_MAGIC: u8 = 0xC3;

/// Largest value a 3-byte length can express.
pub const MAX_VALUE_LEN: usize = (1 << 18) - 1;

const MAX_ID_LEN: usize = 15;
const FLAG_LAST: u8 = 0x80;
const FLAG_ENCODED: u8 = 0x40;
const FLAG_COMPRESSED: u8 = 0x20;
const FLAG_RESERVED: u8 = 0x10;
const ID_LEN_MASK: u8 = 0x0F;
const LEN_MORE: u8 = 0x80;
const LEN_LAST: u8 = 0x40;
const LEN_BITS: u8 = 0x3F;

/// Well-known extension identifiers.
pub mod keys {
    /// Ultrapeer support: version, free leaf slots, free ultrapeer slots.
    pub const ULTRAPEER: &str = "UP";
    /// Client locale (language code).
    pub const LOCALE: &str = "LOC";
    /// Query key, or a request for one in a ping.
    pub const QUERY_KEY: &str = "QK";
    /// Unicast (GUESS) support version.
    pub const UNICAST: &str = "GUE";
    /// The sender is a UDP host cache.
    pub const UDP_HOST_CACHE: &str = "UDPHC";
    /// The pinger accepts cached pongs.
    pub const SUPPORTS_CACHED_PONGS: &str = "SCP";
    /// Daily average uptime in seconds.
    pub const DAILY_UPTIME: &str = "DU";
}

/// An ordered set of GGEP extensions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GgepBlock {
    entries: Vec<(String, Vec<u8>)>,
}

impl GgepBlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`, replacing any previous value.
    pub fn put(&mut self, key: &str, value: Vec<u8>) {
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key.to_string(), value));
        }
    }

    /// Set `key` with no value.
    pub fn put_flag(&mut self, key: &str) {
        self.put(key, Vec::new());
    }

    /// Builder form of [`put`](Self::put).
    pub fn with(mut self, key: &str, value: Vec<u8>) -> Self {
        self.put(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Value of `key` as UTF-8 text.
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key)
            .and_then(|v| std::str::from_utf8(v).ok())
            .map(str::to_string)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Append the encoded block to `out`. An empty block writes nothing.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), WireError> {
        if self.entries.is_empty() {
            return Ok(());
        }
        out.push(GGEP_MAGIC);
        let last = self.entries.len() - 1;
        for (i, (key, value)) in self.entries.iter().enumerate() {
            let id = key.as_bytes();
            if id.is_empty() || id.len() > MAX_ID_LEN || id.contains(&0) {
                return Err(WireError::BadGgep(format!("invalid id {key:?}")));
            }
            if value.len() > MAX_VALUE_LEN {
                return Err(WireError::BadGgep(format!(
                    "value for {key} is {} bytes",
                    value.len()
                )));
            }
            let mut flags = id.len() as u8;
            if i == last {
                flags |= FLAG_LAST;
            }
            out.push(flags);
            out.extend_from_slice(id);
            encode_length(value.len(), out);
            out.extend_from_slice(value);
        }
        Ok(())
    }

    /// Parse a block starting at `bytes[0]`.
    ///
    /// Returns the block and the number of bytes consumed.
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize), WireError> {
        ensure_len(bytes, 1)?;
        if bytes[0] != GGEP_MAGIC {
            return Err(WireError::BadGgep(format!("bad magic 0x{:02X}", bytes[0])));
        }
        let mut block = GgepBlock::new();
        let mut pos = 1;
        loop {
            ensure_len(bytes, pos + 1)?;
            let flags = bytes[pos];
            pos += 1;
            if flags & (FLAG_ENCODED | FLAG_COMPRESSED) != 0 {
                return Err(WireError::BadGgep("encoded or compressed extension".into()));
            }
            if flags & FLAG_RESERVED != 0 {
                return Err(WireError::BadGgep("reserved flag set".into()));
            }
            let id_len = (flags & ID_LEN_MASK) as usize;
            if id_len == 0 {
                return Err(WireError::BadGgep("empty extension id".into()));
            }
            ensure_len(bytes, pos + id_len)?;
            let id = std::str::from_utf8(&bytes[pos..pos + id_len])
                .map_err(|_| WireError::BadGgep("non-utf8 extension id".into()))?
                .to_string();
            pos += id_len;

            let (value_len, used) = decode_length(&bytes[pos..])?;
            pos += used;
            ensure_len(bytes, pos + value_len)?;
            block.put(&id, bytes[pos..pos + value_len].to_vec());
            pos += value_len;

            if flags & FLAG_LAST != 0 {
                return Ok((block, pos));
            }
        }
    }
}

fn encode_length(len: usize, out: &mut Vec<u8>) {
    if len < 1 << 6 {
        out.push(LEN_LAST | len as u8);
    } else if len < 1 << 12 {
        out.push(LEN_MORE | (len >> 6) as u8);
        out.push(LEN_LAST | (len as u8 & LEN_BITS));
    } else {
        out.push(LEN_MORE | (len >> 12) as u8);
        out.push(LEN_MORE | ((len >> 6) as u8 & LEN_BITS));
        out.push(LEN_LAST | (len as u8 & LEN_BITS));
    }
}

fn decode_length(bytes: &[u8]) -> Result<(usize, usize), WireError> {
    let mut value = 0usize;
    for i in 0..3 {
        ensure_len(bytes, i + 1)?;
        let b = bytes[i];
        value = (value << 6) | (b & LEN_BITS) as usize;
        if b & LEN_LAST != 0 {
            return Ok((value, i + 1));
        }
        if b & LEN_MORE == 0 {
            return Err(WireError::BadGgep("length byte without continuation".into()));
        }
    }
    Err(WireError::BadGgep("length longer than 3 bytes".into()))
}
