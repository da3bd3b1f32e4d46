//! # Globally Unique Identifiers
//!
//! A [`Guid`] names a message. Replies carry the GUID of the request they
//! answer, which is how the route tables send them back along the path the
//! request took.
//!
//! ## Markings
//!
//! ```text
//! byte:  0  1  2  3  4  5  6  7  8  9 10 11 12 13 14 15
//!        └─ip (opt)─┘ └─a──┘ └─b──┘ FF └tag┘      └rq┘ 00
//! ```
//!
//! - bytes 9-10 hold `tag(a, b)` computed from the fields at 4 and 6.
//! - byte 8 == 0xFF and byte 15 == 0x00 mark a "new" client GUID.
//! - bytes 13-14 optionally hold a requery tag, or the encoded port.

use crate::errors::GuidError;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Number of bytes in a GUID.
pub const GUID_LEN: usize = 16;

/// Offset of the LimeWire tag.
const TAG_OFFSET: usize = 9;

/// Offset of the requery tag and of the encoded port.
const REQUERY_OFFSET: usize = 13;

/// Field offsets used by each requery marking scheme, indexed by version.
const REQUERY_FIELDS: [(usize, usize); 3] = [(0, 9), (0, 2), (0, 11)];

/// Requery scheme used for GUIDs we generate.
pub const CURRENT_REQUERY_VERSION: usize = 2;

/// Immutable 16-byte message identifier.
///
/// Equality, ordering and hashing are byte-wise.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Guid([u8; GUID_LEN]);

impl Guid {
    /// Wrap raw bytes.
    pub const fn from_bytes(bytes: [u8; GUID_LEN]) -> Self {
        Self(bytes)
    }

    /// Create a fresh random GUID carrying the new-client and tag markings.
    pub fn new_random() -> Self {
        let mut bytes = [0u8; GUID_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        bytes[8] = 0xFF;
        bytes[15] = 0x00;
        write_tag(&mut bytes, 4, 6, TAG_OFFSET);
        Self(bytes)
    }

    /// Create a fresh GUID additionally marked as an automatic requery.
    pub fn new_requery() -> Self {
        let mut guid = Self::new_random();
        let (first, second) = REQUERY_FIELDS[CURRENT_REQUERY_VERSION];
        write_tag(&mut guid.0, first, second, REQUERY_OFFSET);
        guid
    }

    /// Create a fresh GUID that carries our address, so out-of-band replies
    /// can find us.
    pub fn new_address_encoded(ip: Ipv4Addr, port: u16) -> Self {
        Self::new_random().address_encode(ip, port)
    }

    /// Return a copy of this GUID with `ip` in bytes 0-3 and `port`
    /// little-endian in bytes 13-14.
    pub fn address_encode(&self, ip: Ipv4Addr, port: u16) -> Self {
        let mut bytes = self.0;
        bytes[..4].copy_from_slice(&ip.octets());
        bytes[REQUERY_OFFSET..REQUERY_OFFSET + 2].copy_from_slice(&port.to_le_bytes());
        Self(bytes)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; GUID_LEN] {
        &self.0
    }

    /// True if byte 8 is 0xFF and byte 15 is 0x00.
    pub fn is_new_client_guid(&self) -> bool {
        self.0[8] == 0xFF && self.0[15] == 0x00
    }

    /// True if the tag at bytes 9-10 matches the fields at 4 and 6.
    pub fn is_lime_guid(&self) -> bool {
        check_tag(&self.0, 4, 6, TAG_OFFSET)
    }

    /// True if this is a requery GUID under marking scheme `version`.
    ///
    /// Unknown versions are never matched.
    pub fn is_lime_requery_guid(&self, version: usize) -> bool {
        match REQUERY_FIELDS.get(version) {
            Some(&(first, second)) => check_tag(&self.0, first, second, REQUERY_OFFSET),
            None => false,
        }
    }

    /// True if this is a requery GUID under any marking scheme.
    pub fn is_lime_requery_guid_any(&self) -> bool {
        (0..REQUERY_FIELDS.len()).any(|v| self.is_lime_requery_guid(v))
    }

    /// IPv4 address stored in bytes 0-3.
    pub fn encoded_ip(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.0[0], self.0[1], self.0[2], self.0[3])
    }

    /// Port stored little-endian in bytes 13-14.
    pub fn encoded_port(&self) -> u16 {
        u16::from_le_bytes([self.0[REQUERY_OFFSET], self.0[REQUERY_OFFSET + 1]])
    }

    /// True if this GUID encodes exactly `ip` and `port`.
    pub fn addresses_match(&self, ip: Ipv4Addr, port: u16) -> bool {
        self.encoded_ip() == ip && self.encoded_port() == port
    }

    /// Upper-case hex, 32 characters.
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }

    /// Parse 32 hex characters.
    pub fn from_hex(s: &str) -> Result<Self, GuidError> {
        if s.len() != GUID_LEN * 2 {
            return Err(GuidError::BadLength(s.len()));
        }
        let mut bytes = [0u8; GUID_LEN];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| GuidError::BadHex)?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({})", self.to_hex())
    }
}

impl From<[u8; GUID_LEN]> for Guid {
    fn from(bytes: [u8; GUID_LEN]) -> Self {
        Self(bytes)
    }
}

/// `((a + 2) * (b + 3)) >> 16`, truncated to 16 bits.
///
/// Evaluated in 64 bits so the product of two maximal fields cannot wrap.
pub fn tag(a: u16, b: u16) -> u16 {
    let product = (u64::from(a) + 2) * (u64::from(b) + 3);
    (product >> 16) as u16
}

fn read_u16(bytes: &[u8; GUID_LEN], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn write_tag(bytes: &mut [u8; GUID_LEN], first: usize, second: usize, mark: usize) {
    let value = tag(read_u16(bytes, first), read_u16(bytes, second));
    bytes[mark..mark + 2].copy_from_slice(&value.to_le_bytes());
}

fn check_tag(bytes: &[u8; GUID_LEN], first: usize, second: usize, mark: usize) -> bool {
    tag(read_u16(bytes, first), read_u16(bytes, second)) == read_u16(bytes, mark)
}
