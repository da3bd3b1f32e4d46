//! Query and query-reply payloads.

use crate::errors::{ensure_len, WireError};
use crate::ggep::{keys, GgepBlock, GGEP_MAGIC};
use crate::guid::{Guid, GUID_LEN};
use std::net::Ipv4Addr;

/// Separates elements of the query extension area.
const EXTENSION_SEPARATOR: u8 = 0x1C;

const URN_PREFIX: &str = "urn:";

/// Query payload.
///
/// ```text
/// min_speed (u16 LE) │ text │ 0x00 │ urn 0x1C urn 0x1C GGEP │ 0x00
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryRequest {
    pub min_speed: u16,
    text: String,
    urns: Vec<String>,
    ggep: Option<GgepBlock>,
}

impl QueryRequest {
    /// A keyword query.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// A query for one exact file hash.
    pub fn for_urn(urn: impl Into<String>) -> Self {
        Self::default().with_urn(urn)
    }

    pub fn with_urn(mut self, urn: impl Into<String>) -> Self {
        self.urns.push(urn.into());
        self
    }

    pub fn with_query_key(mut self, key: Vec<u8>) -> Self {
        self.ggep
            .get_or_insert_with(GgepBlock::new)
            .put(keys::QUERY_KEY, key);
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn urns(&self) -> &[String] {
        &self.urns
    }

    /// A query that names files only by hash.
    pub fn is_urn_query(&self) -> bool {
        self.text.trim().is_empty() && !self.urns.is_empty()
    }

    pub fn query_key(&self) -> Option<&[u8]> {
        self.ggep.as_ref().and_then(|g| g.get(keys::QUERY_KEY))
    }

    pub fn ggep(&self) -> Option<&GgepBlock> {
        self.ggep.as_ref()
    }

    pub(crate) fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), WireError> {
        out.extend_from_slice(&self.min_speed.to_le_bytes());
        out.extend_from_slice(self.text.as_bytes());
        out.push(0);

        let mut wrote_extension = false;
        for urn in &self.urns {
            if wrote_extension {
                out.push(EXTENSION_SEPARATOR);
            }
            out.extend_from_slice(urn.as_bytes());
            wrote_extension = true;
        }
        if let Some(block) = self.ggep.as_ref().filter(|b| !b.is_empty()) {
            if wrote_extension {
                out.push(EXTENSION_SEPARATOR);
            }
            block.encode_into(out)?;
            wrote_extension = true;
        }
        if wrote_extension {
            out.push(0);
        }
        Ok(())
    }

    pub(crate) fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        ensure_len(bytes, 3)?;
        let min_speed = u16::from_le_bytes([bytes[0], bytes[1]]);
        let rest = &bytes[2..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| WireError::InvalidField {
                field: "query text",
                reason: "missing NUL terminator".into(),
            })?;
        let text = String::from_utf8_lossy(&rest[..nul]).into_owned();

        let mut query = Self {
            min_speed,
            text,
            urns: Vec::new(),
            ggep: None,
        };

        let ext = &rest[nul + 1..];
        let mut pos = 0;
        while pos < ext.len() {
            match ext[pos] {
                0 => break,
                EXTENSION_SEPARATOR => pos += 1,
                GGEP_MAGIC => {
                    let (block, used) = GgepBlock::decode(&ext[pos..])?;
                    query.ggep = Some(block);
                    pos += used;
                }
                _ => {
                    let end = ext[pos..]
                        .iter()
                        .position(|&b| b == EXTENSION_SEPARATOR || b == 0)
                        .map_or(ext.len(), |i| pos + i);
                    let element = String::from_utf8_lossy(&ext[pos..end]);
                    // Anything but a URN (rich-query XML, legacy junk) is skipped.
                    if element.to_ascii_lowercase().starts_with(URN_PREFIX) {
                        query.urns.push(element.into_owned());
                    }
                    pos = end;
                }
            }
        }
        Ok(query)
    }
}

/// Fixed part of a query reply before the result area.
const REPLY_PREFIX_LEN: usize = 11;

/// Query reply payload.
///
/// The per-file result records are carried opaquely; the router only needs
/// the hit count, the responder address and the trailing client GUID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryReply {
    pub hit_count: u8,
    pub port: u16,
    pub ip: Ipv4Addr,
    pub speed: u32,
    pub results: Vec<u8>,
    pub client_guid: Guid,
}

impl QueryReply {
    pub fn new(client_guid: Guid, ip: Ipv4Addr, port: u16, hit_count: u8) -> Self {
        Self {
            hit_count,
            port,
            ip,
            speed: 0,
            results: Vec::new(),
            client_guid,
        }
    }

    pub fn with_results(mut self, results: Vec<u8>) -> Self {
        self.results = results;
        self
    }

    pub fn result_count(&self) -> usize {
        self.hit_count as usize
    }

    pub(crate) fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.hit_count);
        out.extend_from_slice(&self.port.to_le_bytes());
        out.extend_from_slice(&self.ip.octets());
        out.extend_from_slice(&self.speed.to_le_bytes());
        out.extend_from_slice(&self.results);
        out.extend_from_slice(self.client_guid.as_bytes());
    }

    pub(crate) fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        ensure_len(bytes, REPLY_PREFIX_LEN + GUID_LEN)?;
        let guid_start = bytes.len() - GUID_LEN;
        let mut guid = [0u8; GUID_LEN];
        guid.copy_from_slice(&bytes[guid_start..]);
        Ok(Self {
            hit_count: bytes[0],
            port: u16::from_le_bytes([bytes[1], bytes[2]]),
            ip: Ipv4Addr::new(bytes[3], bytes[4], bytes[5], bytes[6]),
            speed: u32::from_le_bytes([bytes[7], bytes[8], bytes[9], bytes[10]]),
            results: bytes[REPLY_PREFIX_LEN..guid_start].to_vec(),
            client_guid: Guid::from_bytes(guid),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_with_urns_and_query_key() {
        let query = QueryRequest::new("free software")
            .with_urn("urn:sha1:PLSTHIPQGSSZTS5FJUPAKUZWUGYQYPFB")
            .with_query_key(vec![0x1C, 0x00, 7, 9]);
        let mut out = Vec::new();
        query.encode_into(&mut out).unwrap();
        let decoded = QueryRequest::decode(&out).unwrap();
        assert_eq!(decoded, query);
        assert_eq!(decoded.query_key(), Some(&[0x1C, 0x00, 7, 9][..]));
    }

    #[test]
    fn test_plain_query_has_no_extension_area() {
        let query = QueryRequest::new("beatles");
        let mut out = Vec::new();
        query.encode_into(&mut out).unwrap();
        assert_eq!(out.len(), 2 + "beatles".len() + 1);
    }

    #[test]
    fn test_xml_extension_is_skipped() {
        let mut bytes = vec![0, 0];
        bytes.extend_from_slice(b"song\0<audios/>");
        bytes.push(EXTENSION_SEPARATOR);
        bytes.extend_from_slice(b"urn:sha1:ABC\0");
        let query = QueryRequest::decode(&bytes).unwrap();
        assert_eq!(query.text(), "song");
        assert_eq!(query.urns(), &["urn:sha1:ABC".to_string()]);
    }

    #[test]
    fn test_urn_query_detection() {
        assert!(QueryRequest::for_urn("urn:sha1:X").is_urn_query());
        assert!(!QueryRequest::new("x").with_urn("urn:sha1:X").is_urn_query());
    }

    #[test]
    fn test_query_without_terminator_is_rejected() {
        assert!(QueryRequest::decode(&[0, 0, b'a', b'b']).is_err());
    }

    #[test]
    fn test_reply_roundtrip() {
        let reply = QueryReply::new(Guid::new_random(), Ipv4Addr::new(1, 2, 3, 4), 6346, 3)
            .with_results(vec![9; 40]);
        let mut out = Vec::new();
        reply.encode_into(&mut out);
        assert_eq!(QueryReply::decode(&out).unwrap(), reply);
    }
}
