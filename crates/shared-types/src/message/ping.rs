//! Ping and pong payloads.

use crate::errors::{ensure_len, WireError};
use crate::ggep::{keys, GgepBlock, GGEP_MAGIC};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

/// Version byte written in the `UP` extension.
const UP_VERSION: u8 = 1;

/// Ping payload. An empty ping carries no bytes at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PingRequest {
    ggep: Option<GgepBlock>,
}

impl PingRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// A ping asking for a query key, sent with TTL 1 over UDP.
    pub fn query_key_request() -> Self {
        Self::new().with_extension(keys::QUERY_KEY, Vec::new())
    }

    pub fn with_locale(self, locale: &str) -> Self {
        self.with_extension(keys::LOCALE, locale.as_bytes().to_vec())
    }

    /// Mark that the pinger accepts cached pongs.
    pub fn with_cached_pongs(self) -> Self {
        self.with_extension(keys::SUPPORTS_CACHED_PONGS, Vec::new())
    }

    fn with_extension(mut self, key: &str, value: Vec<u8>) -> Self {
        self.ggep.get_or_insert_with(GgepBlock::new).put(key, value);
        self
    }

    pub fn ggep(&self) -> Option<&GgepBlock> {
        self.ggep.as_ref()
    }

    /// Locale preference of the pinger, if it sent one.
    pub fn locale(&self) -> Option<String> {
        self.ggep.as_ref().and_then(|g| g.get_str(keys::LOCALE))
    }

    pub fn requests_query_key(&self) -> bool {
        self.ggep.as_ref().is_some_and(|g| g.has(keys::QUERY_KEY))
    }

    pub fn supports_cached_pongs(&self) -> bool {
        self.ggep
            .as_ref()
            .is_some_and(|g| g.has(keys::SUPPORTS_CACHED_PONGS))
    }

    pub(crate) fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), WireError> {
        match &self.ggep {
            Some(block) => block.encode_into(out),
            None => Ok(()),
        }
    }

    pub(crate) fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.is_empty() {
            return Ok(Self::new());
        }
        // Old clients pad pings with junk; only a leading GGEP block counts.
        if bytes[0] != GGEP_MAGIC {
            return Ok(Self::new());
        }
        let (block, _) = GgepBlock::decode(bytes)?;
        Ok(Self { ggep: Some(block) })
    }
}

/// Pong payload: the address and library size of a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingReply {
    pub port: u16,
    pub ip: Ipv4Addr,
    pub files: u32,
    pub kilobytes: u32,
    ggep: Option<GgepBlock>,
}

impl PingReply {
    pub fn new(ip: Ipv4Addr, port: u16, files: u32, kilobytes: u32) -> Self {
        Self {
            port,
            ip,
            files,
            kilobytes,
            ggep: None,
        }
    }

    /// Advertise ultrapeer status with the given free slots.
    pub fn with_ultrapeer(self, free_leaf_slots: u8, free_ultrapeer_slots: u8) -> Self {
        self.with_extension(
            keys::ULTRAPEER,
            vec![UP_VERSION, free_leaf_slots, free_ultrapeer_slots],
        )
    }

    pub fn with_locale(self, locale: &str) -> Self {
        self.with_extension(keys::LOCALE, locale.as_bytes().to_vec())
    }

    /// Advertise unicast (GUESS) support.
    pub fn with_unicast(self) -> Self {
        self.with_extension(keys::UNICAST, vec![1])
    }

    pub fn with_udp_host_cache(self) -> Self {
        self.with_extension(keys::UDP_HOST_CACHE, Vec::new())
    }

    pub fn with_query_key(self, key: Vec<u8>) -> Self {
        self.with_extension(keys::QUERY_KEY, key)
    }

    fn with_extension(mut self, key: &str, value: Vec<u8>) -> Self {
        self.ggep.get_or_insert_with(GgepBlock::new).put(key, value);
        self
    }

    pub fn ggep(&self) -> Option<&GgepBlock> {
        self.ggep.as_ref()
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip, self.port))
    }

    pub fn is_ultrapeer(&self) -> bool {
        self.ultrapeer_data().is_some()
    }

    fn ultrapeer_data(&self) -> Option<&[u8]> {
        self.ggep.as_ref().and_then(|g| g.get(keys::ULTRAPEER))
    }

    pub fn free_leaf_slots(&self) -> u8 {
        self.ultrapeer_data()
            .and_then(|d| d.get(1).copied())
            .unwrap_or(0)
    }

    pub fn free_ultrapeer_slots(&self) -> u8 {
        self.ultrapeer_data()
            .and_then(|d| d.get(2).copied())
            .unwrap_or(0)
    }

    pub fn has_free_slots(&self) -> bool {
        self.free_leaf_slots() > 0 || self.free_ultrapeer_slots() > 0
    }

    pub fn locale(&self) -> Option<String> {
        self.ggep.as_ref().and_then(|g| g.get_str(keys::LOCALE))
    }

    pub fn supports_unicast(&self) -> bool {
        self.ggep.as_ref().is_some_and(|g| g.has(keys::UNICAST))
    }

    pub fn is_udp_host_cache(&self) -> bool {
        self.ggep
            .as_ref()
            .is_some_and(|g| g.has(keys::UDP_HOST_CACHE))
    }

    pub fn query_key(&self) -> Option<&[u8]> {
        self.ggep.as_ref().and_then(|g| g.get(keys::QUERY_KEY))
    }

    /// True for addresses other peers could actually reach.
    pub fn has_routable_address(&self) -> bool {
        let ip = self.ip;
        self.port != 0
            && !(ip.is_private()
                || ip.is_loopback()
                || ip.is_link_local()
                || ip.is_unspecified()
                || ip.is_broadcast()
                || ip.is_multicast())
    }

    pub(crate) fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), WireError> {
        out.extend_from_slice(&self.port.to_le_bytes());
        out.extend_from_slice(&self.ip.octets());
        out.extend_from_slice(&self.files.to_le_bytes());
        out.extend_from_slice(&self.kilobytes.to_le_bytes());
        match &self.ggep {
            Some(block) => block.encode_into(out),
            None => Ok(()),
        }
    }

    pub(crate) fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        ensure_len(bytes, 14)?;
        let port = u16::from_le_bytes([bytes[0], bytes[1]]);
        let ip = Ipv4Addr::new(bytes[2], bytes[3], bytes[4], bytes[5]);
        let files = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);
        let kilobytes = u32::from_le_bytes([bytes[10], bytes[11], bytes[12], bytes[13]]);
        let ggep = match bytes.get(14) {
            Some(&GGEP_MAGIC) => Some(GgepBlock::decode(&bytes[14..])?.0),
            _ => None,
        };
        Ok(Self {
            port,
            ip,
            files,
            kilobytes,
            ggep,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pong_roundtrip_with_extensions() {
        let pong = PingReply::new(Ipv4Addr::new(64, 61, 25, 171), 6346, 10, 2048)
            .with_ultrapeer(3, 0)
            .with_locale("de");
        let mut out = Vec::new();
        pong.encode_into(&mut out).unwrap();
        let decoded = PingReply::decode(&out).unwrap();
        assert_eq!(decoded, pong);
        assert!(decoded.is_ultrapeer());
        assert!(decoded.has_free_slots());
        assert_eq!(decoded.locale().as_deref(), Some("de"));
    }

    #[test]
    fn test_plain_pong_is_not_ultrapeer() {
        let pong = PingReply::new(Ipv4Addr::new(64, 61, 25, 171), 6346, 0, 0);
        assert!(!pong.is_ultrapeer());
        assert!(!pong.has_free_slots());
    }

    #[test]
    fn test_private_address_is_not_routable() {
        let private = PingReply::new(Ipv4Addr::new(192, 168, 1, 2), 6346, 0, 0);
        let public = PingReply::new(Ipv4Addr::new(64, 61, 25, 171), 6346, 0, 0);
        assert!(!private.has_routable_address());
        assert!(public.has_routable_address());
    }

    #[test]
    fn test_ping_with_junk_payload_decodes_empty() {
        let ping = PingRequest::decode(&[1, 2, 3]).unwrap();
        assert_eq!(ping, PingRequest::new());
    }

    #[test]
    fn test_query_key_request_ping() {
        let ping = PingRequest::query_key_request();
        let mut out = Vec::new();
        ping.encode_into(&mut out).unwrap();
        assert!(PingRequest::decode(&out).unwrap().requests_query_key());
    }
}
