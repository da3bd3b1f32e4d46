//! Push request payload.

use crate::errors::{ensure_len, WireError};
use crate::ggep::{GgepBlock, GGEP_MAGIC};
use crate::guid::{Guid, GUID_LEN};
use std::net::Ipv4Addr;

const PUSH_LEN: usize = GUID_LEN + 4 + 4 + 2;

/// Asks a firewalled host (named by its client GUID) to connect out to
/// `ip:port` and upload file `index`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRequest {
    pub client_guid: Guid,
    pub index: u32,
    pub ip: Ipv4Addr,
    pub port: u16,
    ggep: Option<GgepBlock>,
}

impl PushRequest {
    pub fn new(client_guid: Guid, index: u32, ip: Ipv4Addr, port: u16) -> Self {
        Self {
            client_guid,
            index,
            ip,
            port,
            ggep: None,
        }
    }

    pub fn ggep(&self) -> Option<&GgepBlock> {
        self.ggep.as_ref()
    }

    pub(crate) fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), WireError> {
        out.extend_from_slice(self.client_guid.as_bytes());
        out.extend_from_slice(&self.index.to_le_bytes());
        out.extend_from_slice(&self.ip.octets());
        out.extend_from_slice(&self.port.to_le_bytes());
        match &self.ggep {
            Some(block) => block.encode_into(out),
            None => Ok(()),
        }
    }

    pub(crate) fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        ensure_len(bytes, PUSH_LEN)?;
        let mut guid = [0u8; GUID_LEN];
        guid.copy_from_slice(&bytes[..GUID_LEN]);
        let b = &bytes[GUID_LEN..];
        let ggep = match bytes.get(PUSH_LEN) {
            Some(&GGEP_MAGIC) => Some(GgepBlock::decode(&bytes[PUSH_LEN..])?.0),
            _ => None,
        };
        Ok(Self {
            client_guid: Guid::from_bytes(guid),
            index: u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            ip: Ipv4Addr::new(b[4], b[5], b[6], b[7]),
            port: u16::from_le_bytes([b[8], b[9]]),
            ggep,
        })
    }
}
