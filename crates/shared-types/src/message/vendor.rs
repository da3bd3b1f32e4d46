//! Vendor messages.
//!
//! Every vendor message starts with an 8-byte prefix naming the vendor, the
//! message selector and its version:
//!
//! ```text
//! vendor [4] │ selector (u16 LE) │ version (u16 LE) │ body
//! ```
//!
//! Some messages take their context from the message GUID rather than the
//! body: a query status response carries the query GUID, a push-proxy
//! request carries the leaf's client GUID, and a UDP connect-back carries
//! the GUID to echo in the connect-back ping.

use crate::errors::{ensure_len, WireError};
use std::net::Ipv4Addr;

/// Four-byte vendor code.
pub type VendorId = [u8; 4];

pub const VENDOR_NULL: VendorId = [0, 0, 0, 0];
pub const VENDOR_BEAR: VendorId = *b"BEAR";
pub const VENDOR_LIME: VendorId = *b"LIME";
pub const VENDOR_GTKG: VendorId = *b"GTKG";

pub const SEL_MESSAGES_SUPPORTED: u16 = 0;
pub const SEL_HOPS_FLOW: u16 = 4;
pub const SEL_CONNECT_BACK: u16 = 7;
pub const SEL_UDP_CONNECT_BACK_REDIRECT: u16 = 8;
pub const SEL_QUERY_STATUS_REQUEST: u16 = 11;
pub const SEL_QUERY_STATUS_RESPONSE: u16 = 12;
pub const SEL_PUSH_PROXY_REQUEST: u16 = 21;
pub const SEL_PUSH_PROXY_ACK: u16 = 22;

const PREFIX_LEN: usize = 8;

/// One entry of a [`VendorMessage::MessagesSupported`] list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SupportedMessage {
    pub vendor: VendorId,
    pub selector: u16,
    pub version: u16,
}

impl SupportedMessage {
    pub const fn new(vendor: VendorId, selector: u16, version: u16) -> Self {
        Self {
            vendor,
            selector,
            version,
        }
    }

    /// Leaf guidance: the leaf reports its result counts.
    pub const QUERY_STATUS: Self = Self::new(VENDOR_BEAR, SEL_QUERY_STATUS_REQUEST, 1);
    pub const TCP_CONNECT_BACK: Self = Self::new(VENDOR_BEAR, SEL_CONNECT_BACK, 1);
    pub const UDP_CONNECT_BACK: Self = Self::new(VENDOR_GTKG, SEL_CONNECT_BACK, 2);
    pub const TCP_REDIRECT: Self = Self::new(VENDOR_LIME, SEL_CONNECT_BACK, 1);
    pub const UDP_REDIRECT: Self = Self::new(VENDOR_LIME, SEL_UDP_CONNECT_BACK_REDIRECT, 1);
    pub const PUSH_PROXY: Self = Self::new(VENDOR_LIME, SEL_PUSH_PROXY_REQUEST, 2);
    pub const HOPS_FLOW: Self = Self::new(VENDOR_BEAR, SEL_HOPS_FLOW, 1);

    /// What we advertise.
    pub const OURS: [Self; 7] = [
        Self::QUERY_STATUS,
        Self::TCP_CONNECT_BACK,
        Self::UDP_CONNECT_BACK,
        Self::TCP_REDIRECT,
        Self::UDP_REDIRECT,
        Self::PUSH_PROXY,
        Self::HOPS_FLOW,
    ];
}

/// Typed vendor message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VendorMessage {
    /// Capability advertisement.
    MessagesSupported(Vec<SupportedMessage>),
    /// Ask the receiver to open a TCP connection back to us on `port`.
    TcpConnectBack { port: u16 },
    /// Ask the receiver to send a UDP ping back to us on `port`.
    UdpConnectBack { port: u16 },
    /// Ask an ultrapeer to perform a TCP connect-back on our behalf.
    TcpConnectBackRedirect { ip: Ipv4Addr, port: u16 },
    /// Ask an ultrapeer to perform a UDP connect-back on our behalf.
    UdpConnectBackRedirect { ip: Ipv4Addr, port: u16 },
    /// A leaf asks us to act as its push proxy.
    PushProxyRequest,
    /// We accept being a push proxy at `ip:port`.
    PushProxyAck { ip: Ipv4Addr, port: u16 },
    /// Ultrapeer asks a leaf how many results it has.
    QueryStatusRequest,
    /// Leaf reports how many results it has for the query.
    QueryStatusResponse { results: u16 },
    /// The sender only wants queries with fewer hops than `hops`.
    HopsFlow { hops: u8 },
    /// Anything we do not interpret.
    Unknown {
        vendor: VendorId,
        selector: u16,
        version: u16,
        body: Vec<u8>,
    },
}

impl VendorMessage {
    /// `(vendor, selector, version)` written in the prefix.
    pub fn id(&self) -> (VendorId, u16, u16) {
        match self {
            VendorMessage::MessagesSupported(_) => (VENDOR_NULL, SEL_MESSAGES_SUPPORTED, 0),
            VendorMessage::TcpConnectBack { .. } => (VENDOR_BEAR, SEL_CONNECT_BACK, 1),
            VendorMessage::UdpConnectBack { .. } => (VENDOR_GTKG, SEL_CONNECT_BACK, 2),
            VendorMessage::TcpConnectBackRedirect { .. } => (VENDOR_LIME, SEL_CONNECT_BACK, 1),
            VendorMessage::UdpConnectBackRedirect { .. } => {
                (VENDOR_LIME, SEL_UDP_CONNECT_BACK_REDIRECT, 1)
            }
            VendorMessage::PushProxyRequest => (VENDOR_LIME, SEL_PUSH_PROXY_REQUEST, 2),
            VendorMessage::PushProxyAck { .. } => (VENDOR_LIME, SEL_PUSH_PROXY_ACK, 2),
            VendorMessage::QueryStatusRequest => (VENDOR_BEAR, SEL_QUERY_STATUS_REQUEST, 1),
            VendorMessage::QueryStatusResponse { .. } => {
                (VENDOR_BEAR, SEL_QUERY_STATUS_RESPONSE, 1)
            }
            VendorMessage::HopsFlow { .. } => (VENDOR_BEAR, SEL_HOPS_FLOW, 1),
            VendorMessage::Unknown {
                vendor,
                selector,
                version,
                ..
            } => (*vendor, *selector, *version),
        }
    }

    pub(crate) fn encode_into(&self, out: &mut Vec<u8>) {
        let (vendor, selector, version) = self.id();
        out.extend_from_slice(&vendor);
        out.extend_from_slice(&selector.to_le_bytes());
        out.extend_from_slice(&version.to_le_bytes());
        match self {
            VendorMessage::MessagesSupported(list) => {
                out.extend_from_slice(&(list.len() as u16).to_le_bytes());
                for m in list {
                    out.extend_from_slice(&m.vendor);
                    out.extend_from_slice(&m.selector.to_le_bytes());
                    out.extend_from_slice(&m.version.to_le_bytes());
                }
            }
            VendorMessage::TcpConnectBack { port } | VendorMessage::UdpConnectBack { port } => {
                out.extend_from_slice(&port.to_le_bytes());
            }
            VendorMessage::TcpConnectBackRedirect { ip, port }
            | VendorMessage::UdpConnectBackRedirect { ip, port }
            | VendorMessage::PushProxyAck { ip, port } => {
                out.extend_from_slice(&ip.octets());
                out.extend_from_slice(&port.to_le_bytes());
            }
            VendorMessage::PushProxyRequest | VendorMessage::QueryStatusRequest => {}
            VendorMessage::QueryStatusResponse { results } => {
                out.extend_from_slice(&results.to_le_bytes());
            }
            VendorMessage::HopsFlow { hops } => out.push(*hops),
            VendorMessage::Unknown { body, .. } => out.extend_from_slice(body),
        }
    }

    pub(crate) fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        ensure_len(bytes, PREFIX_LEN)?;
        let vendor: VendorId = [bytes[0], bytes[1], bytes[2], bytes[3]];
        let selector = u16::from_le_bytes([bytes[4], bytes[5]]);
        let version = u16::from_le_bytes([bytes[6], bytes[7]]);
        let body = &bytes[PREFIX_LEN..];

        let msg = match (vendor, selector) {
            (VENDOR_NULL, SEL_MESSAGES_SUPPORTED) => {
                ensure_len(body, 2)?;
                let count = u16::from_le_bytes([body[0], body[1]]) as usize;
                ensure_len(body, 2 + count * 8)?;
                let list = body[2..2 + count * 8]
                    .chunks_exact(8)
                    .map(|c| SupportedMessage {
                        vendor: [c[0], c[1], c[2], c[3]],
                        selector: u16::from_le_bytes([c[4], c[5]]),
                        version: u16::from_le_bytes([c[6], c[7]]),
                    })
                    .collect();
                VendorMessage::MessagesSupported(list)
            }
            (VENDOR_BEAR, SEL_CONNECT_BACK) => VendorMessage::TcpConnectBack {
                port: read_port(body, 0)?,
            },
            (VENDOR_GTKG, SEL_CONNECT_BACK) => VendorMessage::UdpConnectBack {
                port: read_port(body, 0)?,
            },
            (VENDOR_LIME, SEL_CONNECT_BACK) => {
                let (ip, port) = read_addr(body)?;
                VendorMessage::TcpConnectBackRedirect { ip, port }
            }
            (VENDOR_LIME, SEL_UDP_CONNECT_BACK_REDIRECT) => {
                let (ip, port) = read_addr(body)?;
                VendorMessage::UdpConnectBackRedirect { ip, port }
            }
            (VENDOR_LIME, SEL_PUSH_PROXY_REQUEST) => VendorMessage::PushProxyRequest,
            (VENDOR_LIME, SEL_PUSH_PROXY_ACK) => {
                let (ip, port) = read_addr(body)?;
                VendorMessage::PushProxyAck { ip, port }
            }
            (VENDOR_BEAR, SEL_QUERY_STATUS_REQUEST) => VendorMessage::QueryStatusRequest,
            (VENDOR_BEAR, SEL_QUERY_STATUS_RESPONSE) => {
                ensure_len(body, 2)?;
                VendorMessage::QueryStatusResponse {
                    results: u16::from_le_bytes([body[0], body[1]]),
                }
            }
            (VENDOR_BEAR, SEL_HOPS_FLOW) => {
                ensure_len(body, 1)?;
                VendorMessage::HopsFlow { hops: body[0] }
            }
            _ => VendorMessage::Unknown {
                vendor,
                selector,
                version,
                body: body.to_vec(),
            },
        };
        Ok(msg)
    }
}

fn read_port(body: &[u8], offset: usize) -> Result<u16, WireError> {
    ensure_len(body, offset + 2)?;
    let port = u16::from_le_bytes([body[offset], body[offset + 1]]);
    if port == 0 {
        return Err(WireError::InvalidField {
            field: "port",
            reason: "port 0".into(),
        });
    }
    Ok(port)
}

fn read_addr(body: &[u8]) -> Result<(Ipv4Addr, u16), WireError> {
    ensure_len(body, 6)?;
    let ip = Ipv4Addr::new(body[0], body[1], body[2], body[3]);
    Ok((ip, read_port(body, 4)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(msg: VendorMessage) -> VendorMessage {
        let mut out = Vec::new();
        msg.encode_into(&mut out);
        VendorMessage::decode(&out).unwrap()
    }

    #[test]
    fn test_messages_supported_roundtrip() {
        let msg = VendorMessage::MessagesSupported(SupportedMessage::OURS.to_vec());
        assert_eq!(roundtrip(msg.clone()), msg);
    }

    #[test]
    fn test_connect_back_variants_are_distinguished_by_vendor() {
        assert_eq!(
            roundtrip(VendorMessage::TcpConnectBack { port: 6346 }),
            VendorMessage::TcpConnectBack { port: 6346 }
        );
        assert_eq!(
            roundtrip(VendorMessage::UdpConnectBack { port: 6346 }),
            VendorMessage::UdpConnectBack { port: 6346 }
        );
        let redirect = VendorMessage::TcpConnectBackRedirect {
            ip: Ipv4Addr::new(9, 8, 7, 6),
            port: 1234,
        };
        assert_eq!(roundtrip(redirect.clone()), redirect);
    }

    #[test]
    fn test_query_status_response() {
        let msg = VendorMessage::QueryStatusResponse { results: 65535 };
        assert_eq!(roundtrip(msg.clone()), msg);
    }

    #[test]
    fn test_unknown_vendor_is_preserved() {
        let msg = VendorMessage::Unknown {
            vendor: *b"ABCD",
            selector: 99,
            version: 3,
            body: vec![1, 2, 3],
        };
        assert_eq!(roundtrip(msg.clone()), msg);
    }

    #[test]
    fn test_zero_port_is_rejected() {
        let mut out = Vec::new();
        VendorMessage::TcpConnectBack { port: 0 }.encode_into(&mut out);
        assert!(VendorMessage::decode(&out).is_err());
    }
}
