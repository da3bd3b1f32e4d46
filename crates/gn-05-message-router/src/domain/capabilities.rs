//! Negotiated connection capabilities.

use shared_types::SupportedMessage;

/// Degree from which an ultrapeer counts as high-degree.
pub const HIGH_DEGREE: u32 = 15;

/// How a connection relates us to the remote host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionRole {
    /// We are an ultrapeer and the remote is our leaf.
    Leaf,
    /// Both ends are ultrapeers.
    Ultrapeer,
    /// We are a leaf and the remote is our ultrapeer.
    ClientOfUltrapeer,
}

impl ConnectionRole {
    /// The remote host is an ultrapeer.
    pub fn remote_is_ultrapeer(&self) -> bool {
        !matches!(self, ConnectionRole::Leaf)
    }
}

/// What the remote host said it supports, from the handshake and later
/// messages-supported vendor messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    /// Reports query status for dynamic queries run on its behalf.
    pub leaf_guidance: bool,
    pub tcp_redirect: bool,
    pub udp_redirect: bool,
    pub probe_queries: bool,
    pub pong_caching: bool,
    /// Exchanges query route tables with us.
    pub query_routing: bool,
    /// Ultrapeer connections the remote keeps.
    pub degree: u32,
    /// Largest TTL the remote accepts.
    pub max_ttl: u8,
    pub locale: String,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            leaf_guidance: false,
            tcp_redirect: false,
            udp_redirect: false,
            probe_queries: false,
            pong_caching: false,
            query_routing: false,
            degree: 6,
            max_ttl: 4,
            locale: "en".to_string(),
        }
    }
}

impl Capabilities {
    /// A modern peer that supports everything we use.
    pub fn modern() -> Self {
        Self {
            leaf_guidance: true,
            tcp_redirect: true,
            udp_redirect: true,
            probe_queries: true,
            pong_caching: true,
            query_routing: true,
            degree: 32,
            max_ttl: 3,
            ..Self::default()
        }
    }

    pub fn with_locale(mut self, locale: &str) -> Self {
        self.locale = locale.to_string();
        self
    }

    pub fn with_degree(mut self, degree: u32) -> Self {
        self.degree = degree;
        self
    }

    /// Refresh the vendor-message driven flags from an advertisement.
    pub fn apply_supported(&mut self, supported: &[SupportedMessage]) {
        let has = |m: SupportedMessage| {
            supported
                .iter()
                .any(|s| s.vendor == m.vendor && s.selector == m.selector && s.version >= 1)
        };
        self.leaf_guidance = has(SupportedMessage::QUERY_STATUS);
        self.tcp_redirect = has(SupportedMessage::TCP_REDIRECT);
        self.udp_redirect = has(SupportedMessage::UDP_REDIRECT);
    }

    pub fn is_high_degree(&self) -> bool {
        self.degree >= HIGH_DEGREE
    }

    /// The remote can perform connect-backs on behalf of others.
    pub fn supports_redirect(&self, udp: bool) -> bool {
        if udp {
            self.udp_redirect
        } else {
            self.tcp_redirect
        }
    }
}
