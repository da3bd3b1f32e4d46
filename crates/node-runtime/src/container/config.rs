//! # Node Configuration
//!
//! Unified configuration for the router, its tables and the runtime.
//!
//! Values come from three layers, later ones winning:
//!
//! 1. Built-in defaults of each crate's config struct
//! 2. A TOML file named by `GN_CONFIG`
//! 3. Environment overrides (`GN_UDP_PORT`, `GN_ULTRAPEER`,
//!    `GN_QUERY_KEY_SECRET`)
//!
//! ## Config File Format
//!
//! Every key is optional.
//!
//! ```toml
//! [network]
//! udp_port = 6346
//! bind_ip = "0.0.0.0"
//! advertised_ip = "64.61.25.171"
//! ultrapeer = true
//! locale = "en"
//! client_guid = "00112233445566778899aabbccddeeff"
//!
//! [security]
//! query_key_secret = "<64 hex chars>"
//!
//! [router]
//! max_leaves = 30
//! max_ultrapeers = 32
//! max_routed_results = 100
//!
//! [routes]
//! query_window_secs = 300
//! max_routes = 50000
//!
//! [dynamic_query]
//! max_query_ttl = 6
//! ultrapeer_results = 150
//!
//! [pong_cache]
//! expiry_ms = 6000
//!
//! [content]
//! shared_files = ["mozart requiem.mp3"]
//! host_cache_size = 1000
//! ```

use gn_01_route_table::RouteTableConfig;
use gn_03_pong_cache::PongCacheConfig;
use gn_04_dynamic_query::DynamicQueryConfig;
use gn_05_message_router::{RouteTableSet, RouterConfig};
use serde::Deserialize;
use shared_types::Guid;
use std::fs;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::Path;
use thiserror::Error;

/// Length of the query key secret in bytes.
pub const SECRET_LEN: usize = 32;

/// Complete node configuration.
#[derive(Debug, Clone, Default)]
pub struct NodeConfig {
    pub network: NetworkConfig,
    pub security: SecurityConfig,
    pub content: ContentConfig,
    pub router: RouterConfig,
    pub routes: RouteTableSet,
    pub dynamic_query: DynamicQueryConfig,
    pub pong_cache: PongCacheConfig,
}

/// Network configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    /// UDP port we listen on and advertise.
    pub udp_port: u16,
    /// Local address the socket binds to.
    pub bind_ip: Ipv4Addr,
    /// Address advertised in our pongs and replies.
    pub advertised_ip: Ipv4Addr,
    /// Whether this node runs as an ultrapeer.
    pub ultrapeer: bool,
    pub locale: String,
    /// Fixed servent identifier. A random one is used when unset.
    pub client_guid: Option<Guid>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            udp_port: 6346,
            bind_ip: Ipv4Addr::UNSPECIFIED,
            advertised_ip: Ipv4Addr::UNSPECIFIED,
            ultrapeer: true,
            locale: "en".to_string(),
            client_guid: None,
        }
    }
}

impl NetworkConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.bind_ip, self.udp_port))
    }
}

/// Security configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct SecurityConfig {
    /// Secret mixed into every query key we hand out.
    ///
    /// Random per process unless configured, so keys issued before a
    /// restart stop validating.
    pub query_key_secret: [u8; SECRET_LEN],
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            query_key_secret: rand::random(),
        }
    }
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("query_key_secret", &"<redacted>")
            .finish()
    }
}

/// Shared content and host cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentConfig {
    /// File names answered from the local responder.
    pub shared_files: Vec<String>,
    /// Addresses kept by the host catcher.
    pub host_cache_size: usize,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            shared_files: Vec::new(),
            host_cache_size: 1_000,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {error}")]
    Io { path: String, error: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },

    #[error("Query key secret must be {SECRET_LEN} bytes of hex")]
    InvalidSecret,
}

// =============================================================================
// FILE FORMAT
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    network: NetworkFile,
    #[serde(default)]
    security: SecurityFile,
    #[serde(default)]
    router: RouterFile,
    #[serde(default)]
    routes: RoutesFile,
    #[serde(default)]
    dynamic_query: DynamicQueryFile,
    #[serde(default)]
    pong_cache: PongCacheFile,
    #[serde(default)]
    content: ContentFile,
}

#[derive(Debug, Default, Deserialize)]
struct NetworkFile {
    udp_port: Option<u16>,
    bind_ip: Option<Ipv4Addr>,
    advertised_ip: Option<Ipv4Addr>,
    ultrapeer: Option<bool>,
    locale: Option<String>,
    client_guid: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SecurityFile {
    query_key_secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RouterFile {
    max_leaves: Option<usize>,
    max_ultrapeers: Option<usize>,
    max_leaf_ultrapeers: Option<usize>,
    max_routed_results: Option<u64>,
    connect_back_redirects: Option<usize>,
    query_key_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RoutesFile {
    ping_window_secs: Option<u64>,
    query_window_secs: Option<u64>,
    push_window_secs: Option<u64>,
    max_routes: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct DynamicQueryFile {
    max_query_ttl: Option<u8>,
    ultrapeer_results: Option<u32>,
    max_query_time_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PongCacheFile {
    expiry_ms: Option<u64>,
    hop_buckets: Option<u8>,
}

#[derive(Debug, Default, Deserialize)]
struct ContentFile {
    shared_files: Option<Vec<String>>,
    host_cache_size: Option<usize>,
}

// =============================================================================
// LOADING
// =============================================================================

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let mut config = Self::default();

        let net = file.network;
        let defaults = NetworkConfig::default();
        config.network = NetworkConfig {
            udp_port: net.udp_port.unwrap_or(defaults.udp_port),
            bind_ip: net.bind_ip.unwrap_or(defaults.bind_ip),
            advertised_ip: net.advertised_ip.unwrap_or(defaults.advertised_ip),
            ultrapeer: net.ultrapeer.unwrap_or(defaults.ultrapeer),
            locale: net.locale.unwrap_or(defaults.locale),
            client_guid: net
                .client_guid
                .map(|hex| {
                    Guid::from_hex(&hex).map_err(|e| ConfigError::InvalidValue {
                        key: "network.client_guid",
                        reason: e.to_string(),
                    })
                })
                .transpose()?,
        };

        if let Some(secret) = file.security.query_key_secret {
            config.security.query_key_secret = parse_secret(&secret)?;
        }

        let r = file.router;
        let router = &mut config.router;
        router.max_leaves = r.max_leaves.unwrap_or(router.max_leaves);
        router.max_ultrapeers = r.max_ultrapeers.unwrap_or(router.max_ultrapeers);
        router.max_leaf_ultrapeers = r.max_leaf_ultrapeers.unwrap_or(router.max_leaf_ultrapeers);
        router.max_routed_results = r.max_routed_results.unwrap_or(router.max_routed_results);
        router.connect_back_redirects = r
            .connect_back_redirects
            .unwrap_or(router.connect_back_redirects);
        router.query_key_delay_ms = r.query_key_delay_ms.unwrap_or(router.query_key_delay_ms);

        let rt = file.routes;
        let max_routes = rt.max_routes;
        let window = |secs: Option<u64>, base: &RouteTableConfig| {
            RouteTableConfig::new(
                secs.map_or(base.window_ms, |s| s.saturating_mul(1000)),
                max_routes.unwrap_or(base.max_size),
            )
        };
        config.routes = RouteTableSet {
            ping: window(rt.ping_window_secs, &config.routes.ping),
            query: window(rt.query_window_secs, &config.routes.query),
            push: window(rt.push_window_secs, &config.routes.push),
        };

        let dq = file.dynamic_query;
        let dynamic = &mut config.dynamic_query;
        if let Some(ttl) = dq.max_query_ttl {
            if ttl == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "dynamic_query.max_query_ttl",
                    reason: "must be at least 1".to_string(),
                });
            }
            dynamic.max_query_ttl = ttl;
        }
        dynamic.ultrapeer_results = dq.ultrapeer_results.unwrap_or(dynamic.ultrapeer_results);
        if let Some(secs) = dq.max_query_time_secs {
            dynamic.max_query_time_ms = secs.saturating_mul(1000);
        }

        let pc = file.pong_cache;
        config.pong_cache.expiry_ms = pc.expiry_ms.unwrap_or(config.pong_cache.expiry_ms);
        config.pong_cache.hop_buckets = pc.hop_buckets.unwrap_or(config.pong_cache.hop_buckets);

        let content = file.content;
        config.content.shared_files = content.shared_files.unwrap_or_default();
        config.content.host_cache_size = content
            .host_cache_size
            .unwrap_or(config.content.host_cache_size)
            .max(1);

        Ok(config)
    }

    /// Load from `GN_CONFIG` if set, then apply environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("GN_CONFIG") {
            Ok(path) => Self::load(path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `GN_UDP_PORT`, `GN_ULTRAPEER` and `GN_QUERY_KEY_SECRET` as
    /// returned by `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("GN_UDP_PORT") {
            self.network.udp_port = port.parse().map_err(|_| ConfigError::InvalidValue {
                key: "GN_UDP_PORT",
                reason: format!("{port:?} is not a port"),
            })?;
        }
        if let Some(flag) = lookup("GN_ULTRAPEER") {
            self.network.ultrapeer = matches!(
                flag.to_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        if let Some(secret) = lookup("GN_QUERY_KEY_SECRET") {
            self.security.query_key_secret = parse_secret(&secret)?;
        }
        Ok(())
    }

    /// Router configuration with our identity filled in.
    pub fn router_config(&self) -> RouterConfig {
        let mut router = self.router.clone();
        router.local.ip = self.network.advertised_ip;
        router.local.port = self.network.udp_port;
        router.local.locale = self.network.locale.clone();
        if let Some(guid) = self.network.client_guid {
            router.local.client_guid = guid;
        }
        router
    }

    /// Pong cache configuration keyed to our locale.
    pub fn pong_cache_config(&self) -> PongCacheConfig {
        PongCacheConfig {
            default_locale: self.network.locale.clone(),
            ..self.pong_cache.clone()
        }
    }
}

fn parse_secret(value: &str) -> Result<[u8; SECRET_LEN], ConfigError> {
    let bytes = hex::decode(value.trim()).map_err(|_| ConfigError::InvalidSecret)?;
    bytes.try_into().map_err(|_| ConfigError::InvalidSecret)
}
