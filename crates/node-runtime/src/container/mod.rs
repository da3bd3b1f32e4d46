//! # Node Container
//!
//! Builds the message router and the adapters behind its ports from one
//! [`NodeConfig`].
//!
//! ```text
//!                      ┌──────────────────────────┐
//!   UdpOutbox ←────────┤                          │
//!   LruHostCatcher ←───┤      MessageRouter       ├───→ QueryDispatcher
//!   HashedQueryKeys ←──┤  (registry, routes,      ├───→ PongCacher
//!   TcpConnectBack ←───┤   listeners, network)    │
//!   SharedContent ←────┤                          │
//!   TallyingSink ←─────┤                          │
//!                      └──────────────────────────┘
//! ```

pub mod config;

pub use config::{ConfigError, NodeConfig};

use crate::adapters::{
    Datagram, HashedQueryKeys, LruHostCatcher, SharedContentResponder, TallyingSearchSink,
    TcpConnectBackDialer, UdpOutbox,
};
use gn_04_dynamic_query::DynamicQueryApi;
use gn_05_message_router::{ConnectionRole, MessageRouter, RouterPorts};
use gn_telemetry::NodeGauges;
use shared_types::{SystemTimeSource, TimeSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

/// Datagrams queued for the socket before sends are dropped.
pub const OUTBOX_CAPACITY: usize = 1_024;

/// Time allowed for one connect-back dial.
pub const CONNECT_BACK_TIMEOUT: Duration = Duration::from_secs(10);

/// The router and the adapters behind its ports.
pub struct NodeContainer {
    pub config: NodeConfig,
    pub router: Arc<MessageRouter>,
    pub outbox: Arc<UdpOutbox>,
    pub host_catcher: Arc<LruHostCatcher>,
    pub search_sink: Arc<TallyingSearchSink>,
}

impl NodeContainer {
    /// Wire the node on the wall clock.
    ///
    /// Returns the receiving end of the UDP outbox; the caller drains it
    /// into the socket.
    pub fn new(config: NodeConfig, runtime: Handle) -> (Self, mpsc::Receiver<Datagram>) {
        Self::with_clock(config, runtime, Arc::new(SystemTimeSource))
    }

    pub fn with_clock(
        config: NodeConfig,
        runtime: Handle,
        clock: Arc<dyn TimeSource>,
    ) -> (Self, mpsc::Receiver<Datagram>) {
        let router_config = config.router_config();
        let (outbox, outbox_rx) = UdpOutbox::new(OUTBOX_CAPACITY);
        let outbox = Arc::new(outbox);
        let host_catcher = Arc::new(LruHostCatcher::new(config.content.host_cache_size));
        let search_sink = Arc::new(TallyingSearchSink::new());

        let ports = RouterPorts {
            responder: Arc::new(SharedContentResponder::from_names(
                router_config.local.clone(),
                &config.content.shared_files,
            )),
            host_catcher: host_catcher.clone(),
            search_sink: search_sink.clone(),
            datagrams: outbox.clone(),
            dialer: Arc::new(TcpConnectBackDialer::new(runtime, CONNECT_BACK_TIMEOUT)),
            query_keys: Arc::new(HashedQueryKeys::new(config.security.query_key_secret)),
        };

        let router = MessageRouter::assemble(
            router_config,
            config.routes.clone(),
            config.dynamic_query.clone(),
            config.pong_cache_config(),
            config.network.ultrapeer,
            clock,
            ports,
        );

        (
            Self {
                config,
                router,
                outbox,
                host_catcher,
                search_sink,
            },
            outbox_rx,
        )
    }

    pub fn gauges(&self) -> NodeGauges {
        node_gauges(&self.router)
    }
}

/// Current sizes of the router's tables and connections.
pub fn node_gauges(router: &MessageRouter) -> NodeGauges {
    let mut gauges = NodeGauges {
        ping_routes: router.ping_routes().len(),
        query_routes: router.query_routes().len(),
        push_routes: router.push_routes().len(),
        active_queries: router.dispatcher().active_queries(),
        cached_pongs: router.pong_cacher().len(),
        ..NodeGauges::default()
    };
    for connection in router.registry().all() {
        match connection.role() {
            ConnectionRole::Leaf => gauges.leaves += 1,
            ConnectionRole::Ultrapeer => gauges.ultrapeers += 1,
            ConnectionRole::ClientOfUltrapeer => gauges.client_of_ultrapeers += 1,
        }
    }
    gauges
}
