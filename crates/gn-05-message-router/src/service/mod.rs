//! # Message Router Service
//!
//! Routes every Gnutella message the node sees. Requests (pings, queries)
//! are answered and forwarded; replies (pongs, query hits, pushes) travel
//! back along the route tables.
//!
//! The service is split by message family:
//! - [`ping`]: pings and pongs
//! - [`query`]: queries, dynamic queries and our own searches
//! - [`reply`]: query replies and pushes
//! - [`vendor`]: vendor messages, connect-back redirects and push proxying
//! - [`qrp`]: query route table exchange
//! - [`udp`]: unicast and multicast datagrams

mod ping;
mod qrp;
mod query;
mod reply;
mod udp;
mod vendor;


use crate::domain::{
    ConnectBackRecords, ConnectionRegistry, ListenerRegistry, LocalReplyHandler,
    ManagedConnection, MessageListener, RouterConfig, UdpHandlerCache,
};
use crate::error::RouterError;
use crate::metrics::RouterMetrics;
use crate::network::RouterNetwork;
use crate::ports::{
    ConnectBackDialer, DatagramSender, HostCatcher, LocalResponder, LocalSearchSink,
    MessageRouterApi, QueryKeyValidator,
};
use gn_01_route_table::{RouteTable, RouteTableConfig};
use gn_03_pong_cache::{PongCacheConfig, PongCacher};
use gn_04_dynamic_query::{DynamicQueryApi, DynamicQueryConfig, QueryDispatcher, QueryState};
use parking_lot::Mutex;
use shared_types::{Guid, HandlerId, Message, Payload, ReplyHandler, TimeSource};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, trace};

/// Adapters the router drives.
#[derive(Clone)]
pub struct RouterPorts {
    pub responder: Arc<dyn LocalResponder>,
    pub host_catcher: Arc<dyn HostCatcher>,
    pub search_sink: Arc<dyn LocalSearchSink>,
    pub datagrams: Arc<dyn DatagramSender>,
    pub dialer: Arc<dyn ConnectBackDialer>,
    pub query_keys: Arc<dyn QueryKeyValidator>,
}

/// Route table windows, one per reply kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteTableSet {
    pub ping: RouteTableConfig,
    pub query: RouteTableConfig,
    pub push: RouteTableConfig,
}

impl Default for RouteTableSet {
    fn default() -> Self {
        Self {
            ping: RouteTableConfig::ping(),
            query: RouteTableConfig::query(),
            push: RouteTableConfig::push(),
        }
    }
}

/// The message router.
///
/// ## Thread Safety
///
/// Every method takes `&self`; the router is shared as `Arc<MessageRouter>`
/// between connection readers, the UDP loop and the scheduler.
pub struct MessageRouter {
    config: RouterConfig,
    clock: Arc<dyn TimeSource>,
    registry: Arc<ConnectionRegistry>,
    network: Arc<RouterNetwork>,
    dispatcher: Arc<dyn DynamicQueryApi>,
    pong_cacher: Arc<PongCacher>,
    ping_routes: RouteTable,
    query_routes: RouteTable,
    push_routes: RouteTable,
    listeners: ListenerRegistry,
    connect_backs: ConnectBackRecords,
    udp_handlers: UdpHandlerCache,
    local: Arc<LocalReplyHandler>,
    ports: RouterPorts,
    metrics: Arc<RouterMetrics>,
    last_query_key_ms: Mutex<Option<u64>>,
}

impl MessageRouter {
    pub fn new(
        config: RouterConfig,
        routes: RouteTableSet,
        clock: Arc<dyn TimeSource>,
        network: Arc<RouterNetwork>,
        dispatcher: Arc<dyn DynamicQueryApi>,
        pong_cacher: Arc<PongCacher>,
        ports: RouterPorts,
    ) -> Self {
        Self {
            registry: network.registry().clone(),
            ping_routes: RouteTable::new("ping", routes.ping, clock.clone()),
            query_routes: RouteTable::new("query", routes.query, clock.clone()),
            push_routes: RouteTable::new("push", routes.push, clock.clone()),
            listeners: ListenerRegistry::new(),
            connect_backs: ConnectBackRecords::new(config.connect_back_memory),
            udp_handlers: UdpHandlerCache::new(ports.datagrams.clone()),
            local: Arc::new(LocalReplyHandler::new(ports.search_sink.clone())),
            metrics: Arc::new(RouterMetrics::new()),
            last_query_key_ms: Mutex::new(None),
            config,
            clock,
            network,
            dispatcher,
            pong_cacher,
            ports,
        }
    }

    /// Wire a router with its registry, dispatcher and pong cache.
    pub fn assemble(
        config: RouterConfig,
        routes: RouteTableSet,
        query_config: DynamicQueryConfig,
        pong_config: PongCacheConfig,
        ultrapeer: bool,
        clock: Arc<dyn TimeSource>,
        ports: RouterPorts,
    ) -> Arc<Self> {
        let registry = Arc::new(ConnectionRegistry::new(
            ultrapeer,
            config.max_leaves,
            config.max_ultrapeers,
            config.max_leaf_ultrapeers,
        ));
        let network = Arc::new(RouterNetwork::new(registry.clone(), &config));
        let dispatcher = Arc::new(QueryDispatcher::new(
            query_config,
            clock.clone(),
            network.clone(),
        ));
        let pong_cacher = Arc::new(PongCacher::new(pong_config, clock.clone(), registry));
        Arc::new(Self::new(
            config,
            routes,
            clock,
            network,
            dispatcher,
            pong_cacher,
            ports,
        ))
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn network(&self) -> &Arc<RouterNetwork> {
        &self.network
    }

    pub fn dispatcher(&self) -> &Arc<dyn DynamicQueryApi> {
        &self.dispatcher
    }

    pub fn pong_cacher(&self) -> &Arc<PongCacher> {
        &self.pong_cacher
    }

    pub fn metrics(&self) -> &Arc<RouterMetrics> {
        &self.metrics
    }

    pub fn ping_routes(&self) -> &RouteTable {
        &self.ping_routes
    }

    pub fn query_routes(&self) -> &RouteTable {
        &self.query_routes
    }

    pub fn push_routes(&self) -> &RouteTable {
        &self.push_routes
    }

    /// The handler standing for this node.
    pub fn local_handler(&self) -> Arc<dyn ReplyHandler> {
        self.local.clone()
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    // -------------------------------------------------------------------------
    // Maintenance, driven by the scheduler
    // -------------------------------------------------------------------------

    /// Run due generation swaps on every route table.
    pub fn purge_routes(&self) {
        self.ping_routes.purge();
        self.query_routes.purge();
        self.push_routes.purge();
    }

    /// Let every address ask for a connect-back again.
    pub fn expire_connect_backs(&self) {
        self.connect_backs.clear();
    }

    pub fn clean_udp_handlers(&self) -> usize {
        self.udp_handlers
            .clean(self.clock.now_ms(), self.config.udp_handler_idle_ms)
    }

    // -------------------------------------------------------------------------
    // TCP dispatch
    // -------------------------------------------------------------------------

    fn route_tcp(
        &self,
        message: &Message,
        connection: &Arc<ManagedConnection>,
    ) -> Result<(), RouterError> {
        RouterMetrics::incr(&self.metrics.messages_received);
        let msg = message.hopped();
        let handler: Arc<dyn ReplyHandler> = connection.clone();
        trace!(
            "[gn-05] {} {} from {} (ttl {}, hops {})",
            msg.kind().as_str(),
            msg.guid(),
            connection.socket_addr(),
            msg.ttl(),
            msg.hops()
        );

        match msg.payload() {
            Payload::Ping(_) => self.handle_ping_request(&msg, connection),
            Payload::Pong(_) => {
                // A pong someone is listening for goes to the listeners only.
                if self.listeners.notify(&msg, connection.as_ref()) == 0 {
                    self.handle_ping_reply(&msg, &handler);
                }
                return Ok(());
            }
            Payload::Query(_) => self.handle_query_possible_duplicate(&msg, &handler)?,
            Payload::QueryReply(_) => self.handle_query_reply(&msg, &handler),
            Payload::Push(_) => self.handle_push_request(&msg, &handler),
            Payload::Vendor(vendor) => self.handle_vendor_message(&msg, vendor, connection),
            Payload::RouteTable(update) => self.handle_route_table_update(update, connection),
        }
        self.listeners.notify(&msg, connection.as_ref());
        Ok(())
    }
}

impl MessageRouterApi for MessageRouter {
    fn handle_message(
        &self,
        message: &Message,
        connection: &Arc<ManagedConnection>,
    ) -> Result<(), RouterError> {
        self.route_tcp(message, connection)
    }

    fn handle_udp_message(&self, message: &Message, addr: SocketAddr) -> Result<(), RouterError> {
        self.route_udp(message, addr)
    }

    fn handle_multicast_message(
        &self,
        message: &Message,
        addr: SocketAddr,
    ) -> Result<(), RouterError> {
        self.route_multicast(message, addr)
    }

    fn originate_query_guid(&self, guid: Guid) {
        self.query_routes.route_reply(guid, self.local_handler());
    }

    fn send_dynamic_query(&self, query: &Message) -> Result<(), RouterError> {
        self.start_local_query(query)
    }

    fn send_query_request(&self, query: &Message, connection: &Arc<ManagedConnection>) -> bool {
        self.query_routes.route_reply(query.guid(), self.local_handler());
        connection.send(query.clone())
    }

    fn send_ping_request(&self, ping: &Message, connection: &Arc<ManagedConnection>) -> bool {
        self.ping_routes.route_reply(ping.guid(), self.local_handler());
        connection.send(ping.clone())
    }

    fn broadcast_ping_request(&self, ping: &Message) -> usize {
        self.ping_routes.route_reply(ping.guid(), self.local_handler());
        self.broadcast_ping(ping, None)
    }

    fn send_query_reply(&self, reply: &Message) -> Result<(), RouterError> {
        self.route_local_reply(reply)
    }

    fn send_push_request(&self, push: &Message) -> Result<(), RouterError> {
        self.route_local_push(push)
    }

    fn query_status(&self, guid: &Guid) -> Option<QueryState> {
        self.dispatcher.query_state(guid)
    }

    fn stop_query(&self, guid: &Guid) -> bool {
        self.dispatcher.stop_query(guid)
    }

    fn register_listener(&self, guid: Guid, listener: Arc<dyn MessageListener>) {
        self.listeners.register(guid, listener);
    }

    fn unregister_listener(&self, guid: &Guid, listener: &Arc<dyn MessageListener>) -> bool {
        self.listeners.unregister(guid, listener)
    }

    fn remove_connection(&self, id: HandlerId) -> Option<Arc<ManagedConnection>> {
        let removed = self.registry.remove(id);
        let routes = self.ping_routes.remove_reply_handler(id)
            + self.query_routes.remove_reply_handler(id)
            + self.push_routes.remove_reply_handler(id);
        self.dispatcher.remove_reply_handler(id);
        if removed.as_ref().is_some_and(|c| c.is_leaf()) {
            self.rebuild_last_hop_table();
        }
        info!("[gn-05] Removed connection {} and {} routes", id, routes);
        removed
    }

    fn forward_query_route_tables(&self, now_ms: u64) -> usize {
        self.propagate_route_tables(now_ms)
    }
}

impl std::fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRouter")
            .field("registry", &self.registry)
            .field("ping_routes", &self.ping_routes.len())
            .field("query_routes", &self.query_routes.len())
            .field("push_routes", &self.push_routes.len())
            .field("listeners", &self.listeners)
            .finish()
    }
}
