//! # Simulated Overlay
//!
//! Routing nodes wired together in one process. Every node is a full
//! [`NodeContainer`] with the production adapters; TCP links are pairs of
//! [`ManagedConnection`]s whose queues [`Overlay::pump`] shuttles into the
//! other side's router. All nodes share one [`ManualTimeSource`].
//!
//! ```text
//!   node a                                 node b
//!   registry ── conn(a→b) ──queue──┐   ┌── conn(b→a) ── registry
//!                                  └─pump─→ router_b.handle_message(msg, conn(b→a))
//! ```
//!
//! Node `n` listens on `24.0.0.(n+1):6346`. Datagrams a node sends stay in
//! its outbox until a test takes them with [`Overlay::take_datagrams`].

use gn_05_message_router::{
    Capabilities, ConnectionRole, ManagedConnection, MessageRouter, MessageRouterApi,
    RouterConfig, RouterError,
};
use node_runtime::adapters::Datagram;
use node_runtime::{NodeConfig, NodeContainer};
use shared_types::{decode, Guid, ManualTimeSource, Message};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

/// Start of simulated time.
pub const START_MS: u64 = 1_000_000;

/// Rounds after which [`Overlay::pump`] gives up on reaching quiescence.
const MAX_PUMP_ROUNDS: usize = 64;

pub type NodeId = usize;

pub struct OverlayNode {
    pub name: &'static str,
    pub ip: Ipv4Addr,
    pub addr: SocketAddr,
    pub container: NodeContainer,
    outbox: mpsc::Receiver<Datagram>,
}

/// One direction of a TCP link.
struct HalfLink {
    from: NodeId,
    to: NodeId,
    /// `from`'s connection towards `to`; messages sent on it land in `queue`.
    outgoing: Arc<ManagedConnection>,
    queue: mpsc::Receiver<Message>,
    /// `to`'s connection towards `from`; deliveries arrive on it.
    incoming: Arc<ManagedConnection>,
}

/// A message one node received from another.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub from: NodeId,
    pub to: NodeId,
    pub message: Message,
}

pub struct Overlay {
    clock: Arc<ManualTimeSource>,
    nodes: Vec<OverlayNode>,
    links: Vec<HalfLink>,
    log: Vec<Delivery>,
    failures: Vec<(NodeId, RouterError)>,
}

impl Overlay {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(ManualTimeSource::new(START_MS)),
            nodes: Vec::new(),
            links: Vec::new(),
            log: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn clock(&self) -> &Arc<ManualTimeSource> {
        &self.clock
    }

    /// Add a node sharing `files`. Must run inside a tokio runtime.
    pub fn add_node(&mut self, name: &'static str, ultrapeer: bool, files: &[&str]) -> NodeId {
        self.add_configured(name, ultrapeer, files, |_| {})
    }

    /// Add a node after letting `tweak` adjust its configuration.
    pub fn add_configured(
        &mut self,
        name: &'static str,
        ultrapeer: bool,
        files: &[&str],
        tweak: impl FnOnce(&mut NodeConfig),
    ) -> NodeId {
        let id = self.nodes.len();
        let host = u8::try_from(id + 1).unwrap_or(u8::MAX);
        let ip = Ipv4Addr::new(24, 0, 0, host);

        let mut config = NodeConfig::default();
        config.router = RouterConfig::for_testing();
        config.network.advertised_ip = ip;
        config.network.ultrapeer = ultrapeer;
        config.network.client_guid = Some(Guid::new_random());
        config.security.query_key_secret = [host; 32];
        config.content.shared_files = files.iter().map(|f| f.to_string()).collect();
        tweak(&mut config);

        let addr = SocketAddr::from((ip, config.network.udp_port));
        let (container, outbox) =
            NodeContainer::with_clock(config, Handle::current(), self.clock.clone());
        self.nodes.push(OverlayNode {
            name,
            ip,
            addr,
            container,
            outbox,
        });
        id
    }

    pub fn node(&self, id: NodeId) -> &OverlayNode {
        &self.nodes[id]
    }

    pub fn router(&self, id: NodeId) -> &Arc<MessageRouter> {
        &self.nodes[id].container.router
    }

    /// Open a TCP link between two nodes. Two leaves cannot be linked.
    pub fn connect(&mut self, a: NodeId, b: NodeId) {
        let a_up = self.nodes[a].container.config.network.ultrapeer;
        let b_up = self.nodes[b].container.config.network.ultrapeer;
        let (a_role, b_role) = match (a_up, b_up) {
            (true, true) => (ConnectionRole::Ultrapeer, ConnectionRole::Ultrapeer),
            (true, false) => (ConnectionRole::Leaf, ConnectionRole::ClientOfUltrapeer),
            (false, true) => (ConnectionRole::ClientOfUltrapeer, ConnectionRole::Leaf),
            (false, false) => panic!(
                "cannot link leaves {} and {}",
                self.nodes[a].name, self.nodes[b].name
            ),
        };

        let (a_conn, a_queue) = self.open(a, b, a_role);
        let (b_conn, b_queue) = self.open(b, a, b_role);
        self.links.push(HalfLink {
            from: a,
            to: b,
            outgoing: a_conn.clone(),
            queue: a_queue,
            incoming: b_conn.clone(),
        });
        self.links.push(HalfLink {
            from: b,
            to: a,
            outgoing: b_conn,
            queue: b_queue,
            incoming: a_conn,
        });
    }

    fn open(
        &self,
        local: NodeId,
        remote: NodeId,
        role: ConnectionRole,
    ) -> (Arc<ManagedConnection>, mpsc::Receiver<Message>) {
        let router = self.router(local);
        let (conn, queue) = ManagedConnection::with_queue(
            self.nodes[remote].addr,
            role,
            Capabilities::modern(),
            self.clock.clone(),
            router.config().timings.clone(),
        );
        router.registry().add(conn.clone());
        (conn, queue)
    }

    /// `from`'s connection towards `to`.
    pub fn connection(&self, from: NodeId, to: NodeId) -> Option<Arc<ManagedConnection>> {
        self.links
            .iter()
            .find(|l| l.from == from && l.to == to)
            .map(|l| l.outgoing.clone())
    }

    /// Queue `message` on the link from `from` to `to`, as if `from` wrote it.
    pub fn inject(&self, from: NodeId, to: NodeId, message: Message) -> bool {
        self.connection(from, to)
            .is_some_and(|conn| conn.send(message))
    }

    /// Deliver queued messages until no link has any left.
    ///
    /// Returns how many messages were delivered. Messages a router refused
    /// are kept in [`failures`](Self::failures).
    pub fn pump(&mut self) -> usize {
        let mut delivered = 0;
        for _ in 0..MAX_PUMP_ROUNDS {
            let mut progress = false;
            for link in self.links.iter_mut() {
                while let Ok(message) = link.queue.try_recv() {
                    let handled = self.nodes[link.to]
                        .container
                        .router
                        .handle_message(&message, &link.incoming);
                    if let Err(e) = handled {
                        self.failures.push((link.to, e));
                    }
                    self.log.push(Delivery {
                        from: link.from,
                        to: link.to,
                        message,
                    });
                    delivered += 1;
                    progress = true;
                }
            }
            if !progress {
                break;
            }
        }
        delivered
    }

    /// Router errors raised while pumping, with the node that raised them.
    pub fn failures(&self) -> &[(NodeId, RouterError)] {
        &self.failures
    }

    /// Everything delivered since the last [`clear_log`](Self::clear_log).
    pub fn deliveries(&self) -> &[Delivery] {
        &self.log
    }

    /// Deliveries carrying `guid` that `to` received.
    pub fn received(&self, to: NodeId, guid: Guid) -> Vec<&Delivery> {
        self.log
            .iter()
            .filter(|d| d.to == to && d.message.guid() == guid)
            .collect()
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// Let every link opened so far count as stable.
    pub fn settle(&self) {
        let stable_after = self
            .nodes
            .first()
            .map(|n| n.container.router.config().timings.stable_after_ms)
            .unwrap_or_default();
        self.clock.advance(stable_after + 1_000);
    }

    /// Datagrams `id` has queued for its socket, decoded.
    pub fn take_datagrams(&mut self, id: NodeId) -> Vec<(Message, SocketAddr)> {
        let outbox = &mut self.nodes[id].outbox;
        let mut out = Vec::new();
        while let Ok(datagram) = outbox.try_recv() {
            if let Ok(message) = decode(&datagram.bytes) {
                out.push((message, datagram.to));
            }
        }
        out
    }
}

impl Default for Overlay {
    fn default() -> Self {
        Self::new()
    }
}
