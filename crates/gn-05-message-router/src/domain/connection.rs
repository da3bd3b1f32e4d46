//! A live connection to a remote host.

use super::capabilities::{Capabilities, ConnectionRole};
use super::config::ConnectionTimings;
use gn_02_query_routing::{QrpError, QueryRouteTable};
use gn_04_dynamic_query::UltrapeerLink;
use parking_lot::{Mutex, RwLock};
use shared_types::{
    Guid, HandlerId, HandlerKind, Message, ReplyHandler, RouteTableMessage, SupportedMessage,
    TimeSource,
};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Hops-flow value meaning the remote never sent one.
const NO_HOPS_FLOW: u8 = u8::MAX;

/// Query route tables exchanged over one connection.
#[derive(Default)]
struct QrpState {
    /// What the remote told us, built up from its reset and patches.
    received: Option<QueryRouteTable>,
    /// What we last sent the remote.
    sent: Option<QueryRouteTable>,
    next_forward_ms: u64,
}

/// Counters for one connection.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    pub sent: AtomicU64,
    /// Sends that failed because the queue was full or closed.
    pub send_drops: AtomicU64,
    /// Messages from the remote we could not route.
    pub route_drops: AtomicU64,
}

/// A connection to a remote host, as the router sees it.
///
/// Outbound messages go onto a bounded queue drained by the transport task.
/// A full or closed queue drops that one message.
pub struct ManagedConnection {
    id: HandlerId,
    address: SocketAddr,
    role: ConnectionRole,
    connected_at_ms: u64,
    timings: ConnectionTimings,
    clock: Arc<dyn TimeSource>,
    outbound: mpsc::Sender<Message>,
    open: AtomicBool,
    capabilities: RwLock<Capabilities>,
    stats: ConnectionStats,
    /// Client GUID of the leaf we are push proxy for.
    push_proxy_for: Mutex<Option<Guid>>,
    hops_flow: AtomicU8,
    qrp: Mutex<QrpState>,
    next_ping_ms: AtomicU64,
    next_pong_ms: AtomicU64,
}

impl ManagedConnection {
    pub fn new(
        address: SocketAddr,
        role: ConnectionRole,
        capabilities: Capabilities,
        outbound: mpsc::Sender<Message>,
        clock: Arc<dyn TimeSource>,
        timings: ConnectionTimings,
    ) -> Self {
        let now = clock.now_ms();
        Self {
            id: HandlerId::next(),
            address,
            role,
            connected_at_ms: now,
            timings,
            clock,
            outbound,
            open: AtomicBool::new(true),
            capabilities: RwLock::new(capabilities),
            stats: ConnectionStats::default(),
            push_proxy_for: Mutex::new(None),
            hops_flow: AtomicU8::new(NO_HOPS_FLOW),
            qrp: Mutex::new(QrpState::default()),
            next_ping_ms: AtomicU64::new(0),
            next_pong_ms: AtomicU64::new(0),
        }
    }

    /// A connection plus the receiving end of its queue.
    pub fn with_queue(
        address: SocketAddr,
        role: ConnectionRole,
        capabilities: Capabilities,
        clock: Arc<dyn TimeSource>,
        timings: ConnectionTimings,
    ) -> (Arc<Self>, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(timings.send_queue_len.max(1));
        let conn = Self::new(address, role, capabilities, tx, clock, timings);
        (Arc::new(conn), rx)
    }

    pub fn id(&self) -> HandlerId {
        self.id
    }

    pub fn role(&self) -> ConnectionRole {
        self.role
    }

    pub fn socket_addr(&self) -> SocketAddr {
        self.address
    }

    pub fn connected_at_ms(&self) -> u64 {
        self.connected_at_ms
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities.read().clone()
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    /// Queue a message. False when the queue is full or closed.
    pub fn send(&self, message: Message) -> bool {
        if !self.is_open() {
            self.stats.send_drops.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        match self.outbound.try_send(message) {
            Ok(()) => {
                self.stats.sent.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                self.stats.send_drops.fetch_add(1, Ordering::Relaxed);
                trace!("[gn-05] Send to {} dropped: {}", self.address, e);
                false
            }
        }
    }

    /// Stop accepting messages.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            debug!("[gn-05] Connection {} to {} closed", self.id, self.address);
        }
    }

    pub fn update_supported(&self, supported: &[SupportedMessage]) {
        self.capabilities.write().apply_supported(supported);
    }

    // -------------------------------------------------------------------------
    // Flow control
    // -------------------------------------------------------------------------

    pub fn set_hops_flow(&self, hops: u8) {
        self.hops_flow.store(hops, Ordering::Release);
    }

    /// Hops limit the remote asked for, if any.
    pub fn hops_flow(&self) -> Option<u8> {
        match self.hops_flow.load(Ordering::Acquire) {
            NO_HOPS_FLOW => None,
            hops => Some(hops),
        }
    }

    /// A leaf with no upload slots left. Its table is left out of ours.
    pub fn is_busy_leaf(&self) -> bool {
        self.role == ConnectionRole::Leaf && self.hops_flow() == Some(0)
    }

    fn throttle(next: &AtomicU64, now: u64, gap: u64) -> bool {
        let due = next.load(Ordering::Acquire);
        if now < due {
            return false;
        }
        next.compare_exchange(due, now + gap, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// At most one ping answered per throttle window.
    pub fn allow_new_pings(&self) -> bool {
        Self::throttle(
            &self.next_ping_ms,
            self.clock.now_ms(),
            self.timings.ping_throttle_ms,
        )
    }

    /// At most one forwarded pong per throttle window.
    pub fn allow_new_pongs(&self) -> bool {
        Self::throttle(
            &self.next_pong_ms,
            self.clock.now_ms(),
            self.timings.pong_throttle_ms,
        )
    }

    // -------------------------------------------------------------------------
    // Push proxy
    // -------------------------------------------------------------------------

    pub fn set_push_proxy_for(&self, client_guid: Guid) {
        *self.push_proxy_for.lock() = Some(client_guid);
    }

    pub fn is_push_proxy_for(&self, client_guid: &Guid) -> bool {
        self.push_proxy_for.lock().as_ref() == Some(client_guid)
    }

    // -------------------------------------------------------------------------
    // Query routing
    // -------------------------------------------------------------------------

    /// Feed a reset or patch from the remote into its table.
    ///
    /// A patch before any reset applies to a default-sized table. On error
    /// the table is discarded until the next reset.
    pub fn apply_route_table(&self, message: &RouteTableMessage) -> Result<(), QrpError> {
        let mut qrp = self.qrp.lock();
        let result = qrp
            .received
            .get_or_insert_with(QueryRouteTable::new)
            .apply(message);
        if result.is_err() {
            qrp.received = None;
        }
        result
    }

    /// A copy of the table the remote sent us.
    pub fn received_table(&self) -> Option<QueryRouteTable> {
        self.qrp.lock().received.clone()
    }

    pub fn has_received_table(&self) -> bool {
        self.qrp.lock().received.is_some()
    }

    /// The remote's table admits `query`. False without a table.
    pub fn hits_route_table(&self, query: &Message) -> bool {
        let Some(request) = query.as_query() else {
            return false;
        };
        self.qrp
            .lock()
            .received
            .as_ref()
            .is_some_and(|table| table.contains(request))
    }

    pub fn sent_table(&self) -> Option<QueryRouteTable> {
        self.qrp.lock().sent.clone()
    }

    pub fn record_sent_table(&self, table: QueryRouteTable) {
        self.qrp.lock().sent = Some(table);
    }

    /// The remote may hold a partial table; the next update starts over
    /// with a reset.
    pub fn forget_sent_table(&self) {
        self.qrp.lock().sent = None;
    }

    /// Time for another route table update to this remote.
    pub fn qrp_update_due(&self, now_ms: u64) -> bool {
        now_ms >= self.qrp.lock().next_forward_ms
    }

    /// Schedule the next route table update.
    pub fn advance_qrp_forward_time(&self, now_ms: u64) {
        let interval = match self.role {
            ConnectionRole::ClientOfUltrapeer => self.timings.leaf_qrp_interval_ms,
            _ => self.timings.ultrapeer_qrp_interval_ms,
        };
        self.qrp.lock().next_forward_ms = now_ms + interval;
    }
}

impl ReplyHandler for ManagedConnection {
    fn id(&self) -> HandlerId {
        self.id
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Connection
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.outbound.is_closed()
    }

    fn address(&self) -> Option<SocketAddr> {
        Some(self.address)
    }

    fn locale_pref(&self) -> String {
        self.capabilities.read().locale.clone()
    }

    fn is_leaf(&self) -> bool {
        self.role == ConnectionRole::Leaf
    }

    fn is_ultrapeer(&self) -> bool {
        self.role.remote_is_ultrapeer()
    }

    fn is_good_leaf(&self) -> bool {
        self.is_leaf() && self.capabilities.read().leaf_guidance
    }

    fn is_good_ultrapeer(&self) -> bool {
        let caps = self.capabilities.read();
        self.role == ConnectionRole::Ultrapeer && caps.query_routing && caps.is_high_degree()
    }

    fn handle_ping_reply(&self, pong: &Message, _source: Option<&dyn ReplyHandler>) {
        self.send(pong.clone());
    }

    fn handle_query_reply(&self, reply: &Message, _source: Option<&dyn ReplyHandler>) {
        self.send(reply.clone());
    }

    fn handle_push_request(&self, push: &Message, _source: Option<&dyn ReplyHandler>) {
        self.send(push.clone());
    }

    fn count_dropped_message(&self) {
        self.stats.route_drops.fetch_add(1, Ordering::Relaxed);
    }
}

impl UltrapeerLink for ManagedConnection {
    fn id(&self) -> HandlerId {
        self.id
    }

    fn is_stable(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.connected_at_ms) > self.timings.stable_after_ms
    }

    fn is_query_routing(&self) -> bool {
        self.capabilities.read().query_routing
    }

    fn should_forward_query(&self, query: &Message) -> bool {
        if !self.is_query_routing() {
            return true;
        }
        self.hits_route_table(query)
    }

    fn degree(&self) -> u32 {
        self.capabilities.read().degree
    }

    fn max_ttl(&self) -> u8 {
        self.capabilities.read().max_ttl
    }

    fn supports_probe_queries(&self) -> bool {
        self.capabilities.read().probe_queries
    }

    fn locale(&self) -> String {
        self.capabilities.read().locale.clone()
    }

    fn send_query(&self, query: Message) -> bool {
        self.send(query)
    }
}

impl fmt::Debug for ManagedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedConnection")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("role", &self.role)
            .field("open", &self.open.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{ManualTimeSource, Payload, PingRequest, QueryRequest};

    type Fixture = (
        Arc<ManagedConnection>,
        mpsc::Receiver<Message>,
        Arc<ManualTimeSource>,
    );

    fn conn(role: ConnectionRole, queue: usize) -> Fixture {
        let clock = Arc::new(ManualTimeSource::new(10_000));
        let timings = ConnectionTimings {
            send_queue_len: queue,
            ..ConnectionTimings::default()
        };
        let (c, rx) = ManagedConnection::with_queue(
            "1.2.3.4:6346".parse().unwrap(),
            role,
            Capabilities::modern(),
            clock.clone(),
            timings,
        );
        (c, rx, clock)
    }

    fn ping() -> Message {
        Message::originate(Guid::new_random(), 1, Payload::Ping(PingRequest::new()))
    }

    fn query(text: &str) -> Message {
        Message::originate(Guid::new_random(), 3, Payload::Query(QueryRequest::new(text)))
    }

    #[test]
    fn test_full_queue_drops_single_send() {
        let (c, mut rx, _) = conn(ConnectionRole::Ultrapeer, 1);
        assert!(c.send(ping()));
        assert!(!c.send(ping()));
        assert_eq!(c.stats().send_drops.load(Ordering::Relaxed), 1);
        assert!(rx.try_recv().is_ok());
        assert!(c.send(ping()));
    }

    #[test]
    fn test_closed_receiver_closes_connection() {
        let (c, rx, _) = conn(ConnectionRole::Ultrapeer, 4);
        drop(rx);
        assert!(!c.is_open());
        assert!(!c.send(ping()));
    }

    #[test]
    fn test_ping_throttle() {
        let (c, _rx, clock) = conn(ConnectionRole::Ultrapeer, 4);
        assert!(c.allow_new_pings());
        assert!(!c.allow_new_pings());
        clock.advance(2_500);
        assert!(c.allow_new_pings());
    }

    #[test]
    fn test_pong_throttle() {
        let (c, _rx, clock) = conn(ConnectionRole::Leaf, 4);
        assert!(c.allow_new_pongs());
        clock.advance(11_999);
        assert!(!c.allow_new_pongs());
        clock.advance(1);
        assert!(c.allow_new_pongs());
    }

    #[test]
    fn test_stability() {
        let (c, _rx, clock) = conn(ConnectionRole::Ultrapeer, 4);
        assert!(!c.is_stable(clock.now_ms()));
        assert!(c.is_stable(clock.now_ms() + 5_001));
    }

    #[test]
    fn test_busy_leaf_from_hops_flow() {
        let (leaf, _rx, _) = conn(ConnectionRole::Leaf, 4);
        assert!(!leaf.is_busy_leaf());
        leaf.set_hops_flow(0);
        assert!(leaf.is_busy_leaf());
        leaf.set_hops_flow(3);
        assert!(!leaf.is_busy_leaf());

        let (up, _rx2, _) = conn(ConnectionRole::Ultrapeer, 4);
        up.set_hops_flow(0);
        assert!(!up.is_busy_leaf());
    }

    #[test]
    fn test_received_table_gates_queries() {
        let (c, _rx, _) = conn(ConnectionRole::Leaf, 4);
        let q = query("beatles yesterday");
        assert!(!c.hits_route_table(&q));
        assert!(!c.should_forward_query(&q));

        let mut table = QueryRouteTable::new();
        table.add("beatles yesterday");
        for message in table.encode(None).unwrap() {
            c.apply_route_table(&message).unwrap();
        }
        assert!(c.hits_route_table(&q));
        assert!(!c.hits_route_table(&query("stones")));
    }

    #[test]
    fn test_bad_patch_discards_table() {
        let (c, _rx, _) = conn(ConnectionRole::Leaf, 4);
        let reset = RouteTableMessage::Reset {
            table_size: 1 << 16,
            infinity: 7,
        };
        c.apply_route_table(&reset).unwrap();
        assert!(c.has_received_table());

        let deflated = RouteTableMessage::Patch {
            seq_no: 1,
            seq_size: 1,
            compressor: shared_types::COMPRESSOR_DEFLATE,
            entry_bits: 8,
            data: vec![0; 16],
        };
        assert!(c.apply_route_table(&deflated).is_err());
        assert!(!c.has_received_table());
    }

    #[test]
    fn test_non_qrp_link_forwards_everything() {
        let clock = Arc::new(ManualTimeSource::new(0));
        let (c, _rx) = ManagedConnection::with_queue(
            "1.2.3.4:6346".parse().unwrap(),
            ConnectionRole::Ultrapeer,
            Capabilities::default(),
            clock,
            ConnectionTimings::default(),
        );
        assert!(c.should_forward_query(&query("anything")));
    }

    #[test]
    fn test_qrp_forward_interval_by_role() {
        let (up, _rx, clock) = conn(ConnectionRole::Ultrapeer, 4);
        let now = clock.now_ms();
        assert!(up.qrp_update_due(now));
        up.advance_qrp_forward_time(now);
        assert!(!up.qrp_update_due(now + 59_999));
        assert!(up.qrp_update_due(now + 60_000));

        let (ours, _rx2, _) = conn(ConnectionRole::ClientOfUltrapeer, 4);
        ours.advance_qrp_forward_time(now);
        assert!(!ours.qrp_update_due(now + 60_000));
        assert!(ours.qrp_update_due(now + 300_000));
    }

    #[test]
    fn test_push_proxy_flag() {
        let (leaf, _rx, _) = conn(ConnectionRole::Leaf, 4);
        let guid = Guid::new_random();
        assert!(!leaf.is_push_proxy_for(&guid));
        leaf.set_push_proxy_for(guid);
        assert!(leaf.is_push_proxy_for(&guid));
    }
}
