//! Reply handlers for UDP endpoints.

use crate::ports::DatagramSender;
use parking_lot::Mutex;
use shared_types::{HandlerId, HandlerKind, Message, ReplyHandler};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Delivers replies to a remote UDP address.
pub struct UdpReplyHandler {
    id: HandlerId,
    address: SocketAddr,
    sender: Arc<dyn DatagramSender>,
    dropped: AtomicU64,
}

impl UdpReplyHandler {
    pub fn new(address: SocketAddr, sender: Arc<dyn DatagramSender>) -> Self {
        Self {
            id: HandlerId::next(),
            address,
            sender,
            dropped: AtomicU64::new(0),
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn deliver(&self, message: &Message) {
        if !self.sender.send(message, self.address) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl ReplyHandler for UdpReplyHandler {
    fn id(&self) -> HandlerId {
        self.id
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Udp
    }

    fn is_open(&self) -> bool {
        true
    }

    fn address(&self) -> Option<SocketAddr> {
        Some(self.address)
    }

    fn handle_ping_reply(&self, pong: &Message, _source: Option<&dyn ReplyHandler>) {
        self.deliver(pong);
    }

    fn handle_query_reply(&self, reply: &Message, _source: Option<&dyn ReplyHandler>) {
        self.deliver(reply);
    }

    fn handle_push_request(&self, push: &Message, _source: Option<&dyn ReplyHandler>) {
        self.deliver(push);
    }

    fn count_dropped_message(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }
}

impl fmt::Debug for UdpReplyHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UdpReplyHandler")
            .field("id", &self.id)
            .field("address", &self.address)
            .finish()
    }
}

/// One handler per remote address, so routes from the same host share an
/// identity. Idle entries are forgotten by [`clean`](Self::clean).
pub struct UdpHandlerCache {
    sender: Arc<dyn DatagramSender>,
    handlers: Mutex<HashMap<SocketAddr, (Arc<UdpReplyHandler>, u64)>>,
}

impl UdpHandlerCache {
    pub fn new(sender: Arc<dyn DatagramSender>) -> Self {
        Self {
            sender,
            handlers: Mutex::new(HashMap::new()),
        }
    }

    /// The handler for `address`, created on first use.
    pub fn get(&self, address: SocketAddr, now_ms: u64) -> Arc<UdpReplyHandler> {
        let mut handlers = self.handlers.lock();
        let entry = handlers.entry(address).or_insert_with(|| {
            (
                Arc::new(UdpReplyHandler::new(address, self.sender.clone())),
                now_ms,
            )
        });
        entry.1 = now_ms;
        entry.0.clone()
    }

    /// Forget handlers unused for longer than `idle_ms`.
    ///
    /// Routes already pointing at a forgotten handler still deliver.
    pub fn clean(&self, now_ms: u64, idle_ms: u64) -> usize {
        let mut handlers = self.handlers.lock();
        let before = handlers.len();
        handlers.retain(|_, (_, used)| now_ms.saturating_sub(*used) <= idle_ms);
        let removed = before - handlers.len();
        if removed > 0 {
            debug!("[gn-05] Forgot {} idle UDP reply handlers", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.handlers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
