//! # UDP Transport
//!
//! The router is synchronous; the socket is not. Outgoing datagrams go
//! through a bounded queue ([`UdpOutbox`]) drained by [`run_send_loop`], and
//! [`run_receive_loop`] feeds every received datagram to the router.
//!
//! ```text
//! router ──send()──→ UdpOutbox ──mpsc──→ run_send_loop ──→ socket
//! socket ──→ run_receive_loop ──handle_udp_packet()──→ router
//! ```

use gn_05_message_router::{DatagramSender, MessageRouter};
use shared_types::{encode, Message};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Largest datagram we read.
pub const MAX_DATAGRAM_LEN: usize = 65_536;

/// An encoded datagram waiting for the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub bytes: Vec<u8>,
    pub to: SocketAddr,
}

/// Queue of datagrams bound for the socket.
pub struct UdpOutbox {
    tx: mpsc::Sender<Datagram>,
    dropped: AtomicU64,
}

impl UdpOutbox {
    /// Create an outbox and the receiving end for [`run_send_loop`].
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Datagram>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Datagrams refused because they did not encode or the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl DatagramSender for UdpOutbox {
    fn send(&self, message: &Message, to: SocketAddr) -> bool {
        let bytes = match encode(message) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("[udp] Cannot encode {} for {}: {}", message.kind().as_str(), to, e);
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        };
        match self.tx.try_send(Datagram { bytes, to }) {
            Ok(()) => true,
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("[udp] Outbox full, dropping datagram to {}", to);
                false
            }
        }
    }
}

/// Write queued datagrams to `socket` until shutdown or the outbox closes.
pub async fn run_send_loop(
    socket: Arc<UdpSocket>,
    mut outbox: mpsc::Receiver<Datagram>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            next = outbox.recv() => {
                let Some(datagram) = next else { break };
                if let Err(e) = socket.send_to(&datagram.bytes, datagram.to).await {
                    debug!("[udp] Send to {} failed: {}", datagram.to, e);
                }
            }
            _ = shutdown.changed() => {
                info!("[udp] Send loop shutting down");
                break;
            }
        }
    }
}

/// Hand every datagram read from `socket` to the router.
///
/// Malformed datagrams are counted by the router and otherwise ignored;
/// a socket error ends the loop.
pub async fn run_receive_loop(
    socket: Arc<UdpSocket>,
    router: Arc<MessageRouter>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
    loop {
        tokio::select! {
            received = socket.recv_from(&mut buf) => {
                match received {
                    Ok((len, from)) => {
                        if let Err(e) = router.handle_udp_packet(&buf[..len], from) {
                            debug!("[udp] Datagram from {} not routed: {}", from, e);
                        }
                    }
                    Err(e) => {
                        warn!("[udp] Receive failed: {}", e);
                        break;
                    }
                }
            }
            _ = shutdown.changed() => {
                info!("[udp] Receive loop shutting down");
                break;
            }
        }
    }
}
