//! # Node Runtime
//!
//! Owns the UDP socket and every background task of a running node.
//!
//! ## Startup Sequence
//!
//! 1. Bind the UDP socket
//! 2. Build the container (router and adapters)
//! 3. Spawn the send and receive loops
//! 4. Spawn the router scheduler with the metrics hook
//!
//! ## Shutdown Sequence
//!
//! 1. Signal shutdown on the watch channel
//! 2. Wait for every task, up to [`SHUTDOWN_GRACE`]
//!
//! ## TCP Connections
//!
//! The runtime does not accept or dial Gnutella TCP connections. The
//! embedding layer performs the handshake, registers each link with
//! `router.registry().add(ManagedConnection::with_queue(..))`, feeds decoded
//! frames to `MessageRouter::handle_message` and writes out whatever the
//! connection's queue yields. `gn-tests`' overlay harness does exactly this
//! in process.

use crate::adapters::{run_receive_loop, run_send_loop, Datagram};
use crate::container::{node_gauges, NodeConfig, NodeContainer};
use anyhow::{Context, Result};
use gn_05_message_router::{MetricsHook, RouterScheduler};
use gn_telemetry::{publish_gauges, publish_router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Time tasks get to stop after the shutdown signal.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// A running routing node.
pub struct NodeRuntime {
    container: Arc<NodeContainer>,
    socket: Arc<UdpSocket>,
    outbox_rx: Option<mpsc::Receiver<Datagram>>,
    metrics_interval: Duration,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl NodeRuntime {
    /// Bind the socket and wire the node. Nothing runs until [`start`](Self::start).
    pub async fn bind(config: NodeConfig, metrics_interval: Duration) -> Result<Self> {
        let bind_addr = config.network.bind_addr();
        let socket = UdpSocket::bind(bind_addr)
            .await
            .with_context(|| format!("Failed to bind UDP socket on {bind_addr}"))?;

        let mut config = config;
        let bound = socket.local_addr().context("Failed to read bound address")?;
        config.network.udp_port = bound.port();

        let (container, outbox_rx) = NodeContainer::new(config, Handle::current());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            container: Arc::new(container),
            socket: Arc::new(socket),
            outbox_rx: Some(outbox_rx),
            metrics_interval,
            shutdown_tx,
            shutdown_rx,
            tasks: Vec::new(),
        })
    }

    /// Spawn the transport loops and the scheduler.
    pub fn start(&mut self) -> Result<()> {
        let outbox_rx = self
            .outbox_rx
            .take()
            .context("Node runtime already started")?;
        let router = self.container.router.clone();

        self.tasks.push(tokio::spawn(run_send_loop(
            self.socket.clone(),
            outbox_rx,
            self.shutdown_rx.clone(),
        )));
        self.tasks.push(tokio::spawn(run_receive_loop(
            self.socket.clone(),
            router.clone(),
            self.shutdown_rx.clone(),
        )));

        let gauges_router = router.clone();
        let hook: MetricsHook = Arc::new(move |snapshot| {
            publish_router(&snapshot);
            publish_gauges(&node_gauges(&gauges_router));
        });
        let scheduler =
            RouterScheduler::new(router).with_metrics_hook(self.metrics_interval, hook);
        self.tasks.extend(scheduler.spawn(self.shutdown_rx.clone()));

        let network = &self.container.config.network;
        info!("===========================================");
        info!("  Gnutella Routing Node v{}", env!("CARGO_PKG_VERSION"));
        info!(
            "  Mode: {}",
            if network.ultrapeer { "ultrapeer" } else { "leaf" }
        );
        info!("===========================================");
        info!("UDP: {}", self.local_addr()?);
        info!("Shared files: {}", self.container.config.content.shared_files.len());
        Ok(())
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket
            .local_addr()
            .context("Failed to read socket address")
    }

    pub fn container(&self) -> Arc<NodeContainer> {
        Arc::clone(&self.container)
    }

    /// Stop every task and wait for them.
    pub async fn shutdown(self) {
        info!("Initiating graceful shutdown...");

        if let Err(e) = self.shutdown_tx.send(true) {
            error!("Failed to send shutdown signal: {}", e);
        }

        let tasks = self.tasks;
        let count = tasks.len();
        let joined = tokio::time::timeout(SHUTDOWN_GRACE, async move {
            for task in tasks {
                if let Err(e) = task.await {
                    warn!("Task ended abnormally: {}", e);
                }
            }
        })
        .await;
        if joined.is_err() {
            warn!("Not all of {} tasks stopped within {:?}", count, SHUTDOWN_GRACE);
        }

        info!("Shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{decode, encode, Guid, Message, Payload, PingRequest};
    use std::net::Ipv4Addr;

    fn config() -> NodeConfig {
        let mut config = NodeConfig::default();
        config.network.bind_ip = Ipv4Addr::LOCALHOST;
        config.network.advertised_ip = Ipv4Addr::LOCALHOST;
        config.network.udp_port = 0;
        config
    }

    #[tokio::test]
    async fn test_bind_records_ephemeral_port() {
        let runtime = NodeRuntime::bind(config(), Duration::from_secs(10))
            .await
            .unwrap();
        let port = runtime.local_addr().unwrap().port();
        assert_ne!(port, 0);
        assert_eq!(runtime.container().config.network.udp_port, port);
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let mut runtime = NodeRuntime::bind(config(), Duration::from_secs(10))
            .await
            .unwrap();
        runtime.start().unwrap();
        assert!(runtime.start().is_err());
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_heartbeat_ping_answered_over_udp() {
        let mut runtime = NodeRuntime::bind(config(), Duration::from_secs(10))
            .await
            .unwrap();
        runtime.start().unwrap();
        let node = runtime.local_addr().unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let ping = Message::new(Guid::new_random(), 1, 0, Payload::Ping(PingRequest::new()));
        client.send_to(&encode(&ping).unwrap(), node).await.unwrap();

        let mut buf = [0u8; 1024];
        let (len, from) = tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(from, node);
        let pong = decode(&buf[..len]).unwrap();
        assert_eq!(pong.guid(), ping.guid());
        assert!(pong.as_pong().is_some());

        runtime.shutdown().await;
    }
}
