//! TCP connect-backs.
//!
//! A connect-back proves to a peer that it accepts incoming connections:
//! we open a TCP connection to it, send the greeting and hang up.

use gn_05_message_router::ConnectBackDialer;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tracing::debug;

/// Bytes sent on a connect-back connection.
pub const CONNECT_BACK_GREETING: &[u8] = b"CONNECT BACK\r\n\r\n";

/// Dials connect-backs on a tokio runtime without blocking the router.
pub struct TcpConnectBackDialer {
    runtime: Handle,
    timeout: Duration,
    stats: Arc<DialStats>,
}

#[derive(Debug, Default)]
pub struct DialStats {
    pub attempted: AtomicU64,
    pub succeeded: AtomicU64,
}

impl TcpConnectBackDialer {
    pub fn new(runtime: Handle, timeout: Duration) -> Self {
        Self {
            runtime,
            timeout,
            stats: Arc::new(DialStats::default()),
        }
    }

    pub fn stats(&self) -> &Arc<DialStats> {
        &self.stats
    }
}

impl ConnectBackDialer for TcpConnectBackDialer {
    fn connect_back(&self, ip: Ipv4Addr, port: u16) {
        let addr = SocketAddr::V4(SocketAddrV4::new(ip, port));
        let timeout = self.timeout;
        let stats = self.stats.clone();
        stats.attempted.fetch_add(1, Ordering::Relaxed);

        self.runtime.spawn(async move {
            let dial = async {
                let mut stream = TcpStream::connect(addr).await?;
                stream.write_all(CONNECT_BACK_GREETING).await?;
                stream.shutdown().await
            };
            match tokio::time::timeout(timeout, dial).await {
                Ok(Ok(())) => {
                    stats.succeeded.fetch_add(1, Ordering::Relaxed);
                    debug!("[dialer] Connect-back to {} done", addr);
                }
                Ok(Err(e)) => debug!("[dialer] Connect-back to {} failed: {}", addr, e),
                Err(_) => debug!("[dialer] Connect-back to {} timed out", addr),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_back_sends_greeting() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let dialer = TcpConnectBackDialer::new(Handle::current(), Duration::from_secs(2));

        dialer.connect_back(Ipv4Addr::LOCALHOST, port);

        let (mut stream, _) = listener.accept().await.unwrap();
        let mut received = Vec::new();
        stream.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, CONNECT_BACK_GREETING);
        assert_eq!(dialer.stats().attempted.load(Ordering::Relaxed), 1);
    }
}
