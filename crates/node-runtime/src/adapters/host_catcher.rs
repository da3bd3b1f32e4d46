//! Host cache fed by routed pongs.

use gn_05_message_router::HostCatcher;
use lru::LruCache;
use parking_lot::Mutex;
use shared_types::Message;
use std::net::{SocketAddr, SocketAddrV4};
use std::num::NonZeroUsize;

/// What a pong told us about a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostInfo {
    pub ultrapeer: bool,
    pub files: u32,
}

/// Bounded cache of hosts learned from pongs, most recent first.
pub struct LruHostCatcher {
    hosts: Mutex<LruCache<SocketAddrV4, HostInfo>>,
}

impl LruHostCatcher {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            hosts: Mutex::new(LruCache::new(cap)),
        }
    }

    /// Known hosts, most recently seen first. Ultrapeers come before leaves.
    pub fn hosts(&self, limit: usize) -> Vec<SocketAddr> {
        let hosts = self.hosts.lock();
        let (mut ultrapeers, leaves): (Vec<_>, Vec<_>) =
            hosts.iter().partition(|(_, info)| info.ultrapeer);
        ultrapeers.extend(leaves);
        ultrapeers
            .into_iter()
            .take(limit)
            .map(|(addr, _)| SocketAddr::V4(*addr))
            .collect()
    }

    pub fn get(&self, addr: &SocketAddrV4) -> Option<HostInfo> {
        self.hosts.lock().peek(addr).copied()
    }

    pub fn len(&self) -> usize {
        self.hosts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HostCatcher for LruHostCatcher {
    fn add(&self, pong: &Message) -> bool {
        let Some(reply) = pong.as_pong() else {
            return false;
        };
        if !reply.has_routable_address() {
            return false;
        }
        let info = HostInfo {
            ultrapeer: reply.is_ultrapeer(),
            files: reply.files,
        };
        self.hosts
            .lock()
            .put(SocketAddrV4::new(reply.ip, reply.port), info)
            .is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{Guid, Payload, PingReply};
    use std::net::Ipv4Addr;

    fn pong(ip: [u8; 4], ultrapeer: bool) -> Message {
        let mut reply = PingReply::new(Ipv4Addr::from(ip), 6346, 10, 100);
        if ultrapeer {
            reply = reply.with_ultrapeer(5, 5);
        }
        Message::new(Guid::new_random(), 1, 1, Payload::Pong(reply))
    }

    #[test]
    fn test_new_address_reported_once() {
        let catcher = LruHostCatcher::new(10);
        assert!(catcher.add(&pong([24, 0, 0, 1], false)));
        assert!(!catcher.add(&pong([24, 0, 0, 1], false)));
        assert_eq!(catcher.len(), 1);
    }

    #[test]
    fn test_private_addresses_ignored() {
        let catcher = LruHostCatcher::new(10);
        assert!(!catcher.add(&pong([192, 168, 0, 1], true)));
        assert!(catcher.is_empty());
    }

    #[test]
    fn test_oldest_host_evicted() {
        let catcher = LruHostCatcher::new(2);
        catcher.add(&pong([24, 0, 0, 1], false));
        catcher.add(&pong([24, 0, 0, 2], false));
        catcher.add(&pong([24, 0, 0, 3], false));

        assert_eq!(catcher.len(), 2);
        assert!(catcher
            .get(&SocketAddrV4::new(Ipv4Addr::new(24, 0, 0, 1), 6346))
            .is_none());
    }

    #[test]
    fn test_ultrapeers_listed_first() {
        let catcher = LruHostCatcher::new(10);
        catcher.add(&pong([24, 0, 0, 1], true));
        catcher.add(&pong([24, 0, 0, 2], false));

        let hosts = catcher.hosts(10);
        assert_eq!(hosts[0], "24.0.0.1:6346".parse().unwrap());
        assert_eq!(hosts.len(), 2);
    }
}
