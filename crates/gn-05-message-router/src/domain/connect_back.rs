//! Addresses we recently performed connect-backs for.

use lru::LruCache;
use parking_lot::Mutex;
use std::net::Ipv4Addr;
use std::num::NonZeroUsize;

/// Bounded memory of serviced redirect targets, one per connect-back kind.
///
/// An address is serviced once until [`clear`](Self::clear) runs; when the
/// memory is full the oldest address is forgotten.
pub struct ConnectBackRecords {
    tcp: Mutex<LruCache<Ipv4Addr, ()>>,
    udp: Mutex<LruCache<Ipv4Addr, ()>>,
}

impl ConnectBackRecords {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            tcp: Mutex::new(LruCache::new(cap)),
            udp: Mutex::new(LruCache::new(cap)),
        }
    }

    fn should_service(records: &Mutex<LruCache<Ipv4Addr, ()>>, ip: Ipv4Addr) -> bool {
        let mut records = records.lock();
        if records.contains(&ip) {
            return false;
        }
        records.put(ip, ());
        true
    }

    /// True the first time `ip` asks for a TCP connect-back.
    pub fn should_service_tcp(&self, ip: Ipv4Addr) -> bool {
        Self::should_service(&self.tcp, ip)
    }

    /// True the first time `ip` asks for a UDP connect-back.
    pub fn should_service_udp(&self, ip: Ipv4Addr) -> bool {
        Self::should_service(&self.udp, ip)
    }

    pub fn clear(&self) {
        self.tcp.lock().clear();
        self.udp.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.tcp.lock().len() + self.udp.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ConnectBackRecords {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectBackRecords")
            .field("tcp", &self.tcp.lock().len())
            .field("udp", &self.udp.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serviced_once_until_cleared() {
        let records = ConnectBackRecords::new(200);
        let ip = Ipv4Addr::new(9, 9, 9, 9);
        assert!(records.should_service_tcp(ip));
        assert!(!records.should_service_tcp(ip));
        // Kinds are tracked separately.
        assert!(records.should_service_udp(ip));
        records.clear();
        assert!(records.should_service_tcp(ip));
    }

    #[test]
    fn test_bounded_memory_forgets_oldest() {
        let records = ConnectBackRecords::new(2);
        let a = Ipv4Addr::new(1, 0, 0, 1);
        let b = Ipv4Addr::new(1, 0, 0, 2);
        let c = Ipv4Addr::new(1, 0, 0, 3);
        assert!(records.should_service_udp(a));
        assert!(records.should_service_udp(b));
        assert!(records.should_service_udp(c));
        assert_eq!(records.len(), 2);
        assert!(records.should_service_udp(a));
    }
}
