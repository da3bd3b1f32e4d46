//! Query keys for unicast queriers.
//!
//! A key is the first [`KEY_LEN`] bytes of SHA-256 over our secret and the
//! querier's address. Nothing is stored: validation recomputes the key.

use crate::container::config::SECRET_LEN;
use gn_05_message_router::QueryKeyValidator;
use sha2::{Digest, Sha256};
use std::net::SocketAddr;

/// Bytes in an issued key.
pub const KEY_LEN: usize = 8;

pub struct HashedQueryKeys {
    secret: [u8; SECRET_LEN],
}

impl HashedQueryKeys {
    pub fn new(secret: [u8; SECRET_LEN]) -> Self {
        Self { secret }
    }

    fn compute(&self, addr: SocketAddr) -> [u8; KEY_LEN] {
        let mut hasher = Sha256::new();
        hasher.update(self.secret);
        match addr {
            SocketAddr::V4(v4) => hasher.update(v4.ip().octets()),
            SocketAddr::V6(v6) => hasher.update(v6.ip().octets()),
        }
        hasher.update(addr.port().to_be_bytes());
        let digest = hasher.finalize();
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&digest[..KEY_LEN]);
        key
    }
}

impl QueryKeyValidator for HashedQueryKeys {
    fn key_for(&self, addr: SocketAddr) -> Vec<u8> {
        self.compute(addr).to_vec()
    }

    fn is_valid(&self, key: &[u8], addr: SocketAddr) -> bool {
        key.len() == KEY_LEN && key == self.compute(addr).as_slice()
    }
}
