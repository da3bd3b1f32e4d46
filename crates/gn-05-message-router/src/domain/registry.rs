//! Connection registry.

use super::capabilities::ConnectionRole;
use super::connection::ManagedConnection;
use parking_lot::RwLock;
use shared_types::{Guid, HandlerId, NodeRole};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Every live connection, in the order they were added.
pub struct ConnectionRegistry {
    connections: RwLock<Vec<Arc<ManagedConnection>>>,
    ultrapeer: AtomicBool,
    max_leaves: usize,
    max_ultrapeers: usize,
    max_leaf_ultrapeers: usize,
}

impl ConnectionRegistry {
    pub fn new(
        ultrapeer: bool,
        max_leaves: usize,
        max_ultrapeers: usize,
        max_leaf_ultrapeers: usize,
    ) -> Self {
        Self {
            connections: RwLock::new(Vec::new()),
            ultrapeer: AtomicBool::new(ultrapeer),
            max_leaves,
            max_ultrapeers,
            max_leaf_ultrapeers,
        }
    }

    pub fn add(&self, connection: Arc<ManagedConnection>) {
        info!(
            "[gn-05] Connection {} to {} added as {:?}",
            connection.id(),
            connection.socket_addr(),
            connection.role()
        );
        self.connections.write().push(connection);
    }

    /// Remove and close a connection.
    pub fn remove(&self, id: HandlerId) -> Option<Arc<ManagedConnection>> {
        let mut connections = self.connections.write();
        let index = connections.iter().position(|c| c.id() == id)?;
        let removed = connections.remove(index);
        removed.close();
        info!("[gn-05] Connection {} removed", id);
        Some(removed)
    }

    pub fn get(&self, id: HandlerId) -> Option<Arc<ManagedConnection>> {
        self.connections.read().iter().find(|c| c.id() == id).cloned()
    }

    pub fn all(&self) -> Vec<Arc<ManagedConnection>> {
        self.connections.read().clone()
    }

    fn with_role(&self, keep: impl Fn(ConnectionRole) -> bool) -> Vec<Arc<ManagedConnection>> {
        self.connections
            .read()
            .iter()
            .filter(|c| keep(c.role()))
            .cloned()
            .collect()
    }

    /// Connections to ultrapeers, ours or peers.
    pub fn initialized_connections(&self) -> Vec<Arc<ManagedConnection>> {
        self.with_role(|r| r.remote_is_ultrapeer())
    }

    /// Ultrapeer-to-ultrapeer connections.
    pub fn ultrapeer_connections(&self) -> Vec<Arc<ManagedConnection>> {
        self.with_role(|r| r == ConnectionRole::Ultrapeer)
    }

    /// Our leaves.
    pub fn client_connections(&self) -> Vec<Arc<ManagedConnection>> {
        self.with_role(|r| r == ConnectionRole::Leaf)
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_connected_to(&self, ip: IpAddr) -> bool {
        self.connections
            .read()
            .iter()
            .any(|c| c.socket_addr().ip() == ip)
    }

    /// The leaf whose client GUID we act as push proxy for.
    pub fn push_proxy_leaf(&self, client_guid: &Guid) -> Option<Arc<ManagedConnection>> {
        self.connections
            .read()
            .iter()
            .find(|c| c.role() == ConnectionRole::Leaf && c.is_push_proxy_for(client_guid))
            .cloned()
    }

    pub fn set_ultrapeer(&self, ultrapeer: bool) {
        if self.ultrapeer.swap(ultrapeer, Ordering::AcqRel) != ultrapeer {
            info!("[gn-05] Node role is now {}", if ultrapeer { "ultrapeer" } else { "leaf" });
        }
    }

    pub fn free_leaf_slots(&self) -> usize {
        if !self.is_ultrapeer() {
            return 0;
        }
        self.max_leaves.saturating_sub(self.client_connections().len())
    }

    pub fn free_ultrapeer_slots(&self) -> usize {
        if !self.is_ultrapeer() {
            return 0;
        }
        self.max_ultrapeers
            .saturating_sub(self.ultrapeer_connections().len())
    }

    /// We would accept another connection of some kind.
    pub fn allow_any_connection(&self) -> bool {
        if self.is_ultrapeer() {
            self.free_leaf_slots() > 0 || self.free_ultrapeer_slots() > 0
        } else {
            self.initialized_connections().len() < self.max_leaf_ultrapeers
        }
    }
}

impl NodeRole for ConnectionRegistry {
    fn is_ultrapeer(&self) -> bool {
        self.ultrapeer.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("ultrapeer", &self.is_ultrapeer())
            .field("connections", &self.len())
            .finish()
    }
}
