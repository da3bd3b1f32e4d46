//! Per-GUID message listeners.
//!
//! The map is copy-on-write: readers take a snapshot and never hold a lock
//! while a listener runs.

use parking_lot::RwLock;
use shared_types::{Guid, Message, ReplyHandler};
use std::collections::HashMap;
use std::sync::Arc;

/// Something interested in every message carrying one GUID.
pub trait MessageListener: Send + Sync {
    fn process_message(&self, message: &Message, handler: &dyn ReplyHandler);

    /// Called once per registration.
    fn registered(&self, _guid: &Guid) {}

    /// Called once per removed registration.
    fn unregistered(&self, _guid: &Guid) {}
}

type ListenerMap = HashMap<Guid, Vec<Arc<dyn MessageListener>>>;

/// GUID to listeners multimap.
///
/// Registering the same listener twice yields two registrations.
#[derive(Default)]
pub struct ListenerRegistry {
    map: RwLock<Arc<ListenerMap>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, guid: Guid, listener: Arc<dyn MessageListener>) {
        listener.registered(&guid);
        let mut map = self.map.write();
        let mut next = ListenerMap::clone(&map);
        next.entry(guid).or_default().push(listener);
        *map = Arc::new(next);
    }

    /// Remove one registration of `listener`. Returns false if it had none.
    pub fn unregister(&self, guid: &Guid, listener: &Arc<dyn MessageListener>) -> bool {
        {
            let mut map = self.map.write();
            let Some(current) = map.get(guid) else {
                return false;
            };
            let Some(index) = current.iter().position(|l| Arc::ptr_eq(l, listener)) else {
                return false;
            };
            let mut next = ListenerMap::clone(&map);
            if let Some(list) = next.get_mut(guid) {
                list.remove(index);
                if list.is_empty() {
                    next.remove(guid);
                }
            }
            *map = Arc::new(next);
        }
        listener.unregistered(guid);
        true
    }

    /// Snapshot of the listeners for `guid`.
    pub fn listeners(&self, guid: &Guid) -> Vec<Arc<dyn MessageListener>> {
        let snapshot = Arc::clone(&self.map.read());
        snapshot.get(guid).cloned().unwrap_or_default()
    }

    pub fn has_listeners(&self, guid: &Guid) -> bool {
        self.map.read().contains_key(guid)
    }

    /// Hand `message` to every listener for its GUID. Returns how many ran.
    pub fn notify(&self, message: &Message, handler: &dyn ReplyHandler) -> usize {
        let listeners = self.listeners(&message.guid());
        for listener in &listeners {
            listener.process_message(message, handler);
        }
        listeners.len()
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("guids", &self.map.read().len())
            .finish()
    }
}
