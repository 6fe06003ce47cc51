use std::{
    collections::BTreeMap,
    sync::{PoisonError, RwLock},
};

/// Peer id -> `host:port` mapping owned by the network client.
///
/// Membership changes may race with RPC issuance, so reads and writes go through a lock. A
/// poisoned lock is recovered: the map only holds plain strings and cannot be left half-updated.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: RwLock<BTreeMap<String, String>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the address of `peer_id`.
    pub fn add(&self, peer_id: impl Into<String>, peer_address: impl Into<String>) {
        self.peers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(peer_id.into(), peer_address.into());
    }

    /// Returns the removed address; absent ids are a no-op.
    pub fn remove(&self, peer_id: &str) -> Option<String> {
        self.peers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(peer_id)
    }

    pub fn get(&self, peer_id: &str) -> Option<String> {
        self.peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(peer_id)
            .cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
