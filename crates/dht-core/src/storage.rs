//! Received-announcement cache (spec §4.6, §3 "Storage entry").
//!
//! Remote nodes that successfully execute `announce_peer` against us land
//! here, keyed by the info-hash they announced. Answering a later
//! `get_peers` for the same info-hash reads straight out of this structure.
//! Bounded on two axes: at most `DHT_MAX_HASHES` distinct ids, at most
//! `DHT_MAX_PEERS` peers per id. Both evict oldest-first (an insertion-order
//! LRU, not an access-order one — the source material does not track reads).

use std::collections::{HashMap, VecDeque};

use crate::constants::{DHT_MAX_HASHES, DHT_MAX_PEERS};
use crate::endpoint::Endpoint;
use crate::id::Id;

#[derive(Debug, Default)]
struct Entry {
    peers: VecDeque<Endpoint>,
}

/// Storage of announcements received from remote peers via `announce_peer`.
/// `insertion_order` tracks which id to evict first once `DHT_MAX_HASHES`
/// is reached; `by_id` holds the actual per-id peer lists.
pub struct Storage {
    by_id: HashMap<Id, Entry>,
    insertion_order: VecDeque<Id>,
}

impl Storage {
    pub fn new() -> Self {
        Storage {
            by_id: HashMap::new(),
            insertion_order: VecDeque::new(),
        }
    }

    /// Records `endpoint` as a peer for `id`. Evicts the oldest tracked id
    /// to make room if this is a novel id at capacity; evicts the oldest
    /// peer for `id` if that id's own peer list is at capacity. Idempotent:
    /// re-announcing the same (id, endpoint) moves nothing and adds nothing.
    pub fn announce(&mut self, id: Id, endpoint: Endpoint) {
        if !self.by_id.contains_key(&id) {
            if self.by_id.len() >= DHT_MAX_HASHES {
                if let Some(oldest) = self.insertion_order.pop_front() {
                    self.by_id.remove(&oldest);
                }
            }
            self.insertion_order.push_back(id);
        }

        let entry = self.by_id.entry(id).or_default();
        if entry.peers.contains(&endpoint) {
            return;
        }
        if entry.peers.len() >= DHT_MAX_PEERS {
            entry.peers.pop_front();
        }
        entry.peers.push_back(endpoint);
    }

    /// Peers previously announced for `id`, oldest first.
    pub fn peers_for(&self, id: &Id) -> Vec<Endpoint> {
        self.by_id
            .get(id)
            .map(|e| e.peers.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn hash_count(&self) -> usize {
        self.by_id.len()
    }

    pub fn peer_count(&self, id: &Id) -> usize {
        self.by_id.get(id).map(|e| e.peers.len()).unwrap_or(0)
    }

    pub fn total_peer_count(&self) -> usize {
        self.by_id.values().map(|e| e.peers.len()).sum()
    }

    pub fn ids(&self) -> impl Iterator<Item = &Id> {
        self.by_id.keys()
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep(byte: u8) -> Endpoint {
        Endpoint::new(([10, 0, 0, byte], 6881).into())
    }

    fn id(byte: u8) -> Id {
        Id::from_bytes([byte; crate::id::ID_LENGTH])
    }

    #[test]
    fn announce_then_read_back() {
        let mut storage = Storage::new();
        storage.announce(id(1), ep(1));
        storage.announce(id(1), ep(2));
        assert_eq!(storage.peers_for(&id(1)), vec![ep(1), ep(2)]);
    }

    #[test]
    fn duplicate_announce_is_not_duplicated() {
        let mut storage = Storage::new();
        storage.announce(id(1), ep(1));
        storage.announce(id(1), ep(1));
        assert_eq!(storage.peer_count(&id(1)), 1);
    }

    #[test]
    fn per_id_peer_cap_evicts_oldest() {
        let mut storage = Storage::new();
        for i in 0..(DHT_MAX_PEERS as u16 + 1) {
            storage.announce(id(1), Endpoint::new(([10, 0, (i >> 8) as u8, i as u8], 1).into()));
        }
        assert_eq!(storage.peer_count(&id(1)), DHT_MAX_PEERS);
    }

    #[test]
    fn unknown_id_has_no_peers() {
        let storage = Storage::new();
        assert!(storage.peers_for(&id(9)).is_empty());
    }
}
