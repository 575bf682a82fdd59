//! Per-search accumulated contacts (spec §3 "Result set", §4.5).
//!
//! Independent of the lookup engine's own candidate list: a search drives
//! *which* nodes get asked, the result store accumulates *what they said*.
//! Capacity and dedup are enforced per `target_id`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::constants::MAX_RESULTS_PER_SEARCH;
use crate::endpoint::{Endpoint, Family};
use crate::id::Id;

/// Notified once per *novel* contact inserted into a result set (spec §4.5
/// step 5, the "execute-on-result" external hook). Implementations must not
/// block the reactor; a process-spawning implementation lives in the
/// binary crate (`hook.rs`), kept out of this library per spec §1's
/// out-of-scope list.
pub trait ResultHook: Send + Sync {
    fn notify(&self, target: Id, endpoint: Endpoint);
}

#[derive(Debug, Default)]
struct ResultEntry {
    numresults4: usize,
    numresults6: usize,
    contacts: Vec<Endpoint>,
}

impl ResultEntry {
    fn total(&self) -> usize {
        self.numresults4 + self.numresults6
    }
}

pub struct ResultStore {
    by_target: HashMap<Id, ResultEntry>,
    hook: Option<Arc<dyn ResultHook>>,
}

impl ResultStore {
    pub fn new() -> Self {
        ResultStore {
            by_target: HashMap::new(),
            hook: None,
        }
    }

    pub fn set_hook(&mut self, hook: Arc<dyn ResultHook>) {
        self.hook = Some(hook);
    }

    /// Inserts `endpoint` as a contact for `target`, per spec §4.5's
    /// numbered steps: dedup, cap at `MAX_RESULTS_PER_SEARCH`, prepend,
    /// bump the per-family counter, then fire the hook on novel inserts.
    pub fn insert(&mut self, target: Id, endpoint: Endpoint) {
        let entry = self.by_target.entry(target).or_default();

        if entry.total() >= MAX_RESULTS_PER_SEARCH {
            return;
        }
        if entry.contacts.contains(&endpoint) {
            return;
        }

        entry.contacts.insert(0, endpoint);
        match endpoint.family() {
            Family::V4 => entry.numresults4 += 1,
            Family::V6 => entry.numresults6 += 1,
        }

        if let Some(hook) = &self.hook {
            hook.notify(target, endpoint);
        }
    }

    pub fn count(&self, target: &Id) -> usize {
        self.by_target.get(target).map(|e| e.total()).unwrap_or(0)
    }

    pub fn counts(&self, target: &Id) -> (usize, usize) {
        self.by_target
            .get(target)
            .map(|e| (e.numresults4, e.numresults6))
            .unwrap_or((0, 0))
    }

    pub fn contacts(&self, target: &Id) -> Vec<Endpoint> {
        self.by_target
            .get(target)
            .map(|e| e.contacts.clone())
            .unwrap_or_default()
    }

    /// Frees the result set for `target` (spec §4.5, "clear-on-expiry": the
    /// lookup engine calls this when the underlying search expires).
    pub fn clear(&mut self, target: &Id) {
        self.by_target.remove(target);
    }
}

impl Default for ResultStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn id(byte: u8) -> Id {
        Id::from_bytes([byte; crate::id::ID_LENGTH])
    }

    fn ep(byte: u8) -> Endpoint {
        Endpoint::new(([10, 0, 0, byte], 6881).into())
    }

    #[test]
    fn accumulates_and_counts_by_family() {
        let mut store = ResultStore::new();
        let t = id(1);
        store.insert(t, ep(1));
        store.insert(t, Endpoint::new("[::1]:6881".parse().unwrap()));
        assert_eq!(store.counts(&t), (1, 1));
        assert_eq!(store.count(&t), 2);
    }

    #[test]
    fn duplicate_contact_is_dropped() {
        let mut store = ResultStore::new();
        let t = id(1);
        store.insert(t, ep(1));
        store.insert(t, ep(1));
        assert_eq!(store.count(&t), 1);
    }

    #[test]
    fn caps_at_max_results_per_search() {
        let mut store = ResultStore::new();
        let t = id(1);
        for i in 0..600u32 {
            let port = (i % 65000) as u16 + 1;
            let octet4 = (i % 256) as u8;
            let octet3 = ((i / 256) % 256) as u8;
            store.insert(t, Endpoint::new(([10, 0, octet3, octet4], port).into()));
        }
        assert_eq!(store.count(&t), MAX_RESULTS_PER_SEARCH);
    }

    #[test]
    fn clear_empties_the_set() {
        let mut store = ResultStore::new();
        let t = id(1);
        store.insert(t, ep(1));
        store.clear(&t);
        assert_eq!(store.count(&t), 0);
    }

    #[test]
    fn hook_fires_only_on_novel_insertion() {
        struct Recorder(Mutex<Vec<(Id, Endpoint)>>);
        impl ResultHook for Recorder {
            fn notify(&self, target: Id, endpoint: Endpoint) {
                self.0.lock().unwrap().push((target, endpoint));
            }
        }
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let mut store = ResultStore::new();
        store.set_hook(recorder.clone());
        let t = id(1);
        store.insert(t, ep(1));
        store.insert(t, ep(1)); // duplicate, must not re-fire

        let calls = recorder.0.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], (t, ep(1)));
    }
}
