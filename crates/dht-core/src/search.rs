//! Iterative lookup state machine (spec §3 "Search", §4.3).
//!
//! A [`Search`] tracks the best `K_SEARCH` candidates known for a target,
//! how far along each one is (pinged / replied / acked), and the write
//! token it handed back if it answered a `get_peers`. [`SearchTable`] owns
//! every in-flight search, keyed by `(target id, family)`: v4 and v6 state
//! is never commingled (spec §3), so a target can have one search running
//! per family at once, the same way `original_source/src/kad.c`'s
//! `kad_start_search` fires a `dht_search` for `AF_INET` and `AF_INET6`
//! concurrently rather than picking one.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::constants::{ALPHA, K_SEARCH, REQUEST_TIMEOUT, SEARCH_EXPIRE_TIME};
use crate::endpoint::{Contact, Endpoint, Family};
use crate::id::Id;

/// What kind of query this search sends to each candidate as it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    /// Plain iterative `find_node`, used for bucket-refresh lookups.
    FindNode,
    /// `get_peers`, used for `lookup`/`search`/announce (spec §4.3: "a
    /// candidate whose reply carries peer tuples triggers the result-store
    /// insertion path before being added to the candidate list").
    GetPeers,
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: Id,
    pub endpoint: Endpoint,
    pub pinged_at: Option<Instant>,
    pub replied_at: Option<Instant>,
    pub acked_at: Option<Instant>,
    pub token: Option<Vec<u8>>,
    /// Insertion sequence, used to break exact-distance ties in favor of
    /// the earlier-seen candidate (spec §4.3 "Tie-breaks").
    seq: u64,
}

impl Candidate {
    fn new(contact: Contact, seq: u64) -> Self {
        Candidate {
            id: contact.id,
            endpoint: contact.endpoint,
            pinged_at: None,
            replied_at: None,
            acked_at: None,
            token: None,
            seq,
        }
    }

    fn is_acked(&self) -> bool {
        self.acked_at.is_some()
    }

    /// Pinged with no reply for longer than the per-request timeout:
    /// exhausted, will never be retried by this search.
    fn is_exhausted(&self, now: Instant) -> bool {
        match (self.pinged_at, self.replied_at) {
            (Some(pinged), None) => now.duration_since(pinged) > REQUEST_TIMEOUT,
            _ => false,
        }
    }

    fn needs_query(&self, now: Instant) -> bool {
        match self.pinged_at {
            None => true,
            Some(pinged) => self.replied_at.is_none() && now.duration_since(pinged) > REQUEST_TIMEOUT,
        }
    }
}

pub struct Search {
    pub target: Id,
    pub family: Family,
    pub kind: SearchKind,
    /// Port to announce once the search completes, for announce searches.
    pub port_to_announce: Option<u16>,
    candidates: Vec<Candidate>,
    start_time: Instant,
    next_seq: u64,
    done: bool,
}

impl Search {
    pub fn new(
        target: Id,
        family: Family,
        kind: SearchKind,
        port_to_announce: Option<u16>,
        seed: Vec<Contact>,
        now: Instant,
    ) -> Self {
        let mut search = Search {
            target,
            family,
            kind,
            port_to_announce,
            candidates: Vec::with_capacity(K_SEARCH),
            start_time: now,
            next_seq: 0,
            done: false,
        };
        search.merge(seed);
        search
    }

    /// Merges newly learned contacts into the candidate list: closer
    /// contacts displace farther ones once the list is at `K_SEARCH` (spec
    /// §4.3 "merge returned contacts ... until full").
    pub fn merge(&mut self, contacts: Vec<Contact>) {
        for contact in contacts {
            if self.candidates.iter().any(|c| c.id == contact.id) {
                continue;
            }
            let seq = self.next_seq;
            self.next_seq += 1;
            self.candidates.push(Candidate::new(contact, seq));
        }
        self.candidates.sort_by(|a, b| {
            self.target
                .distance(&a.id)
                .cmp(&self.target.distance(&b.id))
                .then(a.seq.cmp(&b.seq))
        });
        self.candidates.truncate(K_SEARCH);
    }

    /// The next candidate to query, if fewer than `ALPHA` requests are
    /// currently in flight. Picks the closest candidate that either has
    /// never been queried or whose previous query timed out.
    pub fn next_to_query(&self, now: Instant) -> Option<Id> {
        let in_flight = self
            .candidates
            .iter()
            .filter(|c| c.pinged_at.is_some() && c.replied_at.is_none() && !c.is_exhausted(now))
            .count();
        if in_flight >= ALPHA {
            return None;
        }
        self.candidates
            .iter()
            .find(|c| c.needs_query(now))
            .map(|c| c.id)
    }

    pub fn mark_pinged(&mut self, id: &Id, now: Instant) {
        if let Some(c) = self.candidates.iter_mut().find(|c| &c.id == id) {
            c.pinged_at = Some(now);
        }
    }

    /// Records a reply. `token` is `Some` only for `get_peers` replies,
    /// which is what makes a candidate *acked* (spec §4.3).
    pub fn mark_replied(&mut self, id: &Id, now: Instant, token: Option<Vec<u8>>) {
        if let Some(c) = self.candidates.iter_mut().find(|c| &c.id == id) {
            c.replied_at = Some(now);
            if let Some(token) = token {
                c.token = Some(token);
                c.acked_at = Some(now);
            }
        }
    }

    /// Closest `K_SEARCH` candidates that have been acked with a token,
    /// used to send `announce_peer` once the search winds down.
    pub fn acked_candidates(&self) -> Vec<(Id, Endpoint, Vec<u8>)> {
        self.candidates
            .iter()
            .filter_map(|c| c.token.clone().map(|t| (c.id, c.endpoint, t)))
            .collect()
    }

    pub fn candidate_ids(&self) -> Vec<Id> {
        self.candidates.iter().map(|c| c.id).collect()
    }

    pub fn candidate_endpoint(&self, id: &Id) -> Option<Endpoint> {
        self.candidates.iter().find(|c| &c.id == id).map(|c| c.endpoint)
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// True once the closest `K_SEARCH` are all acked, all remaining
    /// candidates are exhausted, or the search has run past its wall-clock
    /// budget (spec §4.3 "A search terminates when...").
    pub fn is_done(&self, now: Instant) -> bool {
        if self.done {
            return true;
        }
        if now.duration_since(self.start_time) > SEARCH_EXPIRE_TIME {
            return true;
        }
        if self.candidates.is_empty() {
            return false;
        }
        self.candidates
            .iter()
            .all(|c| c.is_acked() || c.is_exhausted(now))
    }

    pub fn mark_done(&mut self) {
        self.done = true;
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.duration_since(self.start_time)
    }
}

/// All in-flight searches, keyed by `(target id, family)`. Spec §3: "a
/// search is ... freed on expiry"; [`SearchTable::sweep_done`] does that
/// and returns the freed keys so the caller can also clear their result
/// sets (spec §4.5 "clear-on-expiry").
pub struct SearchTable {
    searches: HashMap<(Id, Family), Search>,
}

impl SearchTable {
    pub fn new() -> Self {
        SearchTable {
            searches: HashMap::new(),
        }
    }

    pub fn start(&mut self, search: Search) {
        self.searches.insert((search.target, search.family), search);
    }

    pub fn get(&self, target: &Id, family: Family) -> Option<&Search> {
        self.searches.get(&(*target, family))
    }

    pub fn get_mut(&mut self, target: &Id, family: Family) -> Option<&mut Search> {
        self.searches.get_mut(&(*target, family))
    }

    pub fn contains(&self, target: &Id, family: Family) -> bool {
        self.searches.contains_key(&(*target, family))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Search> {
        self.searches.values()
    }

    /// Removes and returns the `(target, family)` keys of every search that
    /// is done (spec §4.3 termination conditions): the caller clears each
    /// target's result set and, for announce searches, fires the
    /// announce_peer round first.
    pub fn sweep_done(&mut self, now: Instant) -> Vec<(Id, Family)> {
        let done: Vec<(Id, Family)> = self
            .searches
            .values()
            .filter(|s| s.is_done(now))
            .map(|s| (s.target, s.family))
            .collect();
        for key in &done {
            self.searches.remove(key);
        }
        done
    }
}

impl Default for SearchTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(byte: u8) -> Id {
        Id::from_bytes([byte; crate::id::ID_LENGTH])
    }

    fn contact(byte: u8) -> Contact {
        Contact::new(id(byte), Endpoint::new(([10, 0, 0, byte], 6881).into()))
    }

    #[test]
    fn candidate_list_bounded_and_deduped() {
        let now = Instant::now();
        let seed: Vec<Contact> = (1..=20u8).map(contact).collect();
        let search = Search::new(id(0), Family::V4, SearchKind::FindNode, None, seed, now);
        assert!(search.len() <= K_SEARCH);

        let ids = search.candidate_ids();
        let mut unique = ids.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(ids.len(), unique.len());
    }

    #[test]
    fn closer_contacts_displace_farther_ones() {
        let now = Instant::now();
        let target = Id::ZERO;
        // K_SEARCH candidates, all maximally far (ids near the top of the
        // 160-bit range have large XOR distance from the zero target).
        let mut far_ids = Vec::new();
        for i in 0..K_SEARCH as u8 {
            let mut bytes = [0xff; crate::id::ID_LENGTH];
            bytes[crate::id::ID_LENGTH - 1] = i;
            far_ids.push(Id::from_bytes(bytes));
        }
        let seed: Vec<Contact> = far_ids
            .iter()
            .map(|id| Contact::new(*id, Endpoint::new(([10, 0, 0, 1], 1).into())))
            .collect();
        let mut search = Search::new(target, Family::V4, SearchKind::FindNode, None, seed, now);
        assert_eq!(search.len(), K_SEARCH);

        let close = Contact::new(
            Id::from_bytes([0u8; crate::id::ID_LENGTH]),
            Endpoint::new(([10, 0, 0, 2], 2).into()),
        );
        search.merge(vec![close]);
        assert_eq!(search.len(), K_SEARCH);
        assert!(search.candidate_ids().contains(&close.id));
    }

    #[test]
    fn alpha_limits_concurrent_queries() {
        let now = Instant::now();
        let seed: Vec<Contact> = (1..=5u8).map(contact).collect();
        let mut search = Search::new(id(0), Family::V4, SearchKind::FindNode, None, seed, now);

        let mut in_flight = 0;
        while let Some(next) = search.next_to_query(now) {
            search.mark_pinged(&next, now);
            in_flight += 1;
            if in_flight > ALPHA {
                panic!("exceeded alpha concurrency");
            }
        }
        assert_eq!(in_flight, ALPHA);
    }

    #[test]
    fn search_expires_after_wall_clock_budget() {
        let now = Instant::now();
        let seed: Vec<Contact> = (1..=3u8).map(contact).collect();
        let search = Search::new(id(0), Family::V4, SearchKind::FindNode, None, seed, now);
        assert!(!search.is_done(now));
        assert!(search.is_done(now + SEARCH_EXPIRE_TIME + Duration::from_secs(1)));
    }

    #[test]
    fn done_when_all_acked() {
        let now = Instant::now();
        let seed = vec![contact(1)];
        let mut search = Search::new(id(0), Family::V4, SearchKind::GetPeers, None, seed, now);
        let cid = id(1);
        search.mark_pinged(&cid, now);
        search.mark_replied(&cid, now, Some(vec![1, 2, 3]));
        assert!(search.is_done(now));
    }

    #[test]
    fn done_when_all_exhausted() {
        let now = Instant::now();
        let seed = vec![contact(1)];
        let mut search = Search::new(id(0), Family::V4, SearchKind::FindNode, None, seed, now);
        let cid = id(1);
        search.mark_pinged(&cid, now);
        assert!(!search.is_done(now));
        assert!(search.is_done(now + REQUEST_TIMEOUT + Duration::from_secs(1)));
    }
}
