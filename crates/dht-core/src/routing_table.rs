//! The dual-stack routing table: two independent, ordered lists of
//! [`Bucket`]s, one per address family (spec §4.2).

use std::time::Instant;

use rand::RngCore;

use crate::bucket::{Bucket, Insert};
use crate::constants::{BUCKET_STALE_AFTER, K, K_SEARCH};
use crate::endpoint::{Contact, Endpoint, Family};
use crate::id::Id;
use crate::node::Node;

pub struct RoutingTable {
    local_id: Id,
    v4: Vec<Bucket>,
    v6: Vec<Bucket>,
}

/// How a node was handled by [`RoutingTable::insert`].
#[derive(Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Replaced,
    CachedAsReplacement,
    /// The node is the local id; routing tables never hold themselves.
    IsSelf,
}

impl RoutingTable {
    pub fn new(local_id: Id, now: Instant) -> Self {
        RoutingTable {
            local_id,
            v4: vec![Bucket::whole_range(now)],
            v6: vec![Bucket::whole_range(now)],
        }
    }

    fn buckets(&self, family: Family) -> &Vec<Bucket> {
        match family {
            Family::V4 => &self.v4,
            Family::V6 => &self.v6,
        }
    }

    fn buckets_mut(&mut self, family: Family) -> &mut Vec<Bucket> {
        match family {
            Family::V4 => &mut self.v4,
            Family::V6 => &mut self.v6,
        }
    }

    fn index_containing(buckets: &[Bucket], id: &Id) -> usize {
        buckets
            .iter()
            .position(|b| b.contains_range(id))
            .expect("bucket ranges must cover the entire id space")
    }

    /// A bucket is eligible for splitting if it holds the local id or sits
    /// within two positions of the bucket that does (spec §4.2: "split is
    /// allowed only along the local-id path").
    fn is_own_bucket(local_id: &Id, buckets: &[Bucket], idx: usize) -> bool {
        let own_idx = Self::index_containing(buckets, local_id);
        (idx as isize - own_idx as isize).abs() <= 2
    }

    pub fn insert(
        &mut self,
        id: Id,
        endpoint: Endpoint,
        now: Instant,
    ) -> InsertOutcome {
        if id == self.local_id {
            return InsertOutcome::IsSelf;
        }
        let family = endpoint.family();
        let local_id = self.local_id;

        loop {
            let buckets = self.buckets_mut(family);
            let idx = Self::index_containing(buckets, &id);
            let own_bucket = Self::is_own_bucket(&local_id, buckets, idx);

            match buckets[idx].insert(id, endpoint, now, own_bucket) {
                Insert::Inserted => return InsertOutcome::Inserted,
                Insert::Replaced => return InsertOutcome::Replaced,
                Insert::CachedAsReplacement => return InsertOutcome::CachedAsReplacement,
                Insert::NeedsSplit => {
                    if !buckets[idx].is_splittable() {
                        // Range can't be divided further; behave as a full
                        // foreign bucket instead of looping forever.
                        buckets[idx].replacement = Some(Node::new(id, endpoint));
                        return InsertOutcome::CachedAsReplacement;
                    }
                    let removed = buckets.remove(idx);
                    let (lower, upper) = removed.split(now);
                    buckets.insert(idx, upper);
                    buckets.insert(idx, lower);
                    // retry against the freshly split buckets
                }
            }
        }
    }

    pub fn mark_replied(&mut self, id: &Id, family: Family, now: Instant) {
        let buckets = self.buckets_mut(family);
        let idx = Self::index_containing(buckets, id);
        if let Some(node) = buckets[idx].find_mut(id) {
            node.on_reply(now);
        }
    }

    pub fn mark_ping_sent(&mut self, id: &Id, family: Family, now: Instant) {
        let buckets = self.buckets_mut(family);
        let idx = Self::index_containing(buckets, id);
        if let Some(node) = buckets[idx].find_mut(id) {
            node.on_ping_sent(now);
        }
    }

    pub fn mark_ping_failed(&mut self, id: &Id, family: Family) {
        let buckets = self.buckets_mut(family);
        let idx = Self::index_containing(buckets, id);
        if let Some(node) = buckets[idx].find_mut(id) {
            node.on_ping_timeout();
        }
    }

    /// The up-to-`k` nodes of `family` closest to `target` by XOR distance.
    pub fn closest(&self, target: &Id, k: usize, family: Family) -> Vec<Contact> {
        let mut all: Vec<&Node> = self
            .buckets(family)
            .iter()
            .flat_map(|b| b.nodes.iter())
            .collect();
        all.sort_by_key(|n| n.id.distance(target));
        all.into_iter()
            .take(k)
            .map(|n| Contact::new(n.id, n.endpoint))
            .collect()
    }

    /// Convenience wrapper returning the default search-width closest set.
    pub fn closest_for_search(&self, target: &Id, family: Family) -> Vec<Contact> {
        self.closest(target, K_SEARCH, family)
    }

    pub fn node_count(&self, family: Family) -> usize {
        self.buckets(family).iter().map(|b| b.nodes.len()).sum()
    }

    pub fn bucket_count(&self, family: Family) -> usize {
        self.buckets(family).len()
    }

    /// Buckets unchanged for longer than [`BUCKET_STALE_AFTER`], paired with
    /// a random id drawn from their range: the target for a refreshing
    /// `find_node` lookup (spec §4.2, "stale buckets").
    pub fn stale_bucket_targets(&self, now: Instant, family: Family) -> Vec<Id> {
        self.buckets(family)
            .iter()
            .filter(|b| now.duration_since(b.last_changed) > BUCKET_STALE_AFTER)
            .map(|b| random_id_in_range(&b.first, b.next.as_ref()))
            .collect()
    }

    pub fn local_id(&self) -> Id {
        self.local_id
    }

    /// Total node capacity across all buckets (bucket_count * K); used by
    /// the `constants`/`status` introspection commands.
    pub fn capacity(&self, family: Family) -> usize {
        self.buckets(family).len() * K
    }

    /// Every node currently held in `family`'s buckets, for the `peers`
    /// control command. Order follows bucket order, not any liveness or
    /// distance ranking.
    pub fn nodes(&self, family: Family) -> Vec<&Node> {
        self.buckets(family).iter().flat_map(|b| b.nodes.iter()).collect()
    }

    /// Nodes due for a direct liveness ping (spec §4.2 "Mark bad/ping":
    /// "after 15 minutes of silence, a node may be pinged"), as opposed to
    /// the bucket-wide `find_node` refresh in [`Self::stale_bucket_targets`].
    pub fn nodes_needing_ping(&self, now: Instant, family: Family) -> Vec<Contact> {
        self.buckets(family)
            .iter()
            .flat_map(|b| b.nodes.iter())
            .filter(|n| n.needs_ping(now))
            .map(|n| Contact::new(n.id, n.endpoint))
            .collect()
    }

    /// One summary row per bucket, for the `buckets` control command.
    pub fn bucket_summaries(&self, family: Family) -> Vec<BucketSummary> {
        self.buckets(family)
            .iter()
            .map(|b| BucketSummary {
                first: b.first,
                next: b.next,
                node_count: b.nodes.len(),
                last_changed: b.last_changed,
            })
            .collect()
    }
}

/// One bucket's range and occupancy, detached from the live [`Bucket`] for
/// read-only introspection.
#[derive(Debug, Clone)]
pub struct BucketSummary {
    pub first: Id,
    pub next: Option<Id>,
    pub node_count: usize,
    pub last_changed: Instant,
}

fn random_id_in_range(first: &Id, next: Option<&Id>) -> Id {
    // Cheap rejection sampling: ranges are bucket-sized, so this converges
    // immediately in practice and is bounded in the worst case by id width.
    let mut rng = rand::thread_rng();
    loop {
        let mut bytes = [0u8; crate::id::ID_LENGTH];
        rng.fill_bytes(&mut bytes);
        let candidate = Id::from_bytes(bytes);
        if candidate.in_range(first, next) {
            return candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v4(i: u8) -> Endpoint {
        Endpoint::new(([10, 0, 0, i], 6881u16).into())
    }

    #[test]
    fn inserts_until_split_then_keeps_accepting() {
        let local = Id::random();
        let mut table = RoutingTable::new(local, Instant::now());
        for i in 0..64u8 {
            table.insert(Id::random(), v4(i), Instant::now());
        }
        assert!(table.bucket_count(Family::V4) >= 1);
        assert!(table.node_count(Family::V4) <= table.capacity(Family::V4));
    }

    #[test]
    fn refuses_to_store_local_id() {
        let local = Id::random();
        let mut table = RoutingTable::new(local, Instant::now());
        let outcome = table.insert(local, v4(1), Instant::now());
        assert_eq!(outcome, InsertOutcome::IsSelf);
        assert_eq!(table.node_count(Family::V4), 0);
    }

    #[test]
    fn closest_returns_sorted_by_distance() {
        let local = Id::random();
        let mut table = RoutingTable::new(local, Instant::now());
        let mut ids = Vec::new();
        for i in 0..8u8 {
            let id = Id::random();
            ids.push(id);
            table.insert(id, v4(i), Instant::now());
        }
        let target = Id::random();
        let closest = table.closest(&target, 4, Family::V4);
        assert!(closest.len() <= 4);
        for pair in closest.windows(2) {
            assert!(pair[0].id.distance(&target) <= pair[1].id.distance(&target));
        }
    }

    #[test]
    fn v4_and_v6_tables_are_independent() {
        let local = Id::random();
        let mut table = RoutingTable::new(local, Instant::now());
        table.insert(
            Id::random(),
            Endpoint::new("[::1]:6881".parse().unwrap()),
            Instant::now(),
        );
        assert_eq!(table.node_count(Family::V4), 0);
        assert_eq!(table.node_count(Family::V6), 1);
    }
}
