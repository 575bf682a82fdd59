//! A single k-bucket: a contiguous half-open slice of id-space holding at
//! most `K` nodes, plus one cached replacement candidate (spec §4.2).

use std::time::Instant;

use crate::constants::K;
use crate::endpoint::Endpoint;
use crate::id::Id;
use crate::node::{Liveness, Node};

#[derive(Debug)]
pub struct Bucket {
    /// Inclusive lower bound of this bucket's range.
    pub first: Id,
    /// Exclusive upper bound; `None` means the range runs to 2^160.
    pub next: Option<Id>,
    pub nodes: Vec<Node>,
    pub replacement: Option<Node>,
    pub last_changed: Instant,
}

pub enum Insert {
    /// The node was added or updated in place.
    Inserted,
    /// A bad node was evicted in favor of the new one.
    Replaced,
    /// The bucket is full of good nodes; the new node was cached as a
    /// replacement candidate and ordinary insertion is not possible without
    /// a split.
    CachedAsReplacement,
    /// The bucket needs to be split before this node can be considered.
    NeedsSplit,
}

impl Bucket {
    pub fn whole_range(now: Instant) -> Bucket {
        Bucket {
            first: Id::ZERO,
            next: None,
            nodes: Vec::with_capacity(K),
            replacement: None,
            last_changed: now,
        }
    }

    pub fn contains_range(&self, id: &Id) -> bool {
        id.in_range(&self.first, self.next.as_ref())
    }

    pub fn is_full(&self) -> bool {
        self.nodes.len() >= K
    }

    pub fn find_mut(&mut self, id: &Id) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| &n.id == id)
    }

    pub fn index_of_bad(&self, now: Instant) -> Option<usize> {
        self.nodes
            .iter()
            .position(|n| n.liveness(now) == Liveness::Bad)
    }

    /// Attempts to insert or refresh `id`/`endpoint` in this bucket.
    /// `own_bucket` tells the caller whether this bucket holds the local id
    /// (or is close enough to it to be eligible for splitting).
    pub fn insert(&mut self, id: Id, endpoint: Endpoint, now: Instant, own_bucket: bool) -> Insert {
        if let Some(existing) = self.find_mut(&id) {
            existing.endpoint = endpoint;
            return Insert::Inserted;
        }

        if !self.is_full() {
            self.nodes.push(Node::new(id, endpoint));
            self.last_changed = now;
            return Insert::Inserted;
        }

        if let Some(idx) = self.index_of_bad(now) {
            self.nodes[idx] = Node::new(id, endpoint);
            self.last_changed = now;
            return Insert::Replaced;
        }

        if own_bucket {
            return Insert::NeedsSplit;
        }

        self.replacement = Some(Node::new(id, endpoint));
        Insert::CachedAsReplacement
    }

    /// Splits this bucket at its midpoint, redistributing its nodes and
    /// cached replacement between the two halves. Only valid when the range
    /// spans more than one id.
    pub fn split(self, now: Instant) -> (Bucket, Bucket) {
        let mid = Id::midpoint(&self.first, self.next.as_ref());

        let mut lower = Bucket {
            first: self.first,
            next: Some(mid),
            nodes: Vec::with_capacity(K),
            replacement: None,
            last_changed: now,
        };
        let mut upper = Bucket {
            first: mid,
            next: self.next,
            nodes: Vec::with_capacity(K),
            replacement: None,
            last_changed: now,
        };

        for node in self.nodes {
            if node.id < mid {
                lower.nodes.push(node);
            } else {
                upper.nodes.push(node);
            }
        }
        if let Some(replacement) = self.replacement {
            if replacement.id < mid {
                lower.replacement = Some(replacement);
            } else {
                upper.replacement = Some(replacement);
            }
        }

        (lower, upper)
    }

    /// Range spans at least two distinct ids, so a split is meaningful.
    pub fn is_splittable(&self) -> bool {
        Id::midpoint(&self.first, self.next.as_ref()) != self.first
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Endpoint {
        Endpoint::new("1.2.3.4:6881".parse().unwrap())
    }

    #[test]
    fn fills_up_to_k() {
        let mut bucket = Bucket::whole_range(Instant::now());
        for _ in 0..K {
            let outcome = bucket.insert(Id::random(), endpoint(), Instant::now(), true);
            assert!(matches!(outcome, Insert::Inserted));
        }
        assert!(bucket.is_full());
    }

    #[test]
    fn full_own_bucket_requests_split() {
        let mut bucket = Bucket::whole_range(Instant::now());
        for _ in 0..K {
            bucket.insert(Id::random(), endpoint(), Instant::now(), true);
        }
        let outcome = bucket.insert(Id::random(), endpoint(), Instant::now(), true);
        assert!(matches!(outcome, Insert::NeedsSplit));
    }

    #[test]
    fn full_foreign_bucket_caches_replacement() {
        let mut bucket = Bucket::whole_range(Instant::now());
        for _ in 0..K {
            bucket.insert(Id::random(), endpoint(), Instant::now(), false);
        }
        let outcome = bucket.insert(Id::random(), endpoint(), Instant::now(), false);
        assert!(matches!(outcome, Insert::CachedAsReplacement));
        assert!(bucket.replacement.is_some());
    }

    #[test]
    fn split_partitions_by_midpoint() {
        let now = Instant::now();
        let mut bucket = Bucket::whole_range(now);
        let mid = Id::midpoint(&bucket.first, bucket.next.as_ref());
        let mut low_bytes = [0u8; 20];
        low_bytes[0] = 0x10;
        let mut high_bytes = [0u8; 20];
        high_bytes[0] = 0xf0;

        bucket.nodes.push(Node::new(Id::from_bytes(low_bytes), endpoint()));
        bucket.nodes.push(Node::new(Id::from_bytes(high_bytes), endpoint()));

        let (lower, upper) = bucket.split(now);
        assert_eq!(lower.next, Some(mid));
        assert_eq!(upper.first, mid);
        assert_eq!(lower.nodes.len(), 1);
        assert_eq!(upper.nodes.len(), 1);
        assert!(lower.nodes[0].id < mid);
        assert!(upper.nodes[0].id >= mid);
    }
}
