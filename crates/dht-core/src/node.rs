//! Routing-table entries and their liveness classification (spec §3, Node).

use std::time::{Duration, Instant};

use crate::constants::{NODE_BAD_PING_THRESHOLD, NODE_LIVENESS_WINDOW};
use crate::endpoint::Endpoint;
use crate::id::Id;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Good,
    Questionable,
    Bad,
}

/// A single routing-table entry.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: Id,
    pub endpoint: Endpoint,
    pub pinged_count: u32,
    pub last_reply: Option<Instant>,
    pub last_pinged: Option<Instant>,
}

impl Node {
    pub fn new(id: Id, endpoint: Endpoint) -> Self {
        Node {
            id,
            endpoint,
            pinged_count: 0,
            last_reply: None,
            last_pinged: None,
        }
    }

    /// Call when any reply (to a ping or any other query) is received from this node.
    pub fn on_reply(&mut self, now: Instant) {
        self.last_reply = Some(now);
        self.pinged_count = 0;
    }

    pub fn on_ping_sent(&mut self, now: Instant) {
        self.last_pinged = Some(now);
    }

    /// Call when a ping sent to this node times out unanswered.
    pub fn on_ping_timeout(&mut self) {
        self.pinged_count = self.pinged_count.saturating_add(1);
    }

    pub fn liveness(&self, now: Instant) -> Liveness {
        if self.is_bad() {
            return Liveness::Bad;
        }
        match self.last_reply {
            Some(t) if now.duration_since(t) < NODE_LIVENESS_WINDOW => Liveness::Good,
            _ => Liveness::Questionable,
        }
    }

    pub fn is_good(&self, now: Instant) -> bool {
        self.liveness(now) == Liveness::Good
    }

    pub fn is_bad(&self) -> bool {
        self.pinged_count >= NODE_BAD_PING_THRESHOLD
    }

    /// Whether this node is due for a liveness ping: questionable and not
    /// pinged again too recently.
    pub fn needs_ping(&self, now: Instant) -> bool {
        if self.is_bad() {
            return false;
        }
        if self.is_good(now) {
            return false;
        }
        match self.last_pinged {
            Some(t) => now.duration_since(t) > Duration::from_secs(5),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Endpoint {
        Endpoint::new("1.2.3.4:6881".parse().unwrap())
    }

    #[test]
    fn fresh_node_is_questionable_until_reply() {
        let node = Node::new(Id::random(), endpoint());
        assert_eq!(node.liveness(Instant::now()), Liveness::Questionable);
    }

    #[test]
    fn node_is_good_right_after_reply() {
        let mut node = Node::new(Id::random(), endpoint());
        node.on_reply(Instant::now());
        assert_eq!(node.liveness(Instant::now()), Liveness::Good);
    }

    #[test]
    fn node_becomes_bad_after_three_unanswered_pings() {
        let mut node = Node::new(Id::random(), endpoint());
        node.on_reply(Instant::now());
        node.on_ping_timeout();
        node.on_ping_timeout();
        assert!(!node.is_bad());
        node.on_ping_timeout();
        assert!(node.is_bad());
        assert_eq!(node.liveness(Instant::now()), Liveness::Bad);
    }

    #[test]
    fn reply_resets_ping_failures() {
        let mut node = Node::new(Id::random(), endpoint());
        node.on_ping_timeout();
        node.on_ping_timeout();
        node.on_reply(Instant::now());
        assert_eq!(node.pinged_count, 0);
    }
}
