//! Outstanding-RPC bookkeeping: which transaction ids are awaiting a reply,
//! who they were sent to, and what they were sent *for* (spec §3 "Search":
//! transaction state; spec §5 "Per-request timeout 15s for unanswered
//! RPCs").
//!
//! Every sent query — whether a bare bootstrap ping or a step of an
//! iterative search — gets an entry here so that an incoming reply or
//! error can be matched back to it, and so that a silently-dropped query
//! can be timed out.

use std::collections::HashMap;
use std::time::Instant;

use crate::endpoint::{Endpoint, Family};
use crate::id::Id;
use crate::wire::message::TransactionId;

/// Why a query was sent. The reactor consults this on reply/timeout to
/// decide what to update: routing-table liveness only (`Bootstrap`), or a
/// search's candidate bookkeeping (`SearchStep`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    /// A bare `ping` issued directly (e.g. the `peer`/`ping` control
    /// commands), not part of any search.
    Bootstrap,
    /// One step of an iterative search for `target`.
    SearchStep { target: Id },
}

#[derive(Debug, Clone)]
pub struct PendingQuery {
    /// The id we believe we're querying, when known. `None` for a bare
    /// bootstrap ping sent before any reply has told us the responder's id
    /// (e.g. the `peer`/`ping` control commands against a fresh address).
    pub sender_id_of_target: Option<Id>,
    pub endpoint: Endpoint,
    pub family: Family,
    pub sent_at: Instant,
    pub purpose: Purpose,
}

/// Generates monotonically increasing 2-byte transaction ids, matching the
/// compact `t` field convention used by Mainline implementations.
pub struct TransactionIdGenerator {
    next: u16,
}

impl TransactionIdGenerator {
    pub fn new() -> Self {
        TransactionIdGenerator { next: 0 }
    }

    pub fn next(&mut self) -> TransactionId {
        let id = self.next;
        self.next = self.next.wrapping_add(1);
        id.to_be_bytes().to_vec()
    }
}

impl Default for TransactionIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Table of outstanding queries awaiting a reply, keyed by transaction id.
/// Transaction ids are only unique among *currently* pending queries (spec
/// §4.1: the responder merely echoes what it was sent), so entries are
/// removed as soon as they are resolved or time out.
pub struct TransactionTable {
    pending: HashMap<TransactionId, PendingQuery>,
}

impl TransactionTable {
    pub fn new() -> Self {
        TransactionTable {
            pending: HashMap::new(),
        }
    }

    pub fn insert(&mut self, transaction_id: TransactionId, query: PendingQuery) {
        self.pending.insert(transaction_id, query);
    }

    /// Removes and returns the pending query for `transaction_id` if the
    /// reply also came from the endpoint it was sent to (spec §7
    /// "Protocol-semantic": "reply from unexpected endpoint -> discard
    /// reply; node liveness unchanged").
    pub fn take_if_from(
        &mut self,
        transaction_id: &[u8],
        from: Endpoint,
    ) -> Option<PendingQuery> {
        let query = self.pending.get(transaction_id)?;
        if query.endpoint != from {
            return None;
        }
        self.pending.remove(transaction_id)
    }

    /// Transaction ids that have been outstanding longer than
    /// `REQUEST_TIMEOUT`, removed so the caller can mark the corresponding
    /// node/candidate as having timed out.
    pub fn sweep_timed_out(&mut self, now: Instant) -> Vec<PendingQuery> {
        let timed_out: Vec<TransactionId> = self
            .pending
            .iter()
            .filter(|(_, q)| {
                now.duration_since(q.sent_at) > crate::constants::REQUEST_TIMEOUT
            })
            .map(|(t, _)| t.clone())
            .collect();
        timed_out
            .into_iter()
            .filter_map(|t| self.pending.remove(&t))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Default for TransactionTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn id(byte: u8) -> Id {
        Id::from_bytes([byte; crate::id::ID_LENGTH])
    }

    fn ep() -> Endpoint {
        Endpoint::new("10.0.0.1:6881".parse().unwrap())
    }

    #[test]
    fn generator_produces_distinct_ids() {
        let mut gen = TransactionIdGenerator::new();
        let a = gen.next();
        let b = gen.next();
        assert_ne!(a, b);
    }

    #[test]
    fn reply_from_unexpected_endpoint_is_rejected() {
        let mut table = TransactionTable::new();
        let now = Instant::now();
        table.insert(
            vec![0, 1],
            PendingQuery {
                sender_id_of_target: Some(id(1)),
                endpoint: ep(),
                family: Family::V4,
                sent_at: now,
                purpose: Purpose::Bootstrap,
            },
        );
        let other = Endpoint::new("9.9.9.9:1".parse().unwrap());
        assert!(table.take_if_from(&[0, 1], other).is_none());
        assert_eq!(table.len(), 1);
        assert!(table.take_if_from(&[0, 1], ep()).is_some());
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn sweep_removes_only_timed_out_entries() {
        let mut table = TransactionTable::new();
        let now = Instant::now();
        table.insert(
            vec![0, 1],
            PendingQuery {
                sender_id_of_target: Some(id(1)),
                endpoint: ep(),
                family: Family::V4,
                sent_at: now,
                purpose: Purpose::Bootstrap,
            },
        );
        assert!(table.sweep_timed_out(now).is_empty());
        let later = now + crate::constants::REQUEST_TIMEOUT + Duration::from_secs(1);
        let timed_out = table.sweep_timed_out(later);
        assert_eq!(timed_out.len(), 1);
        assert!(table.is_empty());
    }
}
