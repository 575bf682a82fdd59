//! Locally owned (id, port) bindings and their re-announce schedule (spec
//! §3 "Announcement", §4.4).

use std::time::{Duration, Instant};

use crate::constants::ANNOUNCE_REFRESH_INTERVAL;
use crate::id::Id;

/// `None` stands for "entire process runtime" (spec: `lifetime_deadline =
/// +∞`); such an announcement is never swept by [`AnnounceStore::expire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    Forever,
    Until(Instant),
}

impl Lifetime {
    pub fn from_duration(now: Instant, duration: Option<Duration>) -> Lifetime {
        match duration {
            Some(d) => Lifetime::Until(now + d),
            None => Lifetime::Forever,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        matches!(self, Lifetime::Until(deadline) if *deadline < now)
    }

    /// The longer-lived of `self` and `other` (spec §4.4 Add: "refresh
    /// lifetime only if increasing"). `Forever` always wins.
    fn max(self, other: Lifetime) -> Lifetime {
        match (self, other) {
            (Lifetime::Forever, _) | (_, Lifetime::Forever) => Lifetime::Forever,
            (Lifetime::Until(a), Lifetime::Until(b)) => Lifetime::Until(a.max(b)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Announcement {
    pub id: Id,
    pub port: u16,
    pub lifetime: Lifetime,
    pub refresh_time: Instant,
}

/// Locally owned announcements, kept in insertion order (spec §9: "the only
/// lists requiring preserved insertion order are announcements and
/// results").
pub struct AnnounceStore {
    entries: Vec<Announcement>,
}

impl AnnounceStore {
    pub fn new() -> Self {
        AnnounceStore {
            entries: Vec::new(),
        }
    }

    /// Adds a new announcement, or — if `id` is already tracked — refreshes
    /// its lifetime (only upward) and schedules an immediate refresh (spec
    /// §4.4 Add).
    pub fn add(&mut self, id: Id, port: u16, lifetime: Lifetime, now: Instant) {
        if let Some(existing) = self.entries.iter_mut().find(|a| a.id == id) {
            existing.port = port;
            existing.lifetime = existing.lifetime.max(lifetime);
            existing.refresh_time = now;
            return;
        }
        self.entries.insert(
            0,
            Announcement {
                id,
                port,
                lifetime,
                refresh_time: now,
            },
        );
    }

    pub fn remove(&mut self, id: &Id) {
        self.entries.retain(|a| &a.id != id);
    }

    /// Announcements due for a refresh right now; callers reschedule them
    /// via [`Self::mark_refreshed`] after kicking off the announce search.
    pub fn due_for_refresh(&self, now: Instant) -> Vec<Announcement> {
        self.entries
            .iter()
            .filter(|a| a.refresh_time <= now)
            .cloned()
            .collect()
    }

    pub fn mark_refreshed(&mut self, id: &Id, now: Instant) {
        if let Some(a) = self.entries.iter_mut().find(|a| &a.id == id) {
            a.refresh_time = now + ANNOUNCE_REFRESH_INTERVAL;
        }
    }

    /// Sweeps announcements whose lifetime has elapsed (spec §4.4 Expire
    /// tick, run every minute by the reactor).
    pub fn expire(&mut self, now: Instant) {
        self.entries.retain(|a| !a.lifetime.is_expired(now));
    }

    pub fn iter(&self) -> impl Iterator<Item = &Announcement> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for AnnounceStore {
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

    #[test]
    fn add_is_idempotent_and_refreshes_to_max_lifetime() {
        let now = Instant::now();
        let mut store = AnnounceStore::new();
        store.add(id(1), 6881, Lifetime::Until(now + Duration::from_secs(60)), now);
        store.add(id(1), 6881, Lifetime::Until(now + Duration::from_secs(10)), now);
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.entries[0].lifetime,
            Lifetime::Until(now + Duration::from_secs(60))
        );

        store.add(id(1), 6881, Lifetime::Until(now + Duration::from_secs(600)), now);
        assert_eq!(
            store.entries[0].lifetime,
            Lifetime::Until(now + Duration::from_secs(600))
        );
    }

    #[test]
    fn forever_lifetime_is_never_expired() {
        let now = Instant::now();
        let mut store = AnnounceStore::new();
        store.add(id(1), 6881, Lifetime::Forever, now);
        store.expire(now + Duration::from_secs(1_000_000));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn expired_announcement_is_removed() {
        let now = Instant::now();
        let mut store = AnnounceStore::new();
        store.add(id(1), 6881, Lifetime::Until(now + Duration::from_secs(5)), now);
        store.expire(now + Duration::from_secs(10));
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn remove_is_idempotent() {
        let now = Instant::now();
        let mut store = AnnounceStore::new();
        store.add(id(1), 6881, Lifetime::Forever, now);
        store.remove(&id(1));
        store.remove(&id(1));
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn due_for_refresh_and_reschedule() {
        let now = Instant::now();
        let mut store = AnnounceStore::new();
        store.add(id(1), 6881, Lifetime::Forever, now);
        assert_eq!(store.due_for_refresh(now).len(), 1);

        store.mark_refreshed(&id(1), now);
        assert_eq!(store.due_for_refresh(now).len(), 0);
        assert_eq!(
            store.due_for_refresh(now + ANNOUNCE_REFRESH_INTERVAL).len(),
            1
        );
    }
}
