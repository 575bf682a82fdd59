//! Inbound/outbound byte counters over a rolling window (spec §3 invariant:
//! "`traffic_in`/`traffic_out` buckets cover exactly the last
//! `TRAFFIC_DURATION_SECONDS` whole seconds").
//!
//! Per REDESIGN FLAGS / SPEC_FULL Supplemented Feature #1: the original
//! daemon swaps the two directions when recording (`record_traffic` stores
//! outbound bytes into the inbound counter and vice versa). This
//! implementation keeps each direction in its own ring.

use std::time::Instant;

use crate::constants::TRAFFIC_DURATION_SECONDS;

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    second: u64,
    bytes: u64,
}

/// A ring of per-second byte counters, read back as a total over the
/// trailing `TRAFFIC_DURATION_SECONDS` window.
#[derive(Debug)]
struct Ring {
    buckets: [Bucket; TRAFFIC_DURATION_SECONDS],
    start: Instant,
}

impl Ring {
    fn new(now: Instant) -> Self {
        Ring {
            buckets: [Bucket::default(); TRAFFIC_DURATION_SECONDS],
            start: now,
        }
    }

    fn second_of(&self, now: Instant) -> u64 {
        now.duration_since(self.start).as_secs()
    }

    fn record(&mut self, now: Instant, bytes: u64) {
        let second = self.second_of(now);
        let idx = (second as usize) % TRAFFIC_DURATION_SECONDS;
        if self.buckets[idx].second != second {
            self.buckets[idx] = Bucket { second, bytes: 0 };
        }
        self.buckets[idx].bytes += bytes;
    }

    fn total(&self, now: Instant) -> u64 {
        let second = self.second_of(now);
        let window_start = second.saturating_sub(TRAFFIC_DURATION_SECONDS as u64 - 1);
        self.buckets
            .iter()
            .filter(|b| b.second >= window_start && b.second <= second)
            .map(|b| b.bytes)
            .sum()
    }
}

/// Inbound and outbound traffic counters, each with its own rolling window.
pub struct TrafficCounters {
    inbound: Ring,
    outbound: Ring,
}

impl TrafficCounters {
    pub fn new(now: Instant) -> Self {
        TrafficCounters {
            inbound: Ring::new(now),
            outbound: Ring::new(now),
        }
    }

    pub fn record_in(&mut self, now: Instant, bytes: u64) {
        self.inbound.record(now, bytes);
    }

    pub fn record_out(&mut self, now: Instant, bytes: u64) {
        self.outbound.record(now, bytes);
    }

    /// Bytes received in the last `TRAFFIC_DURATION_SECONDS` whole seconds.
    pub fn bytes_in(&self, now: Instant) -> u64 {
        self.inbound.total(now)
    }

    /// Bytes sent in the last `TRAFFIC_DURATION_SECONDS` whole seconds.
    pub fn bytes_out(&self, now: Instant) -> u64 {
        self.outbound.total(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn in_and_out_stay_in_their_own_bucket() {
        let start = Instant::now();
        let mut counters = TrafficCounters::new(start);
        counters.record_in(start, 100);
        counters.record_out(start, 7);

        assert_eq!(counters.bytes_in(start), 100);
        assert_eq!(counters.bytes_out(start), 7);
    }

    #[test]
    fn window_drops_samples_older_than_duration() {
        let start = Instant::now();
        let mut counters = TrafficCounters::new(start);
        counters.record_in(start, 50);

        let later = start + Duration::from_secs(TRAFFIC_DURATION_SECONDS as u64 + 1);
        assert_eq!(counters.bytes_in(later), 0);
    }

    #[test]
    fn window_retains_samples_within_duration() {
        let start = Instant::now();
        let mut counters = TrafficCounters::new(start);
        counters.record_in(start, 10);
        let mid = start + Duration::from_secs(2);
        counters.record_in(mid, 20);

        assert_eq!(counters.bytes_in(mid), 30);
    }
}
