//! Tunables named throughout spec.md. Kept in one place so `constants`
//! introspection (spec §9, Supplemented Features #2) can print them.

use std::time::Duration;

/// Default DHT UDP port.
pub const DEFAULT_DHT_PORT: u16 = 6881;

/// Default path for the local control socket.
pub const DEFAULT_CONTROL_SOCKET_PATH: &str = "/tmp/dhtd.sock";

/// Maximum datagram size we'll attempt to decode.
pub const MAX_PACKET_SIZE: usize = 1500;

/// Bucket capacity (K in the glossary).
pub const K: usize = 8;

/// Per-search candidate list width (K_search).
pub const K_SEARCH: usize = 14;

/// Maximum concurrent in-flight requests per search (alpha).
pub const ALPHA: usize = 3;

/// A node is good if its last reply is within this window.
pub const NODE_LIVENESS_WINDOW: Duration = Duration::from_secs(15 * 60);

/// A node becomes bad after this many unanswered pings.
pub const NODE_BAD_PING_THRESHOLD: u32 = 3;

/// Per-RPC timeout for an unanswered query.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Wall-clock lifetime of a search.
pub const SEARCH_EXPIRE_TIME: Duration = Duration::from_secs(62 * 60);

/// How often a stale bucket is refreshed with a random-target find_node.
pub const BUCKET_REFRESH_INTERVAL: Duration = Duration::from_secs(6 * 60);

/// A bucket is stale (eligible for refresh) if unchanged for this long.
pub const BUCKET_STALE_AFTER: Duration = Duration::from_secs(10 * 60);

/// Announcement re-announce interval.
pub const ANNOUNCE_REFRESH_INTERVAL: Duration = Duration::from_secs(20 * 60);

/// How often expired announcements are swept.
pub const ANNOUNCE_EXPIRE_INTERVAL: Duration = Duration::from_secs(60);

/// Token secret rotation period.
pub const TOKEN_ROTATION_PERIOD: Duration = Duration::from_secs(10 * 60);

/// Maximum accumulated results per search.
pub const MAX_RESULTS_PER_SEARCH: usize = 500;

/// Maximum distinct info-hashes tracked in the received-announcement storage.
pub const DHT_MAX_HASHES: usize = 16384;

/// Maximum peers tracked per info-hash in storage.
pub const DHT_MAX_PEERS: usize = 2048;

/// Capacity of the blocklist ring.
pub const DHT_MAX_BLACKLISTED: usize = 10;

/// Width of the traffic-counter ring, in whole seconds.
pub const TRAFFIC_DURATION_SECONDS: usize = 8;

/// Reactor maintenance tick granularity (spec §4.7).
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);
