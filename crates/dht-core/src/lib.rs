//! Kademlia routing, lookup and announce engine for a standalone,
//! Mainline-BitTorrent-DHT-compatible node.
//!
//! This crate owns every piece of mutable DHT state — the routing table,
//! in-flight searches, announcements, received storage, the blocklist and
//! traffic counters — behind a single [`controller::Controller`], plus the
//! [`reactor`] that drives it. Binding sockets, parsing CLI/config input,
//! spawning the external result hook, and peerfile I/O are left to the
//! `dhtd` binary crate (spec §1's out-of-scope external collaborators);
//! this crate touches the filesystem nowhere and only opens the sockets
//! handed to it.

pub mod announce;
pub mod blocklist;
pub mod bucket;
pub mod constants;
pub mod control;
pub mod controller;
pub mod endpoint;
pub mod id;
pub mod node;
pub mod reactor;
pub mod results;
pub mod routing_table;
pub mod search;
pub mod storage;
pub mod traffic;
pub mod transaction;
pub mod transport;
pub mod wire;

pub use controller::{Controller, FatalError, SearchStartOutcome};
pub use endpoint::{Contact, Endpoint, Family};
pub use id::Id;
