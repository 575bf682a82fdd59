//! The owning object: every module-level piece of state the original
//! daemon kept as globals (`gconf`, the bucket-list roots, the
//! announcement/search/result list heads, the blocklist ring) lives here
//! instead, passed through every handler by explicit reference (spec §9,
//! "Global mutable state -> controller object").

use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

use tracing::{debug, warn};

use crate::announce::{AnnounceStore, Lifetime};
use crate::blocklist::Blocklist;
use crate::constants::{ANNOUNCE_EXPIRE_INTERVAL, BUCKET_REFRESH_INTERVAL, K};
use crate::endpoint::{Contact, Endpoint, Family};
use crate::id::Id;
use crate::results::ResultStore;
use crate::routing_table::RoutingTable;
use crate::search::{Search, SearchKind, SearchTable};
use crate::storage::Storage;
use crate::traffic::TrafficCounters;
use crate::transaction::{PendingQuery, Purpose, TransactionIdGenerator, TransactionTable};
use crate::transport::UdpTransport;
use crate::wire::message::{Query, ResponsePayload};
use crate::wire::token::TokenAuthority;
use crate::wire::Message;

/// Ties together every DHT subsystem plus the UDP transport. Mutated only
/// from reactor handlers (spec §5 "Shared-resource policy").
pub struct Controller {
    local_id: Id,
    dht_port: u16,
    version: String,
    listen_family: String,
    bind_addr: Option<IpAddr>,
    start_time: Instant,
    routing_table: RoutingTable,
    searches: SearchTable,
    transactions: TransactionTable,
    txid_gen: TransactionIdGenerator,
    announcements: AnnounceStore,
    results: ResultStore,
    storage: Storage,
    blocklist: Blocklist,
    traffic: TrafficCounters,
    tokens: TokenAuthority,
    transport: UdpTransport,
    next_bucket_refresh: Instant,
    next_announce_expire: Instant,
    malformed_packets: u64,
}

impl Controller {
    /// `version` and `listen_family` are opaque display strings supplied by
    /// the binary crate (spec §1: the control protocol's presentation is an
    /// external collaborator) — matching `kad_status`'s `dhtd_version_str`
    /// and `str_af(gconf->af)` lines (`original_source/src/kad.c`).
    pub fn new(
        local_id: Id,
        dht_port: u16,
        version: String,
        listen_family: String,
        bind_addr: Option<IpAddr>,
        transport: UdpTransport,
        now: Instant,
    ) -> Self {
        Controller {
            local_id,
            dht_port,
            version,
            listen_family,
            bind_addr,
            start_time: now,
            routing_table: RoutingTable::new(local_id, now),
            searches: SearchTable::new(),
            transactions: TransactionTable::new(),
            txid_gen: TransactionIdGenerator::new(),
            announcements: AnnounceStore::new(),
            results: ResultStore::new(),
            storage: Storage::new(),
            blocklist: Blocklist::new(),
            traffic: TrafficCounters::new(now),
            tokens: TokenAuthority::new(now),
            transport,
            next_bucket_refresh: now + BUCKET_REFRESH_INTERVAL,
            next_announce_expire: now + ANNOUNCE_EXPIRE_INTERVAL,
            malformed_packets: 0,
        }
    }

    pub fn local_id(&self) -> Id {
        self.local_id
    }

    pub fn set_result_hook(&mut self, hook: std::sync::Arc<dyn crate::results::ResultHook>) {
        self.results.set_hook(hook);
    }

    // ---- outbound queries -------------------------------------------------

    async fn send_query(
        &mut self,
        endpoint: Endpoint,
        family: Family,
        query: Query,
        purpose: Purpose,
        sender_id_of_target: Option<Id>,
        now: Instant,
    ) {
        let transaction_id = self.txid_gen.next();
        let message = Message::Query {
            transaction_id: transaction_id.clone(),
            sender_id: self.local_id,
            query,
        };
        let bytes = message.encode();
        self.transport
            .send_to(endpoint, &bytes, &mut self.traffic, now)
            .await;
        self.transactions.insert(
            transaction_id,
            PendingQuery {
                sender_id_of_target,
                endpoint,
                family,
                sent_at: now,
                purpose,
            },
        );
    }

    async fn send_response(&mut self, endpoint: Endpoint, message: Message, now: Instant) {
        let bytes = message.encode();
        self.transport
            .send_to(endpoint, &bytes, &mut self.traffic, now)
            .await;
    }

    /// Sends a bare `ping`, e.g. for the `peer`/`ping` control commands
    /// (spec §4.8). The responding node is only added to the routing table
    /// once its reply arrives.
    pub async fn ping(&mut self, addr: SocketAddr, now: Instant) {
        let endpoint = Endpoint::new(addr);
        let family = endpoint.family();
        self.send_query(endpoint, family, Query::Ping, Purpose::Bootstrap, None, now)
            .await;
    }

    pub async fn block(&mut self, addr: SocketAddr) {
        self.blocklist.block(Endpoint::new(addr));
    }

    /// Waits for the next inbound datagram on either bound socket. Thin
    /// wrapper so the reactor doesn't need to reach into transport/traffic
    /// fields directly.
    pub async fn recv_datagram(
        &mut self,
        now: Instant,
    ) -> std::io::Result<(Vec<u8>, SocketAddr, Family)> {
        self.transport.recv(&mut self.traffic, now).await
    }

    // ---- inbound datagrams --------------------------------------------------

    pub async fn handle_datagram(&mut self, bytes: &[u8], from: SocketAddr, family: Family, now: Instant) {
        let endpoint = Endpoint::new(from);
        let message = match Message::decode(bytes, family) {
            Ok(m) => m,
            Err(err) => {
                self.malformed_packets += 1;
                debug!(%endpoint, %err, "dropping malformed datagram");
                return;
            }
        };

        match message {
            Message::Query {
                transaction_id,
                sender_id,
                query,
            } => self.handle_query(transaction_id, sender_id, query, endpoint, family, now).await,
            Message::Response {
                transaction_id,
                payload,
            } => self.handle_response(transaction_id, payload, endpoint, family, now).await,
            Message::Error { code, message, .. } => {
                debug!(%endpoint, code, %message, "peer returned a KRPC error");
            }
        }
    }

    async fn handle_query(
        &mut self,
        transaction_id: Vec<u8>,
        sender_id: Id,
        query: Query,
        from: Endpoint,
        family: Family,
        now: Instant,
    ) {
        if self.blocklist.contains(&from) {
            return;
        }
        self.routing_table.insert(sender_id, from, now);

        let response = match query {
            Query::Ping => Message::Response {
                transaction_id,
                payload: ResponsePayload {
                    responder_id: self.local_id,
                    nodes: Vec::new(),
                    values: Vec::new(),
                    token: None,
                },
            },
            Query::FindNode { target } => Message::Response {
                transaction_id,
                payload: ResponsePayload {
                    responder_id: self.local_id,
                    nodes: self.routing_table.closest(&target, K, family),
                    values: Vec::new(),
                    token: None,
                },
            },
            Query::GetPeers { info_hash } => {
                let token = self.tokens.issue(&from);
                let peers = self.storage.peers_for(&info_hash);
                let (nodes, values) = if peers.is_empty() {
                    (self.routing_table.closest(&info_hash, K, family), Vec::new())
                } else {
                    (Vec::new(), peers)
                };
                Message::Response {
                    transaction_id,
                    payload: ResponsePayload {
                        responder_id: self.local_id,
                        nodes,
                        values,
                        token: Some(token),
                    },
                }
            }
            Query::AnnouncePeer {
                info_hash,
                port,
                token,
            } => {
                if self.tokens.verify(&from, &token) {
                    let announced = Endpoint::new(SocketAddr::new(from.addr.ip(), port));
                    self.storage.announce(info_hash, announced);
                    Message::Response {
                        transaction_id,
                        payload: ResponsePayload {
                            responder_id: self.local_id,
                            nodes: Vec::new(),
                            values: Vec::new(),
                            token: None,
                        },
                    }
                } else {
                    warn!(%from, "rejecting announce_peer with bad token");
                    Message::Error {
                        transaction_id,
                        code: 203,
                        message: "Bad token".to_string(),
                    }
                }
            }
        };
        self.send_response(from, response, now).await;
    }

    async fn handle_response(
        &mut self,
        transaction_id: Vec<u8>,
        payload: ResponsePayload,
        from: Endpoint,
        family: Family,
        now: Instant,
    ) {
        if self.blocklist.contains(&from) {
            return;
        }
        let Some(pending) = self.transactions.take_if_from(&transaction_id, from) else {
            debug!(%from, "discarding reply for unknown or mismatched transaction");
            return;
        };

        self.routing_table.insert(payload.responder_id, from, now);
        self.routing_table.mark_replied(&payload.responder_id, family, now);

        if let Purpose::SearchStep { target } = pending.purpose {
            if let Some(search) = self.searches.get_mut(&target, pending.family) {
                search.mark_replied(&payload.responder_id, now, payload.token.clone());
                if !payload.nodes.is_empty() {
                    search.merge(payload.nodes.clone());
                }
            }
            for contact in &payload.nodes {
                self.routing_table.insert(contact.id, contact.endpoint, now);
            }
            for peer_endpoint in &payload.values {
                self.results.insert(target, *peer_endpoint);
            }
        }
    }

    // ---- periodic maintenance ------------------------------------------------

    /// Runs one reactor tick's worth of maintenance: transaction timeouts,
    /// driving in-flight searches forward, completing/expiring searches
    /// (firing announce_peer rounds along the way), announcement
    /// refresh/expiry, and stale-bucket refresh lookups (spec §4.7).
    pub async fn tick(&mut self, now: Instant) {
        self.tokens.maybe_rotate(now);
        self.sweep_timed_out_transactions(now);
        self.ping_questionable_nodes(now).await;
        self.drive_searches(now).await;
        self.finish_done_searches(now).await;
        self.refresh_announcements(now).await;
        if now >= self.next_announce_expire {
            self.announcements.expire(now);
            self.next_announce_expire = now + ANNOUNCE_EXPIRE_INTERVAL;
        }
        if now >= self.next_bucket_refresh {
            self.refresh_stale_buckets(now);
            self.next_bucket_refresh = now + BUCKET_REFRESH_INTERVAL;
        }
    }

    fn sweep_timed_out_transactions(&mut self, now: Instant) {
        for pending in self.transactions.sweep_timed_out(now) {
            if let Some(id) = pending.sender_id_of_target {
                self.routing_table.mark_ping_failed(&id, pending.family);
            }
        }
    }

    /// Pings questionable nodes directly, independent of any search (spec
    /// §4.2 "Mark bad/ping"). A node that never answers is marked bad by
    /// [`Self::sweep_timed_out_transactions`] once the ping times out;
    /// after [`crate::constants::NODE_BAD_PING_THRESHOLD`] such failures
    /// it becomes evictable.
    async fn ping_questionable_nodes(&mut self, now: Instant) {
        for family in [Family::V4, Family::V6] {
            for contact in self.routing_table.nodes_needing_ping(now, family) {
                self.routing_table.mark_ping_sent(&contact.id, family, now);
                self.send_query(
                    contact.endpoint,
                    family,
                    Query::Ping,
                    Purpose::Bootstrap,
                    Some(contact.id),
                    now,
                )
                .await;
            }
        }
    }

    async fn drive_searches(&mut self, now: Instant) {
        let keys: Vec<(Id, Family)> = self.searches.iter().map(|s| (s.target, s.family)).collect();
        for (target, family) in keys {
            loop {
                let Some(search) = self.searches.get(&target, family) else {
                    break;
                };
                let Some(candidate_id) = search.next_to_query(now) else {
                    break;
                };
                let Some(endpoint) = search.candidate_endpoint(&candidate_id) else {
                    break;
                };
                let query = match search.kind {
                    SearchKind::FindNode => Query::FindNode { target },
                    SearchKind::GetPeers => Query::GetPeers { info_hash: target },
                };

                if let Some(search) = self.searches.get_mut(&target, family) {
                    search.mark_pinged(&candidate_id, now);
                }
                self.send_query(
                    endpoint,
                    family,
                    query,
                    Purpose::SearchStep { target },
                    Some(candidate_id),
                    now,
                )
                .await;
            }
        }
    }

    async fn finish_done_searches(&mut self, now: Instant) {
        let done_keys: Vec<(Id, Family)> = self
            .searches
            .iter()
            .filter(|s| s.is_done(now))
            .map(|s| (s.target, s.family))
            .collect();

        for (target, family) in &done_keys {
            let (port_to_announce, acked) = {
                let search = self
                    .searches
                    .get(target, *family)
                    .expect("key came from iter()");
                (search.port_to_announce, search.acked_candidates())
            };
            if let Some(port) = port_to_announce {
                for (candidate_id, endpoint, token) in acked {
                    self.send_query(
                        endpoint,
                        endpoint.family(),
                        Query::AnnouncePeer {
                            info_hash: *target,
                            port,
                            token,
                        },
                        Purpose::Bootstrap,
                        Some(candidate_id),
                        now,
                    )
                    .await;
                }
            }
            self.results.clear(target);
        }
        self.searches.sweep_done(now);
    }

    async fn refresh_announcements(&mut self, now: Instant) {
        let due = self.announcements.due_for_refresh(now);
        for announcement in due {
            let mut started_any = false;
            for family in [Family::V4, Family::V6] {
                if self.routing_table.node_count(family) == 0 {
                    continue;
                }
                if self.searches.contains(&announcement.id, family) {
                    // an announce/lookup for this id and family is already
                    // running; let it finish before starting another.
                    started_any = true;
                    continue;
                }
                let seed = self.routing_table.closest_for_search(&announcement.id, family);
                let search = Search::new(
                    announcement.id,
                    family,
                    SearchKind::GetPeers,
                    Some(announcement.port),
                    seed,
                    now,
                );
                self.searches.start(search);
                started_any = true;
            }
            if started_any {
                self.announcements.mark_refreshed(&announcement.id, now);
            }
        }
    }

    fn refresh_stale_buckets(&mut self, now: Instant) {
        for family in [Family::V4, Family::V6] {
            for target in self.routing_table.stale_bucket_targets(now, family) {
                if self.searches.contains(&target, family) {
                    continue;
                }
                let seed = self.routing_table.closest_for_search(&target, family);
                if seed.is_empty() {
                    continue;
                }
                let search = Search::new(target, family, SearchKind::FindNode, None, seed, now);
                self.searches.start(search);
            }
        }
    }

    // ---- control-surface operations (spec §4.8) ------------------------------

    /// Starts (if not already running) a `get_peers` search for `target`
    /// and returns the contacts accumulated so far — the `lookup` command
    /// is "start search and immediately print current results".
    pub fn lookup(&mut self, target: Id, now: Instant) -> Vec<Endpoint> {
        self.ensure_search(target, None, now);
        self.results.contacts(&target)
    }

    /// Starts a `get_peers` search for `target`, per the `search` command's
    /// three-way status contract. Mirrors `kad_start_search`'s dual-family
    /// behavior: a v4 and a v6 lookup for the same target are independent
    /// and run concurrently, each keyed by its own family so neither
    /// clobbers the other's candidate state.
    pub fn start_search(&mut self, target: Id, now: Instant) -> SearchStartOutcome {
        let mut any_started = false;
        let mut any_in_progress = false;
        for family in [Family::V4, Family::V6] {
            if self.searches.contains(&target, family) {
                any_in_progress = true;
                continue;
            }
            let seed = self.routing_table.closest_for_search(&target, family);
            if seed.is_empty() {
                continue;
            }
            let search = Search::new(target, family, SearchKind::GetPeers, None, seed, now);
            self.searches.start(search);
            any_started = true;
        }
        if any_started {
            SearchStartOutcome::Started
        } else if any_in_progress {
            SearchStartOutcome::AlreadyInProgress
        } else {
            SearchStartOutcome::Failed
        }
    }

    fn ensure_search(&mut self, target: Id, port_to_announce: Option<u16>, now: Instant) {
        for family in [Family::V4, Family::V6] {
            if self.searches.contains(&target, family) {
                continue;
            }
            let seed = self.routing_table.closest_for_search(&target, family);
            if seed.is_empty() {
                continue;
            }
            let search = Search::new(target, family, SearchKind::GetPeers, port_to_announce, seed, now);
            self.searches.start(search);
        }
    }

    pub fn results_for(&self, target: &Id) -> Vec<Endpoint> {
        self.results.contacts(target)
    }

    pub fn result_counts(&self, target: &Id) -> (usize, usize) {
        self.results.counts(target)
    }

    pub fn announce_start(&mut self, id: Id, port: u16, now: Instant) {
        self.announcements.add(id, port, Lifetime::Forever, now);
    }

    pub fn announce_stop(&mut self, id: &Id) {
        self.announcements.remove(id);
    }

    pub fn announcements(&self) -> impl Iterator<Item = &crate::announce::Announcement> {
        self.announcements.iter()
    }

    pub fn searches(&self) -> impl Iterator<Item = &Search> {
        self.searches.iter()
    }

    pub fn blocklist(&self) -> impl Iterator<Item = &Endpoint> {
        self.blocklist.iter()
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn peers(&self, family: Family) -> Vec<Contact> {
        self.routing_table
            .nodes(family)
            .into_iter()
            .map(|n| Contact::new(n.id, n.endpoint))
            .collect()
    }

    pub fn bucket_summaries(&self, family: Family) -> Vec<crate::routing_table::BucketSummary> {
        self.routing_table.bucket_summaries(family)
    }

    pub fn node_count(&self, family: Family) -> usize {
        self.routing_table.node_count(family)
    }

    pub fn bucket_count(&self, family: Family) -> usize {
        self.routing_table.bucket_count(family)
    }

    pub fn dht_port(&self) -> u16 {
        self.dht_port
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn listen_family(&self) -> &str {
        &self.listen_family
    }

    pub fn bind_addr(&self) -> Option<IpAddr> {
        self.bind_addr
    }

    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    pub fn traffic_bytes(&self, now: Instant) -> (u64, u64) {
        (self.traffic.bytes_in(now), self.traffic.bytes_out(now))
    }

    pub fn malformed_packets(&self) -> u64 {
        self.malformed_packets
    }

    pub fn search_count(&self) -> usize {
        self.searches.iter().count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStartOutcome {
    Started,
    AlreadyInProgress,
    Failed,
}

/// Surfaced to callers (config load, startup socket binding) that cannot
/// be recovered from; spec §7 "Fatal" class.
#[derive(Debug, thiserror::Error)]
pub enum FatalError {
    #[error("failed to bind any DHT UDP socket")]
    NoBindableSocket,
    #[error("system RNG is unavailable: {0}")]
    RngUnavailable(String),
}
