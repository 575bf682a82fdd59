//! Text control surface (spec §4.8): parses the newline-delimited command
//! vocabulary and renders Controller state back to human-readable text.
//! The accept loop and the actual stream socket live in the binary crate
//! (spec §1: the control protocol's grammar beyond the operations it
//! invokes is an external collaborator) — this module owns the grammar
//! itself and the operations it invokes, per spec §4.8's exact command
//! list.

use std::fmt::Write as _;
use std::net::SocketAddr;
use std::time::Instant;

use crate::constants::{
    ALPHA, ANNOUNCE_REFRESH_INTERVAL, BUCKET_REFRESH_INTERVAL, DHT_MAX_BLACKLISTED,
    DHT_MAX_HASHES, DHT_MAX_PEERS, K, K_SEARCH, MAX_RESULTS_PER_SEARCH, NODE_BAD_PING_THRESHOLD,
    NODE_LIVENESS_WINDOW, REQUEST_TIMEOUT, SEARCH_EXPIRE_TIME, TOKEN_ROTATION_PERIOD,
};
use crate::controller::{Controller, SearchStartOutcome};
use crate::endpoint::Family;
use crate::id::Id;

const HELP_TEXT: &str = "\
status                        node id, uptime, table/search/storage counts, traffic
help                          this text
peer <address>[:port]         inject a bootstrap contact (sends a ping)
ping <address>                same as peer
lookup <id>                   start a search and print current results
search <id>                   start a search (async; see `results` for output)
results <id>                  print accumulated results for id
announce-start <id>[:port]    announce (id, port) for the life of this process
announce-stop <id>            stop announcing id
searches                      list in-flight searches
announcements                 list owned announcements
blocklist                     list blocked endpoints
constants                     print compiled-in tunables
peers                         list routing-table nodes
buckets                       summarize routing-table buckets
storage                       summarize received announcements
block <address>               add an endpoint to the blocklist
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Status,
    Help,
    Peer(SocketAddr),
    Lookup(Id),
    Search(Id),
    Results(Id),
    AnnounceStart(Id, u16),
    AnnounceStop(Id),
    Searches,
    Announcements,
    Blocklist,
    Constants,
    Peers,
    Buckets,
    Storage,
    Block(SocketAddr),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    #[error("unrecognized command {0:?}")]
    UnknownCommand(String),
    #[error("{0} requires an argument")]
    MissingArgument(&'static str),
    #[error("{0:?} is not a valid address[:port]")]
    BadAddress(String),
    #[error("{0:?} is not a valid 40-character hex id")]
    BadId(String),
}

/// Parses one line of input into a [`Command`] (spec §4.8, "Configuration-
/// invalid" class per spec §7: malformed input is reported, the specific
/// operation fails, but the connection and the daemon continue).
pub fn parse(line: &str) -> Result<Command, ControlError> {
    let mut parts = line.trim().split_whitespace();
    let verb = parts.next().ok_or(ControlError::UnknownCommand(String::new()))?;
    let rest: Vec<&str> = parts.collect();

    match verb {
        "status" => Ok(Command::Status),
        "help" => Ok(Command::Help),
        "peer" => parse_address_command(&rest, "peer").map(Command::Peer),
        "ping" => parse_address_command(&rest, "ping").map(Command::Peer),
        "lookup" => parse_id_command(&rest, "lookup").map(Command::Lookup),
        "search" => parse_id_command(&rest, "search").map(Command::Search),
        "results" => parse_id_command(&rest, "results").map(Command::Results),
        "announce-start" => parse_announce_start(&rest),
        "announce-stop" => parse_id_command(&rest, "announce-stop").map(Command::AnnounceStop),
        "searches" => Ok(Command::Searches),
        "announcements" => Ok(Command::Announcements),
        "blocklist" => Ok(Command::Blocklist),
        "constants" => Ok(Command::Constants),
        "peers" => Ok(Command::Peers),
        "buckets" => Ok(Command::Buckets),
        "storage" => Ok(Command::Storage),
        "block" => parse_address_command(&rest, "block").map(Command::Block),
        other => Err(ControlError::UnknownCommand(other.to_string())),
    }
}

fn parse_address_command(rest: &[&str], verb: &'static str) -> Result<SocketAddr, ControlError> {
    let raw = rest.first().ok_or(ControlError::MissingArgument(verb))?;
    parse_address(raw, default_port_for(verb))
}

fn default_port_for(verb: &str) -> u16 {
    match verb {
        "peer" | "ping" => crate::constants::DEFAULT_DHT_PORT,
        _ => 0,
    }
}

/// Parses `host:port` or `[v6host]:port`; if no port is present and
/// `default_port` is nonzero, the default applies (spec §6 peerfile
/// grammar reused here for the `peer`/`ping`/`block` commands).
fn parse_address(raw: &str, default_port: u16) -> Result<SocketAddr, ControlError> {
    if let Ok(addr) = raw.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if default_port != 0 {
        if let Ok(ip) = raw.trim_start_matches('[').trim_end_matches(']').parse() {
            return Ok(SocketAddr::new(ip, default_port));
        }
    }
    Err(ControlError::BadAddress(raw.to_string()))
}

fn parse_id_command(rest: &[&str], verb: &'static str) -> Result<Id, ControlError> {
    let raw = rest.first().ok_or(ControlError::MissingArgument(verb))?;
    Id::from_hex(raw).map_err(|_| ControlError::BadId(raw.to_string()))
}

fn parse_announce_start(rest: &[&str]) -> Result<Command, ControlError> {
    let raw = rest
        .first()
        .ok_or(ControlError::MissingArgument("announce-start"))?;
    let (id_part, port) = match raw.split_once(':') {
        Some((id_part, port_part)) => {
            let port: u16 = port_part
                .parse()
                .map_err(|_| ControlError::BadAddress(raw.to_string()))?;
            (id_part, port)
        }
        None => (*raw, crate::constants::DEFAULT_DHT_PORT),
    };
    let id = Id::from_hex(id_part).map_err(|_| ControlError::BadId(id_part.to_string()))?;
    Ok(Command::AnnounceStart(id, port))
}

/// Executes `command` against `controller`, returning the text to send
/// back over the control connection. The final line is always terminated
/// with `\n`; callers may send multiple responses per connection.
pub async fn execute(controller: &mut Controller, command: Command, now: Instant) -> String {
    match command {
        Command::Status => status_text(controller, now),
        Command::Help => HELP_TEXT.to_string(),
        Command::Peer(addr) => {
            controller.ping(addr, now).await;
            format!("Pinging {addr}\n")
        }
        Command::Lookup(id) => {
            let contacts = controller.lookup(id, now);
            render_contacts(&contacts)
        }
        Command::Search(id) => match controller.start_search(id, now) {
            SearchStartOutcome::Started => "Search started\n".to_string(),
            SearchStartOutcome::AlreadyInProgress => "Search in progress\n".to_string(),
            SearchStartOutcome::Failed => "Failed to start search\n".to_string(),
        },
        Command::Results(id) => {
            let contacts = controller.results_for(&id);
            render_contacts(&contacts)
        }
        Command::AnnounceStart(id, port) => {
            controller.announce_start(id, port, now);
            format!("Announcing {} on port {}\n", id, port)
        }
        Command::AnnounceStop(id) => {
            controller.announce_stop(&id);
            format!("Stopped announcing {}\n", id)
        }
        Command::Searches => searches_text(controller, now),
        Command::Announcements => announcements_text(controller, now),
        Command::Blocklist => blocklist_text(controller),
        Command::Constants => constants_text(),
        Command::Peers => peers_text(controller),
        Command::Buckets => buckets_text(controller, now),
        Command::Storage => storage_text(controller),
        Command::Block(addr) => {
            controller.block(addr).await;
            format!("Blocked {addr}\n")
        }
    }
}

fn render_contacts(contacts: &[crate::endpoint::Endpoint]) -> String {
    if contacts.is_empty() {
        return "0 results\n".to_string();
    }
    let mut out = format!("{} results\n", contacts.len());
    for contact in contacts {
        let _ = writeln!(out, "{contact}");
    }
    out
}

fn status_text(controller: &Controller, now: Instant) -> String {
    let uptime = now.duration_since(controller.start_time()).as_secs();
    let (bytes_in, bytes_out) = controller.traffic_bytes(now);
    let bind_addr = controller
        .bind_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| "<any>".to_string());
    format!(
        "dhtd {}\n\
         node id: {}\n\
         uptime: {}s\n\
         listen on: {} / family: {} / port: {}\n\
         nodes (v4/v6): {}/{}\n\
         buckets (v4/v6): {}/{}\n\
         searches: {}\n\
         announcements: {}\n\
         storage: {} hashes, {} peers\n\
         traffic (last {}s): {} in, {} out\n\
         malformed packets: {}\n",
        controller.version(),
        controller.local_id(),
        uptime,
        bind_addr,
        controller.listen_family(),
        controller.dht_port(),
        controller.node_count(Family::V4),
        controller.node_count(Family::V6),
        controller.bucket_count(Family::V4),
        controller.bucket_count(Family::V6),
        controller.search_count(),
        controller.announcements().count(),
        controller.storage().hash_count(),
        controller.storage().total_peer_count(),
        crate::constants::TRAFFIC_DURATION_SECONDS,
        bytes_in,
        bytes_out,
        controller.malformed_packets(),
    )
}

fn searches_text(controller: &Controller, now: Instant) -> String {
    let mut out = String::new();
    for search in controller.searches() {
        let _ = writeln!(
            out,
            "{} ({}) age={}s candidates={}",
            search.target,
            search.family,
            search.age(now).as_secs(),
            search.len()
        );
    }
    if out.is_empty() {
        out.push_str("no searches in progress\n");
    }
    out
}

fn announcements_text(controller: &Controller, now: Instant) -> String {
    let mut out = String::new();
    for announcement in controller.announcements() {
        let refresh_in = announcement
            .refresh_time
            .checked_duration_since(now)
            .unwrap_or_default()
            .as_secs();
        let _ = writeln!(
            out,
            "{} port={} refresh: in <={}s",
            announcement.id, announcement.port, refresh_in
        );
    }
    if out.is_empty() {
        out.push_str("no announcements\n");
    }
    out
}

fn blocklist_text(controller: &Controller) -> String {
    let mut out = String::new();
    for endpoint in controller.blocklist() {
        let _ = writeln!(out, "{endpoint}");
    }
    if out.is_empty() {
        out.push_str("blocklist empty\n");
    }
    out
}

fn constants_text() -> String {
    format!(
        "K={}\nK_SEARCH={}\nALPHA={}\n\
         NODE_LIVENESS_WINDOW={}s\nNODE_BAD_PING_THRESHOLD={}\n\
         REQUEST_TIMEOUT={}s\nSEARCH_EXPIRE_TIME={}s\n\
         BUCKET_REFRESH_INTERVAL={}s\nANNOUNCE_REFRESH_INTERVAL={}s\n\
         TOKEN_ROTATION_PERIOD={}s\nMAX_RESULTS_PER_SEARCH={}\n\
         DHT_MAX_HASHES={}\nDHT_MAX_PEERS={}\nDHT_MAX_BLACKLISTED={}\n",
        K,
        K_SEARCH,
        ALPHA,
        NODE_LIVENESS_WINDOW.as_secs(),
        NODE_BAD_PING_THRESHOLD,
        REQUEST_TIMEOUT.as_secs(),
        SEARCH_EXPIRE_TIME.as_secs(),
        BUCKET_REFRESH_INTERVAL.as_secs(),
        ANNOUNCE_REFRESH_INTERVAL.as_secs(),
        TOKEN_ROTATION_PERIOD.as_secs(),
        MAX_RESULTS_PER_SEARCH,
        DHT_MAX_HASHES,
        DHT_MAX_PEERS,
        DHT_MAX_BLACKLISTED,
    )
}

fn peers_text(controller: &Controller) -> String {
    let mut out = String::new();
    for family in [Family::V4, Family::V6] {
        for contact in controller.peers(family) {
            let _ = writeln!(out, "{} {} ({family})", contact.id, contact.endpoint);
        }
    }
    if out.is_empty() {
        out.push_str("no known peers\n");
    }
    out
}

fn buckets_text(controller: &Controller, now: Instant) -> String {
    let mut out = String::new();
    for family in [Family::V4, Family::V6] {
        for bucket in controller.bucket_summaries(family) {
            let next = bucket
                .next
                .map(|n| n.to_hex())
                .unwrap_or_else(|| "end".to_string());
            let age = now.duration_since(bucket.last_changed).as_secs();
            let _ = writeln!(
                out,
                "({family}) [{}, {}) nodes={} age={}s",
                bucket.first.to_hex(),
                next,
                bucket.node_count,
                age
            );
        }
    }
    out
}

fn storage_text(controller: &Controller) -> String {
    let storage = controller.storage();
    let mut out = String::new();
    for id in storage.ids() {
        let _ = writeln!(out, "{} peers={}", id, storage.peer_count(id));
    }
    if out.is_empty() {
        out.push_str("storage empty\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_status_and_help() {
        assert_eq!(parse("status").unwrap(), Command::Status);
        assert_eq!(parse("  help  ").unwrap(), Command::Help);
    }

    #[test]
    fn parses_peer_with_explicit_port() {
        let cmd = parse("peer 10.0.0.1:6882").unwrap();
        assert_eq!(cmd, Command::Peer("10.0.0.1:6882".parse().unwrap()));
    }

    #[test]
    fn parses_peer_with_default_port() {
        let cmd = parse("peer 10.0.0.1").unwrap();
        assert_eq!(
            cmd,
            Command::Peer(SocketAddr::new(
                "10.0.0.1".parse().unwrap(),
                crate::constants::DEFAULT_DHT_PORT
            ))
        );
    }

    #[test]
    fn parses_announce_start_with_and_without_port() {
        let hex = "aabbccddeeff00112233445566778899aabbccdd";
        let id = Id::from_hex(hex).unwrap();
        assert_eq!(
            parse(&format!("announce-start {hex}:6882")).unwrap(),
            Command::AnnounceStart(id, 6882)
        );
        assert_eq!(
            parse(&format!("announce-start {hex}")).unwrap(),
            Command::AnnounceStart(id, crate::constants::DEFAULT_DHT_PORT)
        );
    }

    #[test]
    fn rejects_unknown_command() {
        assert!(matches!(
            parse("frobnicate"),
            Err(ControlError::UnknownCommand(_))
        ));
    }

    #[test]
    fn rejects_missing_argument() {
        assert!(matches!(
            parse("lookup"),
            Err(ControlError::MissingArgument("lookup"))
        ));
    }

    #[test]
    fn rejects_bad_id() {
        assert!(matches!(parse("lookup zz"), Err(ControlError::BadId(_))));
    }
}
