//! Peer contact file (spec §6 "Peer file", SPEC_FULL Supplemented Feature
//! #3). The only state this daemon persists across restarts: one contact
//! per line, read (best-effort) on startup and written on clean shutdown.
//! `original_source`'s own `peerfile.c` is not in the retrieved source set,
//! so the line grammar here follows spec §6 exactly: `<address>:<port>`
//! for IPv4, `[<address>]:<port>` for IPv6.

use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use dhtd_core::Endpoint;
use tracing::{debug, warn};

/// Reads `path`, skipping blank lines and lines that don't parse as a
/// contact (spec §7 "Configuration-invalid": the specific line fails, the
/// rest of the file and startup continue). Missing file is not an error —
/// a peerfile is created fresh on first shutdown.
pub fn read(path: &Path) -> Vec<SocketAddr> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no existing peer file, starting empty");
            return Vec::new();
        }
        Err(err) => {
            warn!(path = %path.display(), %err, "failed to read peer file");
            return Vec::new();
        }
    };

    let mut peers = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_line(line) {
            Some(addr) => peers.push(addr),
            None => warn!(path = %path.display(), line = line_no + 1, %line, "skipping unparsable peer file line"),
        }
    }
    peers
}

fn parse_line(line: &str) -> Option<SocketAddr> {
    if let Some(rest) = line.strip_prefix('[') {
        let (ip_part, port_part) = rest.split_once("]:")?;
        let ip: IpAddr = ip_part.parse().ok()?;
        let port: u16 = port_part.parse().ok()?;
        return Some(SocketAddr::new(ip, port));
    }
    line.parse().ok()
}

fn format_line(addr: SocketAddr) -> String {
    match addr.ip() {
        IpAddr::V4(_) => format!("{}:{}", addr.ip(), addr.port()),
        IpAddr::V6(ip) => format!("[{}]:{}", ip, addr.port()),
    }
}

/// Writes `contacts` to `path`, one per line, best-effort (spec §6: "written
/// on shutdown (best-effort)" — a failure here is logged, never fatal).
pub fn write(path: &Path, contacts: &[Endpoint]) {
    let body: String = contacts
        .iter()
        .map(|c| format_line(c.addr))
        .collect::<Vec<_>>()
        .join("\n");
    if let Err(err) = std::fs::write(path, body) {
        warn!(path = %path.display(), %err, "failed to write peer file");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_v4_and_v6_lines() {
        assert_eq!(
            parse_line("10.0.0.1:6881"),
            Some("10.0.0.1:6881".parse().unwrap())
        );
        assert_eq!(
            parse_line("[::1]:6881"),
            Some("[::1]:6881".parse().unwrap())
        );
    }

    #[test]
    fn rejects_garbage_line() {
        assert_eq!(parse_line("not a peer"), None);
    }

    #[test]
    fn round_trips_through_format_and_parse() {
        let v4: SocketAddr = "1.2.3.4:6881".parse().unwrap();
        let v6: SocketAddr = "[fe80::1]:6882".parse().unwrap();
        assert_eq!(parse_line(&format_line(v4)), Some(v4));
        assert_eq!(parse_line(&format_line(v6)), Some(v6));
    }

    #[test]
    fn missing_file_reads_as_empty_without_panicking() {
        let path = std::env::temp_dir().join("dhtd-test-does-not-exist.peers");
        assert!(read(&path).is_empty());
    }
}
