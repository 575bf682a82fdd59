//! `Config`, the binary crate's equivalent of `struct gconf_t` in
//! `original_source/src/conf.h`: every value the core needs before it can
//! start, gathered from the CLI and an optional config file (spec §6, SPEC_FULL
//! "Configuration"). The core library itself never parses a command line or
//! a config file; this struct is the thin wiring layer spec §1 names as an
//! external collaborator.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::ArgMatches;
use dhtd_core::constants::{DEFAULT_CONTROL_SOCKET_PATH, DEFAULT_DHT_PORT};
use dhtd_core::Id;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    V4Only,
    V6Only,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Verbose,
    Debug,
}

impl Verbosity {
    /// Maps onto a `tracing` level the same way `original_source`'s
    /// `verbosity_str` maps its three levels onto syslog priorities.
    pub fn as_filter(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "warn",
            Verbosity::Verbose => "info",
            Verbosity::Debug => "debug",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub dht_port: u16,
    pub family: AddressFamily,
    pub bind_addr: Option<IpAddr>,
    pub control_socket_path: PathBuf,
    pub peerfile: Option<PathBuf>,
    pub hook_path: Option<PathBuf>,
    pub announce: Vec<(Id, u16)>,
    pub static_peers: Vec<SocketAddr>,
    pub verbosity: Verbosity,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid --{0} value {1:?}: {2}")]
    BadValue(&'static str, String, &'static str),
    #[error("{0:?} is not a valid id[:port]")]
    BadAnnounce(String),
    #[error("{0:?} is not a valid address[:port]")]
    BadPeer(String),
    #[error("failed to read config file {path}: {source}")]
    FileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: unrecognized config key {key:?}")]
    UnknownKey { line: usize, key: String },
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::V4Only => write!(f, "ipv4-only"),
            AddressFamily::V6Only => write!(f, "ipv6-only"),
            AddressFamily::Both => write!(f, "ipv4+ipv6"),
        }
    }
}

impl Config {
    /// Builds the default configuration, then layers CLI flags over it,
    /// reading `--config` first so that explicit flags on the invoking
    /// command line still win (matching `conf.c`'s "config file can be
    /// overridden by explicit options" behavior).
    pub fn from_args(matches: &ArgMatches) -> Result<Config, ConfigError> {
        let mut config = Config::default();

        if let Some(path) = matches.get_one::<String>("config") {
            config.apply_file(PathBuf::from(path))?;
        }

        if let Some(port) = matches.get_one::<String>("port") {
            config.dht_port = port
                .parse()
                .map_err(|_| ConfigError::BadValue("port", port.clone(), "not a valid u16"))?;
        }

        let ipv4_only = matches.get_flag("ipv4");
        let ipv6_only = matches.get_flag("ipv6");
        config.family = match (ipv4_only, ipv6_only) {
            (true, false) => AddressFamily::V4Only,
            (false, true) => AddressFamily::V6Only,
            _ => config.family,
        };

        if let Some(addr) = matches.get_one::<String>("bind-addr") {
            config.bind_addr = Some(
                addr.parse()
                    .map_err(|_| ConfigError::BadValue("bind-addr", addr.clone(), "not a valid IP address"))?,
            );
        }

        if let Some(path) = matches.get_one::<String>("cmd-path") {
            config.control_socket_path = PathBuf::from(path);
        }

        if let Some(path) = matches.get_one::<String>("peerfile") {
            config.peerfile = Some(PathBuf::from(path));
        }

        if let Some(path) = matches.get_one::<String>("execute") {
            config.hook_path = Some(PathBuf::from(path));
        }

        if let Some(entries) = matches.get_many::<String>("announce") {
            for entry in entries {
                config.announce.push(parse_announce(entry)?);
            }
        }

        if let Some(entries) = matches.get_many::<String>("peer") {
            for entry in entries {
                config.static_peers.push(parse_peer(entry)?);
            }
        }

        if let Some(level) = matches.get_one::<String>("verbosity") {
            config.verbosity = match level.as_str() {
                "quiet" => Verbosity::Quiet,
                "verbose" => Verbosity::Verbose,
                "debug" => Verbosity::Debug,
                other => {
                    return Err(ConfigError::BadValue(
                        "verbosity",
                        other.to_string(),
                        "expected quiet, verbose, or debug",
                    ))
                }
            };
        }

        Ok(config)
    }

    /// Applies `key value` pairs from a plain-text config file, one option
    /// per line, `#`-comments allowed (spec §6 peerfile-adjacent grammar;
    /// `original_source/src/conf.c`'s own config-file reader uses the same
    /// shape). Recognizes the same keys as the long-form CLI flags.
    fn apply_file(&mut self, path: PathBuf) -> Result<(), ConfigError> {
        let text = std::fs::read_to_string(&path)
            .map_err(|source| ConfigError::FileUnreadable { path: path.clone(), source })?;

        for (line_no, raw_line) in text.lines().enumerate() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.splitn(2, char::is_whitespace);
            let key = parts.next().unwrap_or("").trim();
            let value = parts.next().unwrap_or("").trim();

            match key {
                "port" => {
                    self.dht_port = value
                        .parse()
                        .map_err(|_| ConfigError::BadValue("port", value.to_string(), "not a valid u16"))?;
                }
                "ipv4" => self.family = AddressFamily::V4Only,
                "ipv6" => self.family = AddressFamily::V6Only,
                "bind-addr" => {
                    self.bind_addr = Some(value.parse().map_err(|_| {
                        ConfigError::BadValue("bind-addr", value.to_string(), "not a valid IP address")
                    })?);
                }
                "cmd-path" => self.control_socket_path = PathBuf::from(value),
                "peerfile" => self.peerfile = Some(PathBuf::from(value)),
                "execute" => self.hook_path = Some(PathBuf::from(value)),
                "announce" => self.announce.push(parse_announce(value)?),
                "peer" => self.static_peers.push(parse_peer(value)?),
                "verbosity" => {
                    self.verbosity = match value {
                        "quiet" => Verbosity::Quiet,
                        "verbose" => Verbosity::Verbose,
                        "debug" => Verbosity::Debug,
                        other => {
                            return Err(ConfigError::BadValue(
                                "verbosity",
                                other.to_string(),
                                "expected quiet, verbose, or debug",
                            ))
                        }
                    };
                }
                other => {
                    return Err(ConfigError::UnknownKey {
                        line: line_no + 1,
                        key: other.to_string(),
                    })
                }
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            dht_port: DEFAULT_DHT_PORT,
            family: AddressFamily::Both,
            bind_addr: None,
            control_socket_path: PathBuf::from(DEFAULT_CONTROL_SOCKET_PATH),
            peerfile: None,
            hook_path: None,
            announce: Vec::new(),
            static_peers: Vec::new(),
            verbosity: Verbosity::Verbose,
        }
    }
}

fn parse_announce(raw: &str) -> Result<(Id, u16), ConfigError> {
    let (id_part, port) = match raw.split_once(':') {
        Some((id_part, port_part)) => {
            let port: u16 = port_part
                .parse()
                .map_err(|_| ConfigError::BadAnnounce(raw.to_string()))?;
            (id_part, port)
        }
        None => (raw, DEFAULT_DHT_PORT),
    };
    let id = Id::from_hex(id_part).map_err(|_| ConfigError::BadAnnounce(raw.to_string()))?;
    Ok((id, port))
}

fn parse_peer(raw: &str) -> Result<SocketAddr, ConfigError> {
    if let Ok(addr) = raw.parse::<SocketAddr>() {
        return Ok(addr);
    }
    let ip: IpAddr = raw
        .trim_start_matches('[')
        .trim_end_matches(']')
        .parse()
        .map_err(|_| ConfigError::BadPeer(raw.to_string()))?;
    Ok(SocketAddr::new(ip, DEFAULT_DHT_PORT))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_announce_with_and_without_port() {
        let hex = "aabbccddeeff00112233445566778899aabbccdd";
        let (id, port) = parse_announce(&format!("{hex}:6882")).unwrap();
        assert_eq!(port, 6882);
        assert_eq!(id.to_hex(), hex);

        let (_, port) = parse_announce(hex).unwrap();
        assert_eq!(port, DEFAULT_DHT_PORT);
    }

    #[test]
    fn parses_peer_with_default_port() {
        let addr = parse_peer("10.0.0.1").unwrap();
        assert_eq!(addr.port(), DEFAULT_DHT_PORT);
    }

    #[test]
    fn config_file_overrides_defaults_but_cli_wins() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("dhtd-test-conf-{}.txt", std::process::id()));
        std::fs::write(&path, "# comment\nport 7000\nverbosity debug\n").unwrap();

        let mut config = Config::default();
        config.apply_file(path.clone()).unwrap();
        assert_eq!(config.dht_port, 7000);
        assert_eq!(config.verbosity, Verbosity::Debug);

        std::fs::remove_file(path).ok();
    }
}
