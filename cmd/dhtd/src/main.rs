//! Binary entry point: wires CLI flags and an optional config file into a
//! [`Config`], binds the DHT UDP socket(s) and the control socket, then
//! hands everything to [`dhtd_core::reactor::run`] (spec §1 core/§6
//! external interfaces). Everything in this crate is the "external
//! collaborator" wiring spec §1 explicitly keeps out of the core library:
//! CLI parsing, config-file loading, logging transport setup, peerfile
//! import/export, and external-hook process spawning.

mod cli;
mod config;
mod hook;
mod peerfile;

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use tokio::net::{UdpSocket, UnixListener};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use config::{AddressFamily, Config};
use dhtd_core::{reactor, Controller, Id};

#[tokio::main]
async fn main() {
    let matches = cli::cli().get_matches();
    let config = match Config::from_args(&matches) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("dhtd: {err}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.verbosity.as_filter()))
        .init();

    info!(port = config.dht_port, family = %config.family, "starting dhtd");

    let now = Instant::now();
    let local_id = Id::random();
    info!(id = %local_id, "generated local node id");

    let transport = match bind_transport(&config).await {
        Ok(transport) => transport,
        Err(err) => {
            error!(%err, "failed to bind any DHT UDP socket");
            std::process::exit(1);
        }
    };

    let control_listener = match bind_control_socket(&config.control_socket_path) {
        Ok(listener) => listener,
        Err(err) => {
            error!(path = %config.control_socket_path.display(), %err, "failed to bind control socket");
            std::process::exit(1);
        }
    };

    let mut controller = Controller::new(
        local_id,
        config.dht_port,
        env!("CARGO_PKG_VERSION").to_string(),
        config.family.to_string(),
        config.bind_addr,
        transport,
        now,
    );

    if let Some(hook_path) = &config.hook_path {
        controller.set_result_hook(Arc::new(hook::ProcessHook::new(hook_path.clone())));
    }

    if let Some(peerfile_path) = &config.peerfile {
        for addr in peerfile::read(peerfile_path) {
            controller.ping(addr, Instant::now()).await;
        }
    }

    for addr in &config.static_peers {
        controller.ping(*addr, Instant::now()).await;
    }

    for (id, port) in &config.announce {
        controller.announce_start(*id, *port, Instant::now());
    }

    let controller = reactor::run(controller, control_listener).await;
    info!("reactor stopped, shutting down");

    if let Some(peerfile_path) = &config.peerfile {
        let mut contacts = controller.peers(dhtd_core::Family::V4);
        contacts.extend(controller.peers(dhtd_core::Family::V6));
        let addrs: Vec<_> = contacts.into_iter().map(|c| c.endpoint).collect();
        peerfile::write(peerfile_path, &addrs);
    }

    std::fs::remove_file(&config.control_socket_path).ok();
}

/// Binds the v4 and/or v6 DHT UDP sockets per `config.family` (spec §3:
/// "v4 and v6 state are never commingled"). At least one socket must bind
/// or startup is a [`dhtd_core::FatalError`] (spec §7 "Fatal" class).
async fn bind_transport(
    config: &Config,
) -> Result<dhtd_core::transport::UdpTransport, dhtd_core::FatalError> {
    let want_v4 = !matches!(config.family, AddressFamily::V6Only);
    let want_v6 = !matches!(config.family, AddressFamily::V4Only);

    let v4 = if want_v4 {
        let ip = config.bind_addr.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        match UdpSocket::bind(SocketAddr::new(ip, config.dht_port)).await {
            Ok(socket) => Some(socket),
            Err(err) => {
                warn!(%err, "failed to bind IPv4 DHT socket");
                None
            }
        }
    } else {
        None
    };

    let v6 = if want_v6 {
        let ip = config.bind_addr.unwrap_or(IpAddr::V6(Ipv6Addr::UNSPECIFIED));
        match UdpSocket::bind(SocketAddr::new(ip, config.dht_port)).await {
            Ok(socket) => Some(socket),
            Err(err) => {
                warn!(%err, "failed to bind IPv6 DHT socket");
                None
            }
        }
    } else {
        None
    };

    if v4.is_none() && v6.is_none() {
        return Err(dhtd_core::FatalError::NoBindableSocket);
    }
    Ok(dhtd_core::transport::UdpTransport::new(v4, v6))
}

/// Binds the local control surface (spec §6 "Local control socket"),
/// clearing a stale socket file left behind by an unclean previous exit.
fn bind_control_socket(path: &std::path::Path) -> std::io::Result<UnixListener> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    UnixListener::bind(path)
}
