//! Single-threaded cooperative event loop (spec §4.7): one task
//! multiplexes UDP datagrams, the local control socket, and a 1 s
//! maintenance tick. No handler holds the [`Controller`] across an
//! `.await` that waits on another peer — every mutation runs to
//! completion before the next `select!` iteration starts.

use std::time::{Duration, Instant};

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};

use crate::constants::TICK_INTERVAL;
use crate::control;
use crate::controller::Controller;

/// One accepted control connection, paused on the next newline-delimited
/// command. Held outside the `FuturesUnordered` while a command is being
/// executed against the controller, then handed back in.
struct ControlConn {
    reader: BufReader<UnixStream>,
}

/// Reads one line from `conn`, returning it alongside the connection so
/// the caller can write a response and resume reading.
async fn read_command(mut conn: ControlConn) -> (ControlConn, std::io::Result<Option<String>>) {
    let mut line = String::new();
    let result = conn.reader.read_line(&mut line).await;
    match result {
        Ok(0) => (conn, Ok(None)),
        Ok(_) => (conn, Ok(Some(line))),
        Err(err) => (conn, Err(err)),
    }
}

/// Drives `controller` until SIGINT, returning it so the caller can read
/// final state (e.g. to export the peer file on shutdown, spec §6 "written
/// on shutdown (best-effort)"). `control_listener` is expected to already
/// be bound at the configured path (spec §6 "local control socket");
/// binding itself, and any path cleanup, is the caller's responsibility.
pub async fn run(mut controller: Controller, control_listener: UnixListener) -> Controller {
    let mut pending_reads: FuturesUnordered<_> = FuturesUnordered::new();
    let mut tick = tokio::time::interval(TICK_INTERVAL);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!("reactor started");

    loop {
        tokio::select! {
            biased;

            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested, draining reactor");
                break;
            }

            _ = tick.tick() => {
                controller.tick(Instant::now()).await;
            }

            datagram = controller.recv_datagram(Instant::now()) => {
                match datagram {
                    Ok((bytes, from, family)) => {
                        controller.handle_datagram(&bytes, from, family, Instant::now()).await;
                    }
                    Err(err) => {
                        warn!(%err, "UDP recv failed");
                    }
                }
            }

            accepted = control_listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        debug!("control connection accepted");
                        pending_reads.push(read_command(ControlConn { reader: BufReader::new(stream) }));
                    }
                    Err(err) => warn!(%err, "control socket accept failed"),
                }
            }

            Some((conn, outcome)) = pending_reads.next() => {
                match outcome {
                    Ok(Some(line)) => {
                        let response = dispatch(&mut controller, &line).await;
                        let mut conn = conn;
                        if let Err(err) = conn.reader.get_mut().write_all(response.as_bytes()).await {
                            debug!(%err, "control write failed, closing connection");
                        } else {
                            pending_reads.push(read_command(conn));
                        }
                    }
                    Ok(None) => debug!("control connection closed by peer"),
                    Err(err) => debug!(%err, "control connection read failed"),
                }
            }
        }
    }

    controller
}

async fn dispatch(controller: &mut Controller, line: &str) -> String {
    match control::parse(line) {
        Ok(command) => control::execute(controller, command, Instant::now()).await,
        Err(err) => format!("error: {err}\n"),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::id::Id;
    use crate::transport::UdpTransport;
    use tokio::net::UdpSocket;

    async fn controller() -> Controller {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let transport = UdpTransport::new(Some(socket), None);
        Controller::new(
            Id::random(),
            6881,
            "test".to_string(),
            "ipv4+ipv6".to_string(),
            None,
            transport,
            Instant::now(),
        )
    }

    #[tokio::test]
    async fn dispatch_status_reports_local_id() {
        let mut c = controller().await;
        let out = dispatch(&mut c, "status").await;
        assert!(out.contains("node id:"));
    }

    #[tokio::test]
    async fn dispatch_unknown_command_reports_error() {
        let mut c = controller().await;
        let out = dispatch(&mut c, "bogus").await;
        assert!(out.starts_with("error:"));
    }
}
