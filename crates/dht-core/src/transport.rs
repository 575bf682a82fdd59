//! Non-blocking UDP transport: one socket per address family, with byte
//! counters wired into [`crate::traffic::TrafficCounters`] (spec §2 "UDP
//! transport").

use std::io;
use std::net::SocketAddr;
use std::time::Instant;

use tokio::net::UdpSocket;
use tracing::debug;

use crate::constants::MAX_PACKET_SIZE;
use crate::endpoint::{Endpoint, Family};
use crate::traffic::TrafficCounters;

pub struct UdpTransport {
    v4: Option<UdpSocket>,
    v6: Option<UdpSocket>,
}

impl UdpTransport {
    pub fn new(v4: Option<UdpSocket>, v6: Option<UdpSocket>) -> Self {
        UdpTransport { v4, v6 }
    }

    fn socket(&self, family: Family) -> Option<&UdpSocket> {
        match family {
            Family::V4 => self.v4.as_ref(),
            Family::V6 => self.v6.as_ref(),
        }
    }

    pub fn has(&self, family: Family) -> bool {
        self.socket(family).is_some()
    }

    /// Sends `bytes` to `endpoint`. Transport-transient failures (spec §7:
    /// `EAGAIN`, `EINTR`, oversized datagram) are logged and swallowed —
    /// the caller treats the send as best-effort, matching the rest of the
    /// protocol's tolerance for packet loss.
    pub async fn send_to(
        &self,
        endpoint: Endpoint,
        bytes: &[u8],
        traffic: &mut TrafficCounters,
        now: Instant,
    ) {
        let family = endpoint.family();
        let Some(socket) = self.socket(family) else {
            debug!(%endpoint, "dropping send: no socket bound for this address family");
            return;
        };
        match socket.send_to(bytes, endpoint.addr).await {
            Ok(sent) => traffic.record_out(now, sent as u64),
            Err(err) => debug!(%endpoint, %err, "send_to failed, dropping"),
        }
    }

    /// Waits for a datagram on either socket, whichever is bound and ready
    /// first, recording inbound traffic as it arrives. Returns the raw
    /// bytes, the address it came from, and which family's socket received
    /// it (a single node process may have only one family bound).
    pub async fn recv(
        &self,
        traffic: &mut TrafficCounters,
        now: Instant,
    ) -> io::Result<(Vec<u8>, SocketAddr, Family)> {
        let mut buf = vec![0u8; MAX_PACKET_SIZE];
        let (len, from, family) = match (&self.v4, &self.v6) {
            (Some(v4), Some(v6)) => {
                tokio::select! {
                    res = v4.recv_from(&mut buf) => {
                        let (len, from) = res?;
                        (len, from, Family::V4)
                    }
                    res = v6.recv_from(&mut buf) => {
                        let (len, from) = res?;
                        (len, from, Family::V6)
                    }
                }
            }
            (Some(v4), None) => {
                let (len, from) = v4.recv_from(&mut buf).await?;
                (len, from, Family::V4)
            }
            (None, Some(v6)) => {
                let (len, from) = v6.recv_from(&mut buf).await?;
                (len, from, Family::V6)
            }
            (None, None) => std::future::pending().await,
        };
        traffic.record_in(now, len as u64);
        buf.truncate(len);
        Ok((buf, from, family))
    }
}
