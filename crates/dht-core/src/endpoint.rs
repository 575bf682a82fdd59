//! Dual-stack endpoints and the compact node-contact wire encoding.
//!
//! v4 and v6 never mix in a single list: every caller picks a [`Family`]
//! up front and stays on it (spec §3, Endpoint).

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use crate::id::{Id, ID_LENGTH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    pub fn of(addr: &IpAddr) -> Family {
        match addr {
            IpAddr::V4(_) => Family::V4,
            IpAddr::V6(_) => Family::V6,
        }
    }

    /// Byte length of a compact contact (id + address + port) for this family.
    pub fn compact_node_len(self) -> usize {
        match self {
            Family::V4 => ID_LENGTH + 4 + 2,
            Family::V6 => ID_LENGTH + 16 + 2,
        }
    }

    pub fn compact_peer_len(self) -> usize {
        match self {
            Family::V4 => 4 + 2,
            Family::V6 => 16 + 2,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::V4 => write!(f, "IPv4"),
            Family::V6 => write!(f, "IPv6"),
        }
    }
}

/// An endpoint: an IP address (v4 or v6, never both) and a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub addr: SocketAddr,
}

impl Endpoint {
    pub fn new(addr: SocketAddr) -> Self {
        Endpoint { addr }
    }

    pub fn family(&self) -> Family {
        Family::of(&self.addr.ip())
    }

    pub fn compact_peer(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.family().compact_peer_len());
        match self.addr.ip() {
            IpAddr::V4(v4) => out.extend_from_slice(&v4.octets()),
            IpAddr::V6(v6) => out.extend_from_slice(&v6.octets()),
        }
        out.extend_from_slice(&self.addr.port().to_be_bytes());
        out
    }

    pub fn decode_peer(bytes: &[u8], family: Family) -> Option<Endpoint> {
        if bytes.len() != family.compact_peer_len() {
            return None;
        }
        let (ip_bytes, port_bytes) = bytes.split_at(bytes.len() - 2);
        let port = u16::from_be_bytes([port_bytes[0], port_bytes[1]]);
        let ip = match family {
            Family::V4 => {
                let arr: [u8; 4] = ip_bytes.try_into().ok()?;
                IpAddr::V4(Ipv4Addr::from(arr))
            }
            Family::V6 => {
                let arr: [u8; 16] = ip_bytes.try_into().ok()?;
                IpAddr::V6(Ipv6Addr::from(arr))
            }
        };
        Some(Endpoint::new(SocketAddr::new(ip, port)))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.addr)
    }
}

/// A node id plus the endpoint it is reachable at: the unit exchanged in
/// `find_node`/`get_peers` replies (spec §4.1, "compact contact").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contact {
    pub id: Id,
    pub endpoint: Endpoint,
}

impl Contact {
    pub fn new(id: Id, endpoint: Endpoint) -> Self {
        Contact { id, endpoint }
    }

    /// Encodes as `id || ip || port`: 26 bytes for v4, 38 for v6.
    pub fn encode_compact(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.endpoint.family().compact_node_len());
        out.extend_from_slice(self.id.as_bytes());
        out.extend_from_slice(&self.endpoint.compact_peer());
        out
    }

    /// Decodes a flat buffer of back-to-back compact contacts for `family`.
    /// Truncated trailing bytes are ignored (lenient per spec §4.1: strict
    /// decoding applies to message structure, not partial trailers).
    pub fn decode_compact_list(bytes: &[u8], family: Family) -> Vec<Contact> {
        let unit = family.compact_node_len();
        if unit == 0 {
            return Vec::new();
        }
        bytes
            .chunks_exact(unit)
            .filter_map(|chunk| {
                let (id_bytes, rest) = chunk.split_at(ID_LENGTH);
                let id_arr: [u8; ID_LENGTH] = id_bytes.try_into().ok()?;
                let endpoint = Endpoint::decode_peer(rest, family)?;
                Some(Contact::new(Id::from_bytes(id_arr), endpoint))
            })
            .collect()
    }

    pub fn encode_compact_list(contacts: &[Contact]) -> Vec<u8> {
        let mut out = Vec::new();
        for c in contacts {
            out.extend_from_slice(&c.encode_compact());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_id(byte: u8) -> Id {
        Id::from_bytes([byte; ID_LENGTH])
    }

    #[test]
    fn compact_v4_round_trip() {
        let contact = Contact::new(
            sample_id(0x11),
            Endpoint::new("10.0.0.1:6881".parse().unwrap()),
        );
        let encoded = contact.encode_compact();
        assert_eq!(encoded.len(), 26);
        let decoded = Contact::decode_compact_list(&encoded, Family::V4);
        assert_eq!(decoded, vec![contact]);
    }

    #[test]
    fn compact_v6_round_trip() {
        let contact = Contact::new(
            sample_id(0x22),
            Endpoint::new("[::1]:6881".parse().unwrap()),
        );
        let encoded = contact.encode_compact();
        assert_eq!(encoded.len(), 38);
        let decoded = Contact::decode_compact_list(&encoded, Family::V6);
        assert_eq!(decoded, vec![contact]);
    }

    #[test]
    fn decode_compact_list_multiple() {
        let a = Contact::new(sample_id(1), Endpoint::new("1.2.3.4:1".parse().unwrap()));
        let b = Contact::new(sample_id(2), Endpoint::new("5.6.7.8:2".parse().unwrap()));
        let encoded = Contact::encode_compact_list(&[a, b]);
        let decoded = Contact::decode_compact_list(&encoded, Family::V4);
        assert_eq!(decoded, vec![a, b]);
    }

    #[test]
    fn decode_compact_list_ignores_truncated_trailer() {
        let a = Contact::new(sample_id(1), Endpoint::new("1.2.3.4:1".parse().unwrap()));
        let mut encoded = a.encode_compact();
        encoded.extend_from_slice(&[0u8; 5]); // short trailing garbage
        let decoded = Contact::decode_compact_list(&encoded, Family::V4);
        assert_eq!(decoded, vec![a]);
    }
}
