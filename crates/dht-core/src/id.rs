//! 160-bit node/info-hash identifiers and the XOR distance metric.

use std::fmt;
use std::ops::BitXor;

use rand::RngCore;

/// Length in bytes of a DHT identifier (SHA-1 sized, as in the Mainline protocol).
pub const ID_LENGTH: usize = 20;

/// A 160-bit opaque identifier: a node id or an info hash / lookup target.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id([u8; ID_LENGTH]);

impl Id {
    pub const ZERO: Id = Id([0u8; ID_LENGTH]);

    pub fn from_bytes(bytes: [u8; ID_LENGTH]) -> Self {
        Id(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ID_LENGTH] {
        &self.0
    }

    /// Generates a node id uniformly at random. Called once at startup;
    /// the resulting id is kept for the process lifetime (spec §3 invariant).
    pub fn random() -> Self {
        let mut buf = [0u8; ID_LENGTH];
        rand::thread_rng().fill_bytes(&mut buf);
        Id(buf)
    }

    /// Parses a 40-character hex string (case-insensitive) into an id.
    pub fn from_hex(s: &str) -> Result<Self, IdParseError> {
        if s.len() != ID_LENGTH * 2 {
            return Err(IdParseError::WrongLength(s.len()));
        }
        let bytes = hex::decode(s).map_err(|_| IdParseError::NotHex)?;
        let mut out = [0u8; ID_LENGTH];
        out.copy_from_slice(&bytes);
        Ok(Id(out))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// XOR distance to another id, interpreted as a 160-bit unsigned integer
    /// via big-endian byte-wise comparison (spec §3).
    pub fn distance(&self, other: &Id) -> Distance {
        let mut out = [0u8; ID_LENGTH];
        for i in 0..ID_LENGTH {
            out[i] = self.0[i] ^ other.0[i];
        }
        Distance(out)
    }

    /// True if `self` falls within the half-open range `[first, next)` of a
    /// bucket, compared as big-endian 160-bit unsigned integers.
    pub fn in_range(&self, first: &Id, next: Option<&Id>) -> bool {
        if self < first {
            return false;
        }
        match next {
            Some(next) => self < next,
            None => true,
        }
    }

    /// The id obtained by flipping bit `bit_index` (0 = most significant bit).
    pub fn with_bit(&self, bit_index: u32, value: bool) -> Id {
        let mut out = self.0;
        let byte = (bit_index / 8) as usize;
        let bit_in_byte = 7 - (bit_index % 8);
        if value {
            out[byte] |= 1 << bit_in_byte;
        } else {
            out[byte] &= !(1 << bit_in_byte);
        }
        out
    }

    /// The midpoint of the half-open range `[first, next)`, used to split a
    /// full bucket in two (spec §4.2). `next = None` stands for 2^160 (one
    /// past the largest id), so the range never needs a real big-integer type:
    /// both ends are widened by one zero byte and added/halved there.
    pub fn midpoint(first: &Id, next: Option<&Id>) -> Id {
        fn widen(id: &[u8; ID_LENGTH]) -> [u8; ID_LENGTH + 1] {
            let mut out = [0u8; ID_LENGTH + 1];
            out[1..].copy_from_slice(id);
            out
        }

        let lower = widen(&first.0);
        let upper = match next {
            Some(next) => widen(&next.0),
            None => {
                let mut out = [0u8; ID_LENGTH + 1];
                out[0] = 1;
                out
            }
        };

        let mut sum = [0u8; ID_LENGTH + 1];
        let mut carry = 0u16;
        for i in (0..=ID_LENGTH).rev() {
            let total = lower[i] as u16 + upper[i] as u16 + carry;
            sum[i] = (total & 0xff) as u8;
            carry = total >> 8;
        }

        // Divide `sum` by two (logical right shift by one bit).
        let mut mid = [0u8; ID_LENGTH + 1];
        let mut carry_bit = 0u8;
        for i in 0..=ID_LENGTH {
            let cur = sum[i];
            mid[i] = (cur >> 1) | (carry_bit << 7);
            carry_bit = cur & 1;
        }

        let mut out = [0u8; ID_LENGTH];
        out.copy_from_slice(&mid[1..]);
        Id(out)
    }
}

impl BitXor for Id {
    type Output = Distance;
    fn bitxor(self, rhs: Id) -> Distance {
        self.distance(&rhs)
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.to_hex())
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IdParseError {
    #[error("expected a 40-character hex string, got {0} characters")]
    WrongLength(usize),
    #[error("not a valid hex string")]
    NotHex,
}

/// The XOR distance between two ids, ordered the same way as a 160-bit
/// unsigned big-endian integer (spec §8 metric law).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Distance([u8; ID_LENGTH]);

impl Distance {
    pub const ZERO: Distance = Distance([0u8; ID_LENGTH]);

    /// Index of the highest set bit (0 = most significant bit of byte 0),
    /// or `None` if the distance is zero. Used to pick which bucket a node
    /// falls into relative to the local id.
    pub fn leading_bit(&self) -> Option<u32> {
        for (byte_idx, byte) in self.0.iter().enumerate() {
            if *byte != 0 {
                let bit_in_byte = byte.leading_zeros();
                return Some((byte_idx as u32) * 8 + bit_in_byte);
            }
        }
        None
    }
}

impl fmt::Debug for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Distance({})", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let s = "aabbccddeeff00112233445566778899aabbccdd";
        let id = Id::from_hex(s).unwrap();
        assert_eq!(id.to_hex(), s);
    }

    #[test]
    fn distance_is_a_metric() {
        let a = Id::random();
        let b = Id::random();
        let c = Id::random();

        assert_eq!(a.distance(&a), Distance::ZERO);
        assert_eq!(a.distance(&b), b.distance(&a));

        // triangle inequality, expressed over the XOR metric: dist(a,c) <= dist(a,b) XOR dist(b,c)
        let ac = a.distance(&c);
        let ab = a.distance(&b);
        let bc = b.distance(&c);
        let mut bound = [0u8; ID_LENGTH];
        for i in 0..ID_LENGTH {
            bound[i] = ab.0[i] ^ bc.0[i];
        }
        assert!(ac.0 <= bound);
    }

    #[test]
    fn rejects_bad_hex() {
        assert_eq!(
            Id::from_hex("deadbeef"),
            Err(IdParseError::WrongLength(8))
        );
        assert_eq!(
            Id::from_hex("zzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz"),
            Err(IdParseError::NotHex)
        );
    }

    #[test]
    fn in_range_is_half_open() {
        let first = Id::from_bytes([0u8; ID_LENGTH]);
        let mut mid_bytes = [0u8; ID_LENGTH];
        mid_bytes[0] = 0x80;
        let mid = Id::from_bytes(mid_bytes);

        assert!(first.in_range(&first, Some(&mid)));
        assert!(!mid.in_range(&first, Some(&mid)));
        assert!(mid.in_range(&first, None));
    }

    #[test]
    fn midpoint_of_whole_range_is_half() {
        let first = Id::ZERO;
        let mid = Id::midpoint(&first, None);
        let mut expected = [0u8; ID_LENGTH];
        expected[0] = 0x80;
        assert_eq!(mid, Id::from_bytes(expected));
    }

    #[test]
    fn midpoint_is_between_bounds() {
        let first = Id::from_bytes([0x10; ID_LENGTH]);
        let mut next_bytes = [0x10; ID_LENGTH];
        next_bytes[ID_LENGTH - 1] = 0x30;
        let next = Id::from_bytes(next_bytes);
        let mid = Id::midpoint(&first, Some(&next));
        assert!(mid >= first);
        assert!(mid < next);
    }
}
