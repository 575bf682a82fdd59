//! Write-authorization tokens for `announce_peer` (spec §4.1).
//!
//! Tokens are not cryptographic: they only need to make a requester prove
//! it recently received a `get_peers` reply from this endpoint, so a keyed
//! FNV-style hash over the rotating secret and the requester's address is
//! enough, matching the original daemon's own non-cryptographic scheme.

use std::time::Instant;

use rand::Rng;

use crate::constants::TOKEN_ROTATION_PERIOD;
use crate::endpoint::Endpoint;

pub struct TokenAuthority {
    current_secret: u64,
    previous_secret: u64,
    last_rotation: Instant,
}

impl TokenAuthority {
    pub fn new(now: Instant) -> Self {
        let mut rng = rand::thread_rng();
        TokenAuthority {
            current_secret: rng.gen(),
            previous_secret: rng.gen(),
            last_rotation: now,
        }
    }

    /// Rotates the secret if a full rotation period has elapsed, keeping the
    /// outgoing secret as `previous` for one more period (spec: "keeps the
    /// previous secret one rotation longer").
    pub fn maybe_rotate(&mut self, now: Instant) {
        if now.duration_since(self.last_rotation) >= TOKEN_ROTATION_PERIOD {
            self.previous_secret = self.current_secret;
            self.current_secret = rand::thread_rng().gen();
            self.last_rotation = now;
        }
    }

    pub fn issue(&self, endpoint: &Endpoint) -> Vec<u8> {
        hash_token(self.current_secret, endpoint)
    }

    /// Accepts a token bound to `endpoint` if it matches either the current
    /// or the immediately preceding secret.
    pub fn verify(&self, endpoint: &Endpoint, token: &[u8]) -> bool {
        token == hash_token(self.current_secret, endpoint).as_slice()
            || token == hash_token(self.previous_secret, endpoint).as_slice()
    }
}

fn hash_token(secret: u64, endpoint: &Endpoint) -> Vec<u8> {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut h = FNV_OFFSET ^ secret;
    for byte in secret.to_be_bytes().iter().chain(endpoint.compact_peer().iter()) {
        h ^= *byte as u64;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h.to_be_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn endpoint() -> Endpoint {
        Endpoint::new("1.2.3.4:6881".parse().unwrap())
    }

    #[test]
    fn issued_token_verifies_immediately() {
        let authority = TokenAuthority::new(Instant::now());
        let token = authority.issue(&endpoint());
        assert!(authority.verify(&endpoint(), &token));
    }

    #[test]
    fn token_is_bound_to_the_endpoint() {
        let authority = TokenAuthority::new(Instant::now());
        let token = authority.issue(&endpoint());
        let other = Endpoint::new("9.9.9.9:1".parse().unwrap());
        assert!(!authority.verify(&other, &token));
    }

    #[test]
    fn token_survives_one_rotation_but_not_two() {
        let start = Instant::now();
        let mut authority = TokenAuthority::new(start);
        let token = authority.issue(&endpoint());

        authority.maybe_rotate(start + TOKEN_ROTATION_PERIOD + Duration::from_secs(1));
        assert!(authority.verify(&endpoint(), &token));

        authority.maybe_rotate(start + TOKEN_ROTATION_PERIOD * 2 + Duration::from_secs(2));
        assert!(!authority.verify(&endpoint(), &token));
    }
}
