//! Out-of-band auth tokens issued on `auth-mud-req` and consumed once by
//! the peer mud's direct TCP connection to prove it's who it claims.
//!
//! Each token is a 63-bit cryptographically random integer (the router
//! protocol reserves the sign bit), tied to the `(peer_mud, issued_at)`
//! pair that requested it, valid for ten minutes, and good for exactly
//! one presentation.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use i3g_domain::trace::TraceEvent;
use parking_lot::Mutex;
use rand::RngCore;

const TOKEN_TTL: Duration = Duration::from_secs(600);

struct IssuedToken {
    peer_mud: String,
    issued_at: DateTime<Utc>,
    expires_at: Instant,
}

/// Owns every outstanding OOB token. One instance per gateway.
#[derive(Default)]
pub struct AuthTokenRegistry {
    tokens: Mutex<HashMap<i64, IssuedToken>>,
}

impl AuthTokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a token for `peer_mud`, returning the token value and the
    /// `issued_at` timestamp it's bound to (both go back to the router in
    /// `auth-mud-reply`).
    pub fn issue(&self, peer_mud: &str) -> (i64, DateTime<Utc>) {
        let token = random_63_bit();
        let issued_at = Utc::now();
        self.tokens.lock().insert(
            token,
            IssuedToken {
                peer_mud: peer_mud.to_string(),
                issued_at,
                expires_at: Instant::now() + TOKEN_TTL,
            },
        );
        TraceEvent::AuthTokenIssued { peer_mud: peer_mud.to_string() }.emit();
        (token, issued_at)
    }

    /// Consume a presented token for `peer_mud`. Succeeds exactly once per
    /// issued token; a second presentation, an unknown token, an expired
    /// token, or a mismatched `peer_mud` are all rejected with a reason
    /// for the trace log.
    pub fn consume(&self, peer_mud: &str, token: i64) -> Result<(), &'static str> {
        let mut tokens = self.tokens.lock();
        let Some(issued) = tokens.get(&token) else {
            TraceEvent::AuthTokenRejected {
                peer_mud: peer_mud.to_string(),
                reason: "unknown token".into(),
            }
            .emit();
            return Err("not-allowed");
        };
        if issued.peer_mud != peer_mud {
            TraceEvent::AuthTokenRejected {
                peer_mud: peer_mud.to_string(),
                reason: "mud mismatch".into(),
            }
            .emit();
            return Err("not-allowed");
        }
        if Instant::now() >= issued.expires_at {
            tokens.remove(&token);
            TraceEvent::AuthTokenRejected {
                peer_mud: peer_mud.to_string(),
                reason: "expired".into(),
            }
            .emit();
            return Err("not-allowed");
        }
        tokens.remove(&token);
        TraceEvent::AuthTokenConsumed { peer_mud: peer_mud.to_string() }.emit();
        Ok(())
    }

    /// Drop every token past its TTL. Returns the count removed.
    pub fn sweep_expired(&self) -> usize {
        let mut tokens = self.tokens.lock();
        let now = Instant::now();
        let before = tokens.len();
        tokens.retain(|_, t| t.expires_at > now);
        before - tokens.len()
    }
}

/// A non-negative 63-bit random integer — the protocol reserves the sign
/// bit, so the top bit of the 64-bit draw is always cleared.
fn random_63_bit() -> i64 {
    let raw = rand::thread_rng().next_u64() & 0x7fff_ffff_ffff_ffff;
    raw as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_non_negative() {
        for _ in 0..100 {
            assert!(random_63_bit() >= 0);
        }
    }

    #[test]
    fn issued_token_is_consumable_once() {
        let reg = AuthTokenRegistry::new();
        let (token, _) = reg.issue("OtherMUD");
        assert!(reg.consume("OtherMUD", token).is_ok());
        assert_eq!(reg.consume("OtherMUD", token), Err("not-allowed"));
    }

    #[test]
    fn unknown_token_is_rejected() {
        let reg = AuthTokenRegistry::new();
        assert_eq!(reg.consume("OtherMUD", 12345), Err("not-allowed"));
    }

    #[test]
    fn mud_mismatch_is_rejected() {
        let reg = AuthTokenRegistry::new();
        let (token, _) = reg.issue("OtherMUD");
        assert_eq!(reg.consume("ThirdMUD", token), Err("not-allowed"));
    }

    #[test]
    fn expired_token_is_rejected() {
        let reg = AuthTokenRegistry::new();
        let (token, _) = reg.issue("OtherMUD");
        reg.tokens.lock().get_mut(&token).unwrap().expires_at =
            Instant::now() - Duration::from_secs(1);
        assert_eq!(reg.consume("OtherMUD", token), Err("not-allowed"));
    }

    #[test]
    fn sweep_removes_only_expired() {
        let reg = AuthTokenRegistry::new();
        let (token, _) = reg.issue("OtherMUD");
        reg.tokens.lock().get_mut(&token).unwrap().expires_at =
            Instant::now() - Duration::from_secs(1);
        let (fresh, _) = reg.issue("ThirdMUD");
        let removed = reg.sweep_expired();
        assert_eq!(removed, 1);
        assert!(reg.consume("ThirdMUD", fresh).is_ok());
    }
}
