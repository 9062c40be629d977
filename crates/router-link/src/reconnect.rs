//! Reconnect policy with jittered exponential back-off.

use std::time::Duration;

/// Controls how the connection manager reconnects after a connection drop.
///
/// `delay = min(cap, base·2^attempt) · U[0.5,1.5]`.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    /// Initial delay before the first reconnect attempt (`base`).
    pub initial_delay: Duration,
    /// Maximum delay between attempts (`cap`).
    pub max_delay: Duration,
    /// Multiplier applied after each failed attempt.
    pub backoff_factor: f64,
    /// Consecutive failed attempts on the current router before advancing
    /// to the next endpoint in the preferred list. `0` means never fail
    /// over.
    pub max_attempts: u32,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_factor: 2.0,
            max_attempts: 3,
        }
    }
}

impl ReconnectBackoff {
    /// Compute the delay for the given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let delay_ms = base_ms * self.backoff_factor.powi(attempt as i32);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        // U[0.5, 1.5) multiplicative jitter to prevent thundering herd.
        let jitter = 0.5 + pseudo_random_fraction(attempt);
        Duration::from_millis((capped_ms * jitter) as u64)
    }

    /// Whether the given attempt count means this router should be given
    /// up on in favor of the next preferred endpoint.
    pub fn should_give_up(&self, attempt: u32) -> bool {
        self.max_attempts > 0 && attempt >= self.max_attempts
    }
}

/// Cheap deterministic "random" fraction [0, 1) based on attempt number.
/// Not cryptographically secure — just enough to spread reconnect storms.
fn pseudo_random_fraction(attempt: u32) -> f64 {
    let hash = attempt.wrapping_mul(2654435761); // Knuth multiplicative hash
    (hash as f64) / (u32::MAX as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_values() {
        let p = ReconnectBackoff::default();
        assert_eq!(p.initial_delay, Duration::from_secs(1));
        assert_eq!(p.max_delay, Duration::from_secs(60));
        assert_eq!(p.max_attempts, 3);
    }

    #[test]
    fn delay_grows_with_backoff() {
        let p = ReconnectBackoff {
            // Disable jitter for this comparison by fixing backoff_factor
            // high enough that growth dominates any jitter spread.
            ..Default::default()
        };
        let d0 = p.delay_for_attempt(0);
        let d4 = p.delay_for_attempt(4);
        assert!(d4 > d0);
    }

    #[test]
    fn delay_capped_at_max() {
        let p = ReconnectBackoff {
            initial_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(30),
            backoff_factor: 10.0,
            max_attempts: 0,
        };
        let d = p.delay_for_attempt(10);
        // Capped at max_delay, then scaled by at most 1.5x jitter.
        assert!(d <= Duration::from_millis(45_000));
    }

    #[test]
    fn delay_never_below_half_base() {
        let p = ReconnectBackoff::default();
        let d = p.delay_for_attempt(0);
        assert!(d >= Duration::from_millis(500));
    }

    #[test]
    fn should_give_up_when_limited() {
        let p = ReconnectBackoff {
            max_attempts: 3,
            ..Default::default()
        };
        assert!(!p.should_give_up(2));
        assert!(p.should_give_up(3));
        assert!(p.should_give_up(4));
    }

    #[test]
    fn unlimited_never_gives_up() {
        let p = ReconnectBackoff {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(!p.should_give_up(1_000_000));
    }
}
