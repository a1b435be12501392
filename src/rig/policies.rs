// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Reconnect and retry policy for the Connection.

use std::time::Duration;

use crate::error::RigError;

/// Policy governing whether and how long to wait before retrying a failed
/// operation.
pub trait RetryPolicy: Send + Sync {
    fn should_retry(&self, attempt: u32, error: &RigError) -> bool;
    fn delay(&self, attempt: u32) -> Duration;
}

/// Exponential backoff starting at `base_delay`, doubling per attempt,
/// capped at `max_delay`, with +/-20% jitter so that many rigs reconnecting
/// at once don't all retry in lockstep.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base_delay: Duration,
    max_delay: Duration,
}

impl ExponentialBackoff {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
        }
    }

    /// 500ms base, 5s cap, as specified for Connection reconnect.
    pub fn default_reconnect() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(5))
    }

    fn base_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(multiplier).min(self.max_delay)
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn should_retry(&self, _attempt: u32, error: &RigError) -> bool {
        error.is_transient()
    }

    fn delay(&self, attempt: u32) -> Duration {
        jitter(self.base_for_attempt(attempt), attempt)
    }
}

/// Apply +/-20% jitter to `base`, seeded from the current time and the
/// attempt count so concurrent rigs don't pick the same delay.
fn jitter(base: Duration, attempt: u32) -> Duration {
    let seed = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
        ^ (attempt as u64).wrapping_mul(0x9E3779B97F4A7C15);
    // splitmix64 finalizer, good enough to decorrelate the jitter factor
    // from the raw seed without pulling in a PRNG crate.
    let mut z = seed.wrapping_add(0x9E3779B97F4A7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^= z >> 31;
    // map to [-0.2, 0.2]
    let unit = (z % 4001) as f64 / 4000.0; // [0,1]
    let factor = 1.0 + (unit - 0.5) * 0.4;
    Duration::from_secs_f64((base.as_secs_f64() * factor).max(0.0))
}

/// Number of consecutive in-flight failures after which a Client surrenders
/// its Connection for a reconnect cycle.
pub const CONSECUTIVE_IO_FAILURE_LIMIT: u32 = 3;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = ExponentialBackoff::new(Duration::from_millis(500), Duration::from_secs(5));
        for attempt in 0..6 {
            let d = policy.base_for_attempt(attempt);
            assert!(d <= Duration::from_secs(5));
        }
        assert_eq!(policy.base_for_attempt(0), Duration::from_millis(500));
        assert_eq!(policy.base_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(policy.base_for_attempt(10), Duration::from_secs(5));
    }

    #[test]
    fn jitter_stays_within_twenty_percent() {
        let base = Duration::from_millis(1000);
        for attempt in 0..50 {
            let d = jitter(base, attempt);
            assert!(d >= Duration::from_millis(790));
            assert!(d <= Duration::from_millis(1210));
        }
    }

    #[test]
    fn only_transient_errors_are_retried() {
        let policy = ExponentialBackoff::default_reconnect();
        assert!(policy.should_retry(0, &RigError::io("connect", "refused")));
        assert!(!policy.should_retry(0, &RigError::band("out of range")));
    }
}
