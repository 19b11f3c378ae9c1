//! Reconnect policy and backoff calculation.
//!
//! The math here is pure so it can be tested without timers:
//!
//! - [`ReconnectPolicy::base_delay_ms`]: capped exponential component
//! - [`ReconnectPolicy::delay_with_jitter`]: exponential component plus an
//!   explicit jitter sample
//! - [`ReconnectPolicy::delay`]: same, sampling jitter from the thread RNG
//!
//! The connection task owns the timer; it only asks the policy how long to
//! wait and whether another attempt is allowed.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default maximum automatic reconnect attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default delay cap in milliseconds.
pub const DEFAULT_CAP_DELAY_MS: u64 = 30_000;
/// Default exclusive upper bound of the jitter term in milliseconds.
pub const DEFAULT_JITTER_MAX_MS: u64 = 1000;

/// Automatic reconnect parameters.
///
/// `delay(k) = min(cap_delay_ms, base_delay_ms * 2^(k-1)) + jitter` with
/// `jitter` drawn from `[0, jitter_max_ms)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectPolicy {
    /// Attempts allowed after an unexpected closure before giving up (0 disables).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first attempt, in ms.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound for the exponential component, in ms.
    #[serde(default = "default_cap_delay_ms")]
    pub cap_delay_ms: u64,
    /// Exclusive upper bound for the random jitter, in ms (0 disables jitter).
    #[serde(default = "default_jitter_max_ms")]
    pub jitter_max_ms: u64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}
fn default_cap_delay_ms() -> u64 {
    DEFAULT_CAP_DELAY_MS
}
fn default_jitter_max_ms() -> u64 {
    DEFAULT_JITTER_MAX_MS
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            cap_delay_ms: DEFAULT_CAP_DELAY_MS,
            jitter_max_ms: DEFAULT_JITTER_MAX_MS,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backoff calculation
// ─────────────────────────────────────────────────────────────────────────────

impl ReconnectPolicy {
    /// Whether another automatic attempt is allowed after `attempts_made`.
    #[must_use]
    pub fn allows_attempt(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    /// Capped exponential component for a one-based `attempt`.
    ///
    /// Attempt 0 is treated like attempt 1.
    #[must_use]
    pub fn base_delay_ms(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1).min(63);
        let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        self.base_delay_ms
            .saturating_mul(factor)
            .min(self.cap_delay_ms)
    }

    /// Delay for `attempt` with an explicit jitter sample in ms.
    ///
    /// The sample is clamped into `[0, jitter_max_ms)`.
    #[must_use]
    pub fn delay_with_jitter(&self, attempt: u32, jitter_ms: u64) -> Duration {
        let jitter = if self.jitter_max_ms == 0 {
            0
        } else {
            jitter_ms.min(self.jitter_max_ms - 1)
        };
        Duration::from_millis(self.base_delay_ms(attempt).saturating_add(jitter))
    }

    /// Delay for `attempt`, sampling jitter from the thread-local RNG.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter = if self.jitter_max_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..self.jitter_max_ms)
        };
        self.delay_with_jitter(attempt, jitter)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn no_jitter() -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: 10,
            base_delay_ms: 1000,
            cap_delay_ms: 30_000,
            jitter_max_ms: 0,
        }
    }

    #[test]
    fn policy_defaults() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay_ms, 1000);
        assert_eq!(policy.cap_delay_ms, 30_000);
        assert_eq!(policy.jitter_max_ms, 1000);
    }

    #[test]
    fn policy_serde_defaults() {
        let policy: ReconnectPolicy = serde_json::from_str(r#"{"maxAttempts": 2}"#).unwrap();
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.base_delay_ms, 1000);
    }

    #[test]
    fn backoff_exponential_growth() {
        let policy = no_jitter();
        assert_eq!(policy.delay(1), Duration::from_millis(1000));
        assert_eq!(policy.delay(2), Duration::from_millis(2000));
        assert_eq!(policy.delay(3), Duration::from_millis(4000));
        assert_eq!(policy.delay(4), Duration::from_millis(8000));
    }

    #[test]
    fn backoff_caps_at_max() {
        assert_eq!(no_jitter().base_delay_ms(10), 30_000);
    }

    #[test]
    fn backoff_high_attempt_no_overflow() {
        assert_eq!(no_jitter().base_delay_ms(u32::MAX), 30_000);
    }

    #[test]
    fn attempt_zero_behaves_like_first() {
        assert_eq!(no_jitter().base_delay_ms(0), 1000);
    }

    #[test]
    fn jitter_is_clamped_below_max() {
        let policy = ReconnectPolicy {
            jitter_max_ms: 100,
            ..no_jitter()
        };
        assert_eq!(policy.delay_with_jitter(1, 5_000), Duration::from_millis(1099));
    }

    #[test]
    fn allows_attempt_respects_max() {
        let policy = ReconnectPolicy {
            max_attempts: 2,
            ..no_jitter()
        };
        assert!(policy.allows_attempt(0));
        assert!(policy.allows_attempt(1));
        assert!(!policy.allows_attempt(2));
    }

    #[test]
    fn zero_max_attempts_never_allows() {
        let policy = ReconnectPolicy {
            max_attempts: 0,
            ..no_jitter()
        };
        assert!(!policy.allows_attempt(0));
    }

    proptest! {
        #[test]
        fn delay_within_bounds(
            attempt in 1u32..=64,
            base in 1u64..10_000,
            cap in 1u64..120_000,
            jitter_max in 0u64..5_000,
        ) {
            let policy = ReconnectPolicy {
                max_attempts: 64,
                base_delay_ms: base,
                cap_delay_ms: cap,
                jitter_max_ms: jitter_max,
            };
            let exponent = attempt - 1;
            let expected = if exponent >= 63 {
                cap
            } else {
                base.saturating_mul(1u64 << exponent).min(cap)
            };
            let delay = u64::try_from(policy.delay(attempt).as_millis()).unwrap();
            prop_assert!(delay >= expected);
            if jitter_max == 0 {
                prop_assert_eq!(delay, expected);
            } else {
                prop_assert!(delay < expected + jitter_max);
            }
        }
    }
}
