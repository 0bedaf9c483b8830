//! Reconnect backoff policy.
//!
//! Bounded exponential backoff for transport reconnection. The values here
//! are policy, not structure: embedders override them through settings
//! rather than this module hard-coding behavior at call sites.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default first-retry delay in milliseconds.
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1_000;
/// Default backoff multiplier per attempt.
pub const DEFAULT_BACKOFF_FACTOR: f64 = 1.5;
/// Default delay cap in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 10_000;
/// Default reconnect attempt budget.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
/// Default jitter factor (0.0–1.0).
pub const DEFAULT_JITTER_FACTOR: f64 = 0.0;

/// Bounded exponential backoff configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackoffPolicy {
    /// First-retry delay in ms (default: 1000).
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Multiplier per attempt (default: 1.5).
    #[serde(default = "default_factor")]
    pub factor: f64,
    /// Delay cap in ms (default: 10000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Attempt budget before giving up (default: 10).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Jitter factor 0.0–1.0 (default: 0.0, deterministic).
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

fn default_initial_delay_ms() -> u64 {
    DEFAULT_INITIAL_DELAY_MS
}
fn default_factor() -> f64 {
    DEFAULT_BACKOFF_FACTOR
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}
fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_jitter_factor() -> f64 {
    DEFAULT_JITTER_FACTOR
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: DEFAULT_INITIAL_DELAY_MS,
            factor: DEFAULT_BACKOFF_FACTOR,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry `attempt` (0-based).
    ///
    /// Formula: `min(max_delay, initial_delay * factor^attempt)`, widened by
    /// up to `jitter_factor` of itself when jitter is enabled.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.initial_delay_ms as f64 * self.factor.powi(attempt as i32);
        let capped = exp.min(self.max_delay_ms as f64);
        let jittered = if self.jitter_factor > 0.0 {
            capped * (1.0 + rand::random::<f64>() * self.jitter_factor)
        } else {
            capped
        };
        Duration::from_millis(jittered.min(self.max_delay_ms as f64) as u64)
    }

    /// Whether `attempt` (0-based) is within the budget.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.initial_delay_ms, 1_000);
        assert_eq!(policy.max_delay_ms, 10_000);
        assert_eq!(policy.max_attempts, 10);
    }

    #[test]
    fn delay_grows_by_factor() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(1_500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2_250));
    }

    #[test]
    fn delay_is_capped() {
        let policy = BackoffPolicy::default();
        // 1000 * 1.5^10 ≈ 57.7s, well past the cap
        assert_eq!(policy.delay_for(10), Duration::from_millis(10_000));
        assert_eq!(policy.delay_for(100), Duration::from_millis(10_000));
    }

    #[test]
    fn budget_enforced() {
        let policy = BackoffPolicy::default();
        assert!(policy.allows(0));
        assert!(policy.allows(9));
        assert!(!policy.allows(10));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = BackoffPolicy {
            jitter_factor: 0.2,
            ..BackoffPolicy::default()
        };
        for _ in 0..50 {
            let delay = policy.delay_for(1);
            assert!(delay >= Duration::from_millis(1_500));
            assert!(delay <= Duration::from_millis(1_800));
        }
    }

    #[test]
    fn deserialize_with_defaults() {
        let policy: BackoffPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(policy.max_attempts, DEFAULT_MAX_ATTEMPTS);
        let policy: BackoffPolicy =
            serde_json::from_str(r#"{"maxAttempts": 3, "initialDelayMs": 50}"#).unwrap();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay_ms, 50);
        assert_eq!(policy.max_delay_ms, DEFAULT_MAX_DELAY_MS);
    }
}
