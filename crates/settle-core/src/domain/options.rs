//! Retry options: whether to retry, how many times, and how long to wait.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_RETRY_COUNT: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Resolved retry options for one machine.
///
/// Built once when the machine is constructed and shared read-only (behind an
/// `Arc`) with every execution unit the machine spawns.
///
/// The delay is fixed: no exponential growth, no jitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetryOptions {
    /// Gates whether the retry branch is ever taken.
    pub retry_enabled: bool,

    /// Maximum number of additional attempts after the first failure.
    pub retry_count: u32,

    /// Delay before each retry attempt.
    pub retry_delay: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            retry_enabled: false,
            retry_count: DEFAULT_RETRY_COUNT,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryOptions {
    /// Merge caller overrides onto the defaults.
    pub fn resolve(overrides: &RetryOverrides) -> Self {
        let defaults = Self::default();
        Self {
            retry_enabled: overrides.retry_enabled.unwrap_or(defaults.retry_enabled),
            retry_count: overrides.retry_count.unwrap_or(defaults.retry_count),
            retry_delay: overrides
                .retry_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_delay),
        }
    }

    /// Retry guard, evaluated after a failed attempt.
    ///
    /// # Arguments
    /// * `retry_attempts` - Retries already taken in this cycle (0 after the first failure).
    ///
    /// `retry_count = 0` therefore never retries, even when enabled.
    pub fn allows_retry(&self, retry_attempts: u32) -> bool {
        self.retry_enabled && retry_attempts < self.retry_count
    }

    /// Upper bound on executor invocations for one cycle.
    pub fn max_invocations(&self) -> u32 {
        if self.retry_enabled {
            self.retry_count.saturating_add(1)
        } else {
            1
        }
    }
}

/// Caller-supplied overrides. Every field is optional; missing ones fall back
/// to the defaults in `RetryOptions::default()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryOverrides {
    pub retry_enabled: Option<bool>,
    pub retry_count: Option<u32>,
    pub retry_delay_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn defaults_match_documented_values() {
        let options = RetryOptions::default();
        assert!(!options.retry_enabled);
        assert_eq!(options.retry_count, 3);
        assert_eq!(options.retry_delay, Duration::from_millis(1000));
    }

    #[test]
    fn empty_overrides_resolve_to_defaults() {
        let options = RetryOptions::resolve(&RetryOverrides::default());
        assert_eq!(options, RetryOptions::default());
    }

    #[test]
    fn overrides_replace_only_given_fields() {
        let overrides = RetryOverrides {
            retry_enabled: Some(true),
            retry_delay_ms: Some(10),
            ..Default::default()
        };
        let options = RetryOptions::resolve(&overrides);
        assert!(options.retry_enabled);
        assert_eq!(options.retry_count, DEFAULT_RETRY_COUNT);
        assert_eq!(options.retry_delay, Duration::from_millis(10));
    }

    #[test]
    fn overrides_deserialize_with_missing_fields() {
        let json = r#"{ "retry_count": 7 }"#;
        let overrides: RetryOverrides = serde_json::from_str(json).expect("deserialize");
        assert_eq!(overrides.retry_count, Some(7));
        assert_eq!(overrides.retry_enabled, None);

        let options = RetryOptions::resolve(&overrides);
        assert!(!options.retry_enabled);
        assert_eq!(options.retry_count, 7);
    }

    #[rstest]
    #[case::disabled(false, 3, 0, false)]
    #[case::disabled_ignores_count(false, 10, 5, false)]
    #[case::zero_count(true, 0, 0, false)]
    #[case::first_failure(true, 2, 0, true)]
    #[case::last_retry(true, 2, 1, true)]
    #[case::exhausted(true, 2, 2, false)]
    fn retry_guard(
        #[case] retry_enabled: bool,
        #[case] retry_count: u32,
        #[case] retry_attempts: u32,
        #[case] expected: bool,
    ) {
        let options = RetryOptions {
            retry_enabled,
            retry_count,
            retry_delay: Duration::from_millis(1),
        };
        assert_eq!(options.allows_retry(retry_attempts), expected);
    }

    #[test]
    fn max_invocations_counts_first_attempt() {
        let mut options = RetryOptions::default();
        assert_eq!(options.max_invocations(), 1);

        options.retry_enabled = true;
        assert_eq!(options.max_invocations(), 4);
    }
}
