//! Throttling configuration for batched calls to external providers.
//!
//! Asset generators process their work list in fixed-size concurrent
//! batches separated by a fixed delay. Optionally a token bucket can pace
//! individual calls on top of that.
//!
//! # Configuration
//!
//! - `THROTTLE_BATCH_SIZE`: Items issued concurrently per batch (default: 5)
//! - `THROTTLE_DELAY_MS`: Sleep between batches in milliseconds (default: 5000)
//! - `THROTTLE_PER_SECOND`: Token replenishment rate; enables pacing when set
//! - `THROTTLE_BURST`: Bucket capacity when pacing (default: same as batch size)
//!
//! # Example
//!
//! ```ignore
//! use kinder_config::ThrottleConfig;
//!
//! let config = ThrottleConfig::from_env().with_batch_size(10);
//! if let Some(quota) = config.quota() {
//!     let limiter = governor::RateLimiter::direct(quota);
//! }
//! ```

use governor::Quota;
use std::num::NonZeroU32;
use std::time::Duration;

use crate::{env_lookup, parse_or};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThrottleConfig {
    /// Number of items issued concurrently per batch. Never zero.
    pub batch_size: usize,

    /// Sleep after every batch except the last.
    pub delay_ms: u64,

    /// Token replenishment rate for the optional per-call pacing.
    pub per_second: Option<u32>,

    /// Token bucket capacity for the optional per-call pacing.
    pub burst: Option<u32>,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            delay_ms: 5000,
            per_second: None,
            burst: None,
        }
    }
}

impl ThrottleConfig {
    /// Creates a `ThrottleConfig` from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            batch_size: parse_or(&lookup, "THROTTLE_BATCH_SIZE", defaults.batch_size).max(1),
            delay_ms: parse_or(&lookup, "THROTTLE_DELAY_MS", defaults.delay_ms),
            per_second: lookup("THROTTLE_PER_SECOND").and_then(|v| v.trim().parse().ok()),
            burst: lookup("THROTTLE_BURST").and_then(|v| v.trim().parse().ok()),
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    #[must_use]
    pub fn with_pacing(mut self, per_second: Option<u32>, burst: Option<u32>) -> Self {
        self.per_second = per_second;
        self.burst = burst;
        self
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Token-bucket quota for per-call pacing, if configured.
    ///
    /// Returns `None` when `per_second` is unset or zero. The burst defaults
    /// to the batch size so a full batch can start without waiting.
    pub fn quota(&self) -> Option<Quota> {
        let rate = NonZeroU32::new(self.per_second?)?;
        let burst = self
            .burst
            .and_then(NonZeroU32::new)
            .or_else(|| NonZeroU32::new(u32::try_from(self.batch_size).unwrap_or(u32::MAX)))
            .unwrap_or(NonZeroU32::MIN);
        Some(Quota::per_second(rate).allow_burst(burst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ThrottleConfig::default();
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.delay(), Duration::from_millis(5000));
        assert!(config.quota().is_none());
    }

    #[test]
    fn test_from_lookup_reads_values() {
        let config = ThrottleConfig::from_lookup(lookup_from(&[
            ("THROTTLE_BATCH_SIZE", "10"),
            ("THROTTLE_DELAY_MS", "20000"),
            ("THROTTLE_PER_SECOND", "2"),
        ]));
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.delay_ms, 20000);
        assert_eq!(config.per_second, Some(2));
        assert!(config.quota().is_some());
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = ThrottleConfig::from_lookup(lookup_from(&[
            ("THROTTLE_BATCH_SIZE", "lots"),
            ("THROTTLE_DELAY_MS", "-1"),
        ]));
        assert_eq!(config, ThrottleConfig::default());
    }

    #[test]
    fn test_batch_size_never_zero() {
        let config = ThrottleConfig::from_lookup(lookup_from(&[("THROTTLE_BATCH_SIZE", "0")]));
        assert_eq!(config.batch_size, 1);
        assert_eq!(ThrottleConfig::default().with_batch_size(0).batch_size, 1);
    }

    #[test]
    fn test_zero_rate_disables_pacing() {
        let config = ThrottleConfig::default().with_pacing(Some(0), Some(3));
        assert!(config.quota().is_none());
    }
}
