//! Redis cache configuration.
//!
//! This module provides configuration for Redis connection settings
//! loaded from environment variables.

use std::env;
use std::time::Duration;

/// Redis cache configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `REDIS_URL`: Redis connection URL (default: `redis://127.0.0.1:6379`)
/// - `CACHE_TTL_SECONDS`: Default TTL for cached items in seconds (default: `300`)
/// - `CACHE_PREFIX`: Prefix the application puts on every key (default: `kinder`)
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Redis connection URL.
    pub redis_url: String,

    /// Default time-to-live for cached items in seconds.
    pub default_ttl_seconds: u64,

    /// Prefix for all cache keys to avoid collisions.
    pub key_prefix: String,
}

impl CacheConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            redis_url: lookup("REDIS_URL")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.redis_url),
            default_ttl_seconds: lookup("CACHE_TTL_SECONDS")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.default_ttl_seconds),
            key_prefix: lookup("CACHE_PREFIX")
                .map(|v| v.trim().trim_end_matches(':').to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.key_prefix),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }

    /// Build a prefixed cache key.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let config = CacheConfig::from_env();
    /// let key = config.prefixed_key("user_permissions:12");
    /// // Returns "kinder:user_permissions:12"
    /// ```
    pub fn prefixed_key(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".into(),
            default_ttl_seconds: 300,
            key_prefix: "kinder".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_when_unset() {
        let config = CacheConfig::from_lookup(|_| None);
        assert_eq!(config.redis_url, "redis://127.0.0.1:6379");
        assert_eq!(config.default_ttl(), Duration::from_secs(300));
        assert_eq!(config.prefixed_key("a:b"), "kinder:a:b");
    }

    #[test]
    fn test_overrides_and_trailing_colon() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("REDIS_URL", "redis://cache:6380/2"),
            ("CACHE_TTL_SECONDS", "60"),
            ("CACHE_PREFIX", "kyyup:"),
        ]);
        let config = CacheConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.redis_url, "redis://cache:6380/2");
        assert_eq!(config.default_ttl_seconds, 60);
        assert_eq!(config.prefixed_key("lock:x"), "kyyup:lock:x");
    }
}
