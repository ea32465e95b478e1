//! Redis handle shared by seeding runs and smoke checks.
//!
//! Values are stored as JSON strings. Every key passed in is expected to
//! already carry the deployment prefix; build it with [`RedisCache::key`].

use redis::{AsyncCommands, Client, aio::ConnectionManager};
use serde::{Serialize, de::DeserializeOwned};
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::config::CacheConfig;

/// Keys fetched per `SCAN` round trip when deleting by pattern.
const SCAN_BATCH: usize = 200;

#[derive(Clone)]
pub struct RedisCache {
    client: Client,
    conn: ConnectionManager,
    default_ttl: Duration,
    key_prefix: String,
}

impl fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCache")
            .field("default_ttl", &self.default_ttl)
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Connection(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unexpected reply: {0}")]
    Unexpected(String),

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),
}

impl RedisCache {
    /// Opens a managed connection; fails fast when the server is unreachable.
    pub async fn connect(redis_url: &str, default_ttl: Duration, key_prefix: &str) -> Result<Self, CacheError> {
        let client = Client::open(redis_url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        debug!(redis.prefix = %key_prefix, "Redis connected");

        Ok(Self {
            client,
            conn,
            default_ttl,
            key_prefix: key_prefix.trim_end_matches(':').to_string(),
        })
    }

    pub async fn from_config(config: &CacheConfig) -> Result<Self, CacheError> {
        Self::connect(&config.redis_url, config.default_ttl(), &config.key_prefix).await
    }

    /// Applies the deployment prefix to a key built by [`crate::keys`].
    pub fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.key_prefix, suffix)
    }

    pub fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }

    /// Needed for dedicated pub/sub connections.
    pub fn client(&self) -> &Client {
        &self.client
    }

    #[instrument(skip(self), fields(cache.operation = "PING"))]
    pub async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let reply: String = redis::cmd("PING").query_async(&mut conn).await?;
        if reply != "PONG" {
            return Err(CacheError::Unexpected(reply));
        }
        Ok(())
    }

    /// Reads a JSON value. A missing key is `Ok(None)`.
    #[instrument(skip(self), fields(cache.operation = "GET"))]
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await?;
        debug!(cache.key = %key, hit = raw.is_some(), "GET");
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Writes a JSON value with `ttl`, or the configured default TTL.
    #[instrument(skip(self, value), fields(cache.operation = "SETEX"))]
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<(), CacheError> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let json = serde_json::to_string(value)?;
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, json, ttl.as_secs().max(1)).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(cache.operation = "DEL"))]
    pub async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    /// Deletes every key matching a glob pattern, walking the keyspace with
    /// `SCAN` so the server is never blocked. Returns the number deleted.
    #[instrument(skip(self), fields(cache.operation = "SCAN+DEL"))]
    pub async fn delete_matching(&self, pattern: &str) -> Result<u64, CacheError> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut deleted = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let n: u64 = conn.del(&keys).await?;
                deleted += n;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(cache.pattern = %pattern, deleted, "Pattern deleted");
        Ok(deleted)
    }

    pub async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        Ok(conn.exists(key).await?)
    }

    /// Remaining lifetime in seconds; `None` for a missing or persistent key.
    pub async fn ttl(&self, key: &str) -> Result<Option<i64>, CacheError> {
        let mut conn = self.conn.clone();
        let secs: i64 = conn.ttl(key).await?;
        Ok((secs > 0).then_some(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, serde::Deserialize, PartialEq)]
    struct CachedMenu {
        role: String,
        codes: Vec<String>,
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_json_round_trip_and_pattern_delete() {
        let cache = RedisCache::connect("redis://localhost:6379", Duration::from_secs(60), "kinder-test:")
            .await
            .unwrap();

        let data = CachedMenu {
            role: "teacher".to_string(),
            codes: vec!["DASHBOARD".to_string()],
        };
        let key = cache.key("role_permissions:teacher");

        cache.set_json(&key, &data, None).await.unwrap();
        let back: Option<CachedMenu> = cache.get_json(&key).await.unwrap();
        assert_eq!(back, Some(data));
        assert!(cache.ttl(&key).await.unwrap().is_some());

        let deleted = cache.delete_matching(&cache.key("role_permissions:*")).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(!cache.exists(&key).await.unwrap());
        assert!(!cache.delete(&key).await.unwrap());
    }
}
