//! Single-holder lock on a Redis key.
//!
//! The holder writes a random token with `SET NX PX`; release deletes the
//! key only while it still carries that token, so an expired holder never
//! removes a successor's lock.

use redis::Script;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::keys::locks;
use crate::redis::{CacheError, RedisCache};

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

pub struct DistributedLock;

impl DistributedLock {
    /// Tries once to take the lock named `name`.
    ///
    /// Returns `Ok(None)` when another holder has it.
    pub async fn acquire(
        cache: &RedisCache,
        name: &str,
        ttl: Duration,
    ) -> Result<Option<LockGuard>, CacheError> {
        let key = cache.key(&locks::lock(name));
        let token = Uuid::new_v4().to_string();
        let mut conn = cache.connection();

        let reply: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis().max(1) as u64)
            .query_async(&mut conn)
            .await?;

        if reply.is_none() {
            debug!(lock.key = %key, "Lock held elsewhere");
            return Ok(None);
        }

        debug!(lock.key = %key, lock.ttl_ms = ttl.as_millis() as u64, "Lock acquired");
        Ok(Some(LockGuard {
            cache: cache.clone(),
            key,
            token,
        }))
    }
}

/// Proof of holding a lock. Call [`release`](Self::release) when done;
/// a dropped guard simply lets the TTL run out.
#[derive(Debug)]
pub struct LockGuard {
    cache: RedisCache,
    key: String,
    token: String,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Releases the lock. Returns `false` when it had already expired or
    /// passed to another holder.
    pub async fn release(self) -> Result<bool, CacheError> {
        let mut conn = self.cache.connection();
        let removed: i64 = Script::new(RELEASE_SCRIPT)
            .key(&self.key)
            .arg(&self.token)
            .invoke_async(&mut conn)
            .await?;

        if removed == 0 {
            warn!(lock.key = %self.key, "Lock expired before release");
        } else {
            debug!(lock.key = %self.key, "Lock released");
        }
        Ok(removed == 1)
    }
}
