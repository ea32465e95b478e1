//! End-to-end checks against a live Redis.
//!
//! Each check runs against scratch keys namespaced by a per-run id and is
//! recorded as passed or failed with its detail; a failing check does not
//! stop the ones after it. Scratch keys are removed when the run ends.

use futures::StreamExt;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

use crate::keys::{sessions, smoke};
use crate::lock::DistributedLock;
use crate::redis::{CacheError, RedisCache};

/// Sessions created by checks belong to this user id, which an
/// auto-increment `users` table never hands out.
pub const SMOKE_USER_ID: i64 = 0;

const PUBSUB_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
    pub elapsed_ms: u128,
}

#[derive(Debug, Default)]
pub struct SmokeReport {
    pub checks: Vec<CheckResult>,
}

impl SmokeReport {
    fn record(&mut self, name: &'static str, started: Instant, outcome: Result<String, CacheError>) {
        let elapsed_ms = started.elapsed().as_millis();
        let (passed, detail) = match outcome {
            Ok(detail) => {
                info!(check = name, elapsed_ms, "Check passed");
                (true, detail)
            }
            Err(e) => {
                warn!(check = name, error = %e, "Check failed");
                (false, e.to_string())
            }
        };
        self.checks.push(CheckResult {
            name,
            passed,
            detail,
            elapsed_ms,
        });
    }

    pub fn passed(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    pub fn failed(&self) -> usize {
        self.checks.len() - self.passed()
    }

    pub fn is_success(&self) -> bool {
        !self.checks.is_empty() && self.failed() == 0
    }
}

impl fmt::Display for SmokeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for check in &self.checks {
            let mark = if check.passed { "✅" } else { "❌" };
            writeln!(
                f,
                "{} {:<12} {:>5}ms  {}",
                mark, check.name, check.elapsed_ms, check.detail
            )?;
        }
        write!(f, "{} passed, {} failed", self.passed(), self.failed())
    }
}

fn mismatch(what: &str, expected: impl fmt::Debug, actual: impl fmt::Debug) -> CacheError {
    CacheError::Unexpected(format!("{}: expected {:?}, got {:?}", what, expected, actual))
}

macro_rules! run_check {
    ($report:expr, $name:literal, $body:expr) => {{
        let started = Instant::now();
        let outcome = $body.await;
        $report.record($name, started, outcome);
    }};
}

/// Exercises the data structures the application relies on.
pub async fn run_cache_checks(cache: &RedisCache) -> SmokeReport {
    let run_id = Uuid::new_v4().simple().to_string();
    let mut report = SmokeReport::default();

    run_check!(report, "ping", async { cache.ping().await.map(|_| "PONG".to_string()) });
    run_check!(report, "string_ttl", check_string(cache, &run_id));
    run_check!(report, "hash", check_hash(cache, &run_id));
    run_check!(report, "set", check_set(cache, &run_id));
    run_check!(report, "sorted_set", check_sorted_set(cache, &run_id));
    run_check!(report, "pubsub", check_pubsub(cache, &run_id));
    run_check!(report, "lock", check_lock(cache, &run_id));

    cleanup(cache, &run_id).await;
    report
}

async fn check_string(cache: &RedisCache, run_id: &str) -> Result<String, CacheError> {
    let key = cache.key(&smoke::scratch(run_id, "string"));
    let value = serde_json::json!({"menu": ["DASHBOARD", "STUDENTS"], "version": 1});

    cache.set_json(&key, &value, Some(Duration::from_secs(30))).await?;
    let back: Option<serde_json::Value> = cache.get_json(&key).await?;
    if back.as_ref() != Some(&value) {
        return Err(mismatch("GET after SET", &value, back));
    }
    let ttl = cache.ttl(&key).await?;
    match ttl {
        Some(secs) if secs <= 30 => Ok(format!("round-trip ok, ttl {}s", secs)),
        other => Err(mismatch("TTL", "1..=30", other)),
    }
}

async fn check_hash(cache: &RedisCache, run_id: &str) -> Result<String, CacheError> {
    let key = cache.key(&smoke::scratch(run_id, "hash"));
    let mut conn = cache.connection();

    let _: () = conn
        .hset_multiple(&key, &[("name", "Sunflower Class"), ("capacity", "25")])
        .await?;
    let capacity: i64 = conn.hincr(&key, "capacity", 5).await?;
    let all: HashMap<String, String> = conn.hgetall(&key).await?;

    if capacity != 30 || all.get("name").map(String::as_str) != Some("Sunflower Class") {
        return Err(mismatch("HGETALL", "name + capacity 30", all));
    }
    Ok(format!("{} fields", all.len()))
}

async fn check_set(cache: &RedisCache, run_id: &str) -> Result<String, CacheError> {
    let key = cache.key(&smoke::scratch(run_id, "set"));
    let mut conn = cache.connection();

    let _: i64 = conn.sadd(&key, &["admin", "principal", "teacher", "teacher"]).await?;
    let size: i64 = conn.scard(&key).await?;
    let member: bool = conn.sismember(&key, "teacher").await?;

    if size != 3 || !member {
        return Err(mismatch("SCARD/SISMEMBER", (3, true), (size, member)));
    }
    Ok("3 distinct members".to_string())
}

async fn check_sorted_set(cache: &RedisCache, run_id: &str) -> Result<String, CacheError> {
    let key = cache.key(&smoke::scratch(run_id, "zset"));
    let mut conn = cache.connection();

    let _: i64 = conn
        .zadd_multiple(&key, &[(120, "student:1"), (95, "student:2"), (150, "student:3")])
        .await?;
    let _: f64 = conn.zincr(&key, "student:2", 100).await?;
    let top: Vec<(String, f64)> = conn.zrevrange_withscores(&key, 0, 0).await?;

    match top.first() {
        Some((member, score)) if member == "student:2" && (*score - 195.0).abs() < f64::EPSILON => {
            Ok("leaderboard order ok".to_string())
        }
        _ => Err(mismatch("ZREVRANGE top", ("student:2", 195.0), top)),
    }
}

async fn check_pubsub(cache: &RedisCache, run_id: &str) -> Result<String, CacheError> {
    let channel = cache.key(&smoke::scratch(run_id, "channel"));
    let payload = format!("hello-{}", run_id);

    let mut pubsub = cache.client().get_async_pubsub().await?;
    pubsub.subscribe(&channel).await?;

    let mut conn = cache.connection();
    let receivers: i64 = conn.publish(&channel, &payload).await?;

    let message = {
        let mut stream = pubsub.on_message();
        tokio::time::timeout(PUBSUB_TIMEOUT, stream.next())
            .await
            .map_err(|_| CacheError::Timeout("pub/sub message"))?
    };

    let received: Option<String> = match message {
        Some(msg) => Some(msg.get_payload()?),
        None => None,
    };
    if received.as_deref() != Some(payload.as_str()) {
        return Err(mismatch("message payload", payload, received));
    }
    Ok(format!("delivered to {} subscriber(s)", receivers))
}

async fn check_lock(cache: &RedisCache, run_id: &str) -> Result<String, CacheError> {
    let name = format!("smoke-{}", run_id);
    let ttl = Duration::from_secs(10);

    let guard = DistributedLock::acquire(cache, &name, ttl)
        .await?
        .ok_or_else(|| mismatch("first acquire", "lock", "held elsewhere"))?;

    let contender = DistributedLock::acquire(cache, &name, ttl).await?;
    if let Some(other) = contender {
        other.release().await?;
        guard.release().await?;
        return Err(mismatch("second acquire", "refused", "granted"));
    }

    if !guard.release().await? {
        return Err(mismatch("release", true, false));
    }
    Ok("exclusive, released".to_string())
}

async fn cleanup(cache: &RedisCache, run_id: &str) {
    match cache
        .delete_matching(&cache.key(&smoke::run_pattern(run_id)))
        .await
    {
        Ok(deleted) => info!(deleted, "Smoke keys removed"),
        Err(e) => warn!(error = %e, "Failed to remove smoke keys"),
    }
}

/// Walks one session through the application's lifecycle.
pub async fn run_session_checks(cache: &RedisCache) -> SmokeReport {
    let session_id = Uuid::new_v4().to_string();
    let session_key = cache.key(&sessions::session(&session_id));
    let user_key = cache.key(&sessions::user_sessions(SMOKE_USER_ID));
    let mut report = SmokeReport::default();

    run_check!(report, "create", create_session(cache, &session_key, &user_key, &session_id));
    run_check!(report, "read", read_session(cache, &session_key));
    run_check!(report, "touch", touch_session(cache, &session_key));
    run_check!(report, "list", list_sessions(cache, &user_key, &session_id));
    run_check!(report, "destroy", destroy_session(cache, &session_key, &user_key, &session_id));

    // Leftovers when a step failed midway.
    let mut conn = cache.connection();
    let cleanup: Result<(), redis::RedisError> = async {
        let _: () = conn.del(&session_key).await?;
        let _: () = conn.srem(&user_key, &session_id).await?;
        Ok(())
    }
    .await;
    if let Err(e) = cleanup {
        warn!(error = %e, "Failed to remove smoke session");
    }

    report
}

const SESSION_TTL_SECS: i64 = 60;
const TOUCHED_TTL_SECS: i64 = 600;

async fn create_session(
    cache: &RedisCache,
    session_key: &str,
    user_key: &str,
    session_id: &str,
) -> Result<String, CacheError> {
    let mut conn = cache.connection();
    let now = chrono::Utc::now().to_rfc3339();
    let user_id = SMOKE_USER_ID.to_string();

    let _: () = conn
        .hset_multiple(
            session_key,
            &[
                ("user_id", user_id.as_str()),
                ("role", "teacher"),
                ("created_at", now.as_str()),
                ("last_active", now.as_str()),
            ],
        )
        .await?;
    let _: bool = conn.expire(session_key, SESSION_TTL_SECS).await?;
    let _: i64 = conn.sadd(user_key, session_id).await?;
    Ok(format!("session {}", session_id))
}

async fn read_session(cache: &RedisCache, session_key: &str) -> Result<String, CacheError> {
    let mut conn = cache.connection();
    let fields: HashMap<String, String> = conn.hgetall(session_key).await?;
    let expected = SMOKE_USER_ID.to_string();
    if fields.get("user_id") != Some(&expected) || !fields.contains_key("created_at") {
        return Err(mismatch("session fields", "user_id + created_at", fields));
    }
    Ok(format!("{} fields", fields.len()))
}

async fn touch_session(cache: &RedisCache, session_key: &str) -> Result<String, CacheError> {
    let mut conn = cache.connection();
    let now = chrono::Utc::now().to_rfc3339();

    let _: () = conn.hset(session_key, "last_active", now).await?;
    let _: bool = conn.expire(session_key, TOUCHED_TTL_SECS).await?;
    let ttl: i64 = conn.ttl(session_key).await?;
    if ttl <= SESSION_TTL_SECS {
        return Err(mismatch("TTL after touch", format!("> {}", SESSION_TTL_SECS), ttl));
    }
    Ok(format!("ttl extended to {}s", ttl))
}

async fn list_sessions(
    cache: &RedisCache,
    user_key: &str,
    session_id: &str,
) -> Result<String, CacheError> {
    let mut conn = cache.connection();
    let ids: Vec<String> = conn.smembers(user_key).await?;
    if !ids.iter().any(|id| id == session_id) {
        return Err(mismatch("user sessions", session_id, ids));
    }
    Ok(format!("{} active session(s)", ids.len()))
}

async fn destroy_session(
    cache: &RedisCache,
    session_key: &str,
    user_key: &str,
    session_id: &str,
) -> Result<String, CacheError> {
    let mut conn = cache.connection();
    let _: () = conn.del(session_key).await?;
    let _: () = conn.srem(user_key, session_id).await?;

    let still_there: bool = conn.exists(session_key).await?;
    let still_listed: bool = conn.sismember(user_key, session_id).await?;
    if still_there || still_listed {
        return Err(mismatch("after destroy", (false, false), (still_there, still_listed)));
    }
    Ok("removed".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &'static str, passed: bool) -> CheckResult {
        CheckResult {
            name,
            passed,
            detail: String::new(),
            elapsed_ms: 1,
        }
    }

    #[test]
    fn test_report_counts() {
        let report = SmokeReport {
            checks: vec![result("ping", true), result("hash", false), result("set", true)],
        };
        assert_eq!(report.passed(), 2);
        assert_eq!(report.failed(), 1);
        assert!(!report.is_success());
    }

    #[test]
    fn test_empty_report_is_not_success() {
        assert!(!SmokeReport::default().is_success());
    }

    #[test]
    fn test_display_lists_each_check() {
        let report = SmokeReport {
            checks: vec![result("ping", true), result("lock", false)],
        };
        let text = report.to_string();
        assert!(text.contains("✅ ping"));
        assert!(text.contains("❌ lock"));
        assert!(text.ends_with("1 passed, 1 failed"));
    }

    #[test]
    fn test_mismatch_message_names_the_step() {
        let err = mismatch("SCARD", 3, 2);
        assert!(err.to_string().contains("SCARD: expected 3, got 2"));
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_cache_checks_pass_and_clean_up() {
        let cache = RedisCache::connect("redis://localhost:6379", Duration::from_secs(60), "kinder-test")
            .await
            .unwrap();

        let report = run_cache_checks(&cache).await;
        assert!(report.is_success(), "{}", report);

        let leftovers = cache
            .delete_matching(&cache.key("smoke:*"))
            .await
            .unwrap();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_session_checks_pass() {
        let cache = RedisCache::connect("redis://localhost:6379", Duration::from_secs(60), "kinder-test")
            .await
            .unwrap();

        let report = run_session_checks(&cache).await;
        assert!(report.is_success(), "{}", report);
    }
}
