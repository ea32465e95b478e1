//! Cache key builders and invalidation helpers.
//!
//! Builders return keys without the deployment prefix; apply it with
//! [`RedisCache::key`]. The layouts mirror what the application writes, so
//! tooling can drop exactly the entries its changes make stale.

use crate::RedisCache;
use tracing::{info, warn};

fn build_key(parts: &[&str]) -> String {
    parts.join(":")
}

/// Keys the application caches permission lookups under.
pub mod permissions {
    use super::*;

    pub fn user_permissions(user_id: i64) -> String {
        build_key(&["user_permissions", &user_id.to_string()])
    }

    pub fn role_permissions(role_code: &str) -> String {
        build_key(&["role_permissions", role_code])
    }

    pub fn dynamic_routes(user_id: i64) -> String {
        build_key(&["dynamic_routes", &user_id.to_string()])
    }

    pub fn user_permission_info(user_id: i64) -> String {
        build_key(&["user_permission_info", &user_id.to_string()])
    }

    pub fn permission_check(user_id: i64, code: &str) -> String {
        build_key(&["permission_check", &user_id.to_string(), code])
    }

    pub fn path_permission(user_id: i64, path: &str) -> String {
        build_key(&["path_permission", &user_id.to_string(), path])
    }

    /// One pattern per key family, covering every user and role.
    pub fn invalidation_patterns() -> [String; 6] {
        [
            "user_permissions:*".to_string(),
            "role_permissions:*".to_string(),
            "dynamic_routes:*".to_string(),
            "user_permission_info:*".to_string(),
            "permission_check:*".to_string(),
            "path_permission:*".to_string(),
        ]
    }
}

/// Session layout: a hash per session plus a set of session ids per user.
pub mod sessions {
    use super::*;

    pub fn session(session_id: &str) -> String {
        build_key(&["session", session_id])
    }

    pub fn user_sessions(user_id: i64) -> String {
        build_key(&["user_sessions", &user_id.to_string()])
    }
}

pub mod locks {
    use super::*;

    pub fn lock(name: &str) -> String {
        build_key(&["lock", name])
    }

    pub const SEED_PERMISSIONS: &str = "seed-permissions";
}

/// Scratch keys written by smoke checks.
pub mod smoke {
    use super::*;

    pub fn scratch(run_id: &str, name: &str) -> String {
        build_key(&["smoke", run_id, name])
    }

    pub fn run_pattern(run_id: &str) -> String {
        format!("smoke:{}:*", run_id)
    }
}

pub mod invalidate {
    use super::*;

    /// Drops every cached permission, role menu and route table.
    ///
    /// Call this after any change to `permissions` or `role_permissions`.
    /// Failures are logged; the database change has already happened.
    pub async fn all_permissions(cache: Option<&RedisCache>) -> u64 {
        let Some(cache) = cache else {
            warn!("Redis unavailable; cached permissions expire on their own TTL");
            return 0;
        };

        let mut total = 0;
        for pattern in permissions::invalidation_patterns() {
            match cache.delete_matching(&cache.key(&pattern)).await {
                Ok(deleted) => total += deleted,
                Err(e) => warn!(error = %e, pattern = %pattern, "Failed to invalidate permission caches"),
            }
        }

        info!(deleted = total, "Permission caches invalidated");
        total
    }

    /// Drops one role's cached permission list.
    pub async fn role(cache: Option<&RedisCache>, role_code: &str) {
        let Some(cache) = cache else { return };

        if let Err(e) = cache
            .delete(&cache.key(&permissions::role_permissions(role_code)))
            .await
        {
            warn!(error = %e, role = %role_code, "Failed to invalidate role permission cache");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_key_generation() {
        assert_eq!(permissions::user_permissions(12), "user_permissions:12");
        assert_eq!(permissions::role_permissions("teacher"), "role_permissions:teacher");
        assert_eq!(
            permissions::permission_check(3, "SYSTEM_USERS"),
            "permission_check:3:SYSTEM_USERS"
        );
        assert_eq!(
            permissions::path_permission(3, "/system/users"),
            "path_permission:3:/system/users"
        );
    }

    #[test]
    fn test_patterns_cover_every_key_family() {
        let keys = [
            permissions::user_permissions(1),
            permissions::role_permissions("admin"),
            permissions::dynamic_routes(1),
            permissions::user_permission_info(1),
            permissions::permission_check(1, "X"),
            permissions::path_permission(1, "/x"),
        ];
        let patterns = permissions::invalidation_patterns();
        for key in keys {
            assert!(
                patterns
                    .iter()
                    .any(|p| key.starts_with(p.trim_end_matches('*'))),
                "no pattern covers {}",
                key
            );
        }
    }

    #[test]
    fn test_session_and_lock_keys() {
        assert_eq!(sessions::session("abc"), "session:abc");
        assert_eq!(sessions::user_sessions(7), "user_sessions:7");
        assert_eq!(locks::lock(locks::SEED_PERMISSIONS), "lock:seed-permissions");
        assert_eq!(smoke::run_pattern("r1"), "smoke:r1:*");
        assert!(smoke::scratch("r1", "hash").starts_with("smoke:r1:"));
    }
}
