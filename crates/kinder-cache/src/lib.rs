//! # Kinder Cache
//!
//! Redis utilities for operational tasks against the application's cache.
//!
//! This crate provides:
//! - Redis connection management
//! - JSON get/set with TTL, delete, delete by pattern
//! - Cache configuration from environment variables
//! - Key builders matching the application's permission, session and lock keys
//! - A distributed lock held while seeding
//! - Smoke checks for the data structures and session layout the application uses
//!
//! # Example
//!
//! ```ignore
//! use kinder_cache::{CacheConfig, RedisCache, keys};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = CacheConfig::from_env();
//!     let cache = RedisCache::from_config(&config).await.unwrap();
//!
//!     // Drop every cached permission after changing role_permissions
//!     keys::invalidate::all_permissions(Some(&cache)).await;
//! }
//! ```

pub mod config;
pub mod keys;
pub mod lock;
pub mod redis;
pub mod smoke;

pub use config::CacheConfig;
pub use lock::{DistributedLock, LockGuard};
pub use redis::{CacheError, RedisCache};
pub use smoke::{CheckResult, SmokeReport, run_cache_checks, run_session_checks};
