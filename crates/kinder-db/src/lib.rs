//! # Kinder DB
//!
//! MySQL connection pool and statement helpers.
//!
//! - [`init_db_pool`] opens the pool every task starts from
//! - [`ddl`] classifies "already exists" failures so re-running a task is a no-op
//! - [`indexes`] holds the index set the application's hot queries rely on
//!
//! # Example
//!
//! ```ignore
//! use kinder_config::DatabaseConfig;
//! use kinder_db::init_db_pool;
//!
//! let pool = init_db_pool(&DatabaseConfig::from_env()?).await?;
//! let report = kinder_db::indexes::optimize_indexes(&pool).await;
//! ```

pub mod ddl;
pub mod indexes;

pub use ddl::{DdlOutcome, execute_ignoring_duplicates, is_duplicate_error};

use kinder_config::DatabaseConfig;
use kinder_config::database::redact_url;
use sqlx::mysql::MySqlPoolOptions;

/// Initializes a MySQL connection pool.
///
/// Tasks call this once at startup and pass `&MySqlPool` down; the pool is
/// cheaply cloneable when a generator needs to move it into a producer.
///
/// # Errors
///
/// Returns the connection error when the database is unreachable or the
/// credentials are rejected.
pub async fn init_db_pool(config: &DatabaseConfig) -> Result<MySqlPool, sqlx::Error> {
    tracing::info!(database = %redact_url(&config.url), "Connecting to database");

    MySqlPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout())
        .connect(&config.url)
        .await
}

// Re-export MySqlPool for convenience
pub use sqlx::MySqlPool;
