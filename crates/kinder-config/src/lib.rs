//! # Kinder Config
//!
//! Configuration structures loaded from environment variables (after
//! `dotenvy` has read `.env`):
//!
//! - [`database`]: MySQL connection settings
//! - [`throttle`]: batch size, inter-batch delay and token-bucket pacing
//! - [`uploads`]: location of the media tree and download timeout
//! - [`ai`]: fallback AI provider settings
//! - [`media`]: ffmpeg post-processing parameters
//!
//! Every struct offers `from_env()` and a `Default` matching the documented
//! defaults; `from_lookup` takes any key lookup so tests never touch the
//! process environment.
//!
//! # Example
//!
//! ```ignore
//! use kinder_config::{DatabaseConfig, ThrottleConfig};
//!
//! let db = DatabaseConfig::from_env()?;
//! let throttle = ThrottleConfig::from_env();
//! ```

pub mod ai;
pub mod database;
pub mod media;
pub mod throttle;
pub mod uploads;

pub use ai::AiProviderConfig;
pub use database::{DatabaseConfig, MissingVar};
pub use media::MediaConfig;
pub use throttle::ThrottleConfig;
pub use uploads::UploadsConfig;

use std::str::FromStr;

/// Reads `key` through `lookup` and parses it, falling back to `default`
/// when unset or unparsable.
pub(crate) fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

pub(crate) fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}
