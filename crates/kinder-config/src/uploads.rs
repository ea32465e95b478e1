//! Location of the generated media tree.
//!
//! - `UPLOADS_DIR`: filesystem root (default: `./uploads`)
//! - `UPLOADS_URL_PREFIX`: URL prefix stored on rows (default: `/uploads`)
//! - `DOWNLOAD_TIMEOUT_SECS`: socket timeout for fetching generated files (default: 60)

use std::path::PathBuf;
use std::time::Duration;

use crate::{env_lookup, parse_or};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadsConfig {
    pub dir: PathBuf,
    pub url_prefix: String,
    pub download_timeout_secs: u64,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./uploads"),
            url_prefix: "/uploads".to_string(),
            download_timeout_secs: 60,
        }
    }
}

impl UploadsConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            dir: lookup("UPLOADS_DIR").map(PathBuf::from).unwrap_or(defaults.dir),
            url_prefix: lookup("UPLOADS_URL_PREFIX").unwrap_or(defaults.url_prefix),
            download_timeout_secs: parse_or(
                &lookup,
                "DOWNLOAD_TIMEOUT_SECS",
                defaults.download_timeout_secs,
            ),
        }
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = UploadsConfig::from_lookup(|_| None);
        assert_eq!(config, UploadsConfig::default());
        assert_eq!(config.download_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_overrides() {
        let config = UploadsConfig::from_lookup(|key| match key {
            "UPLOADS_DIR" => Some("/srv/kg/uploads".into()),
            "DOWNLOAD_TIMEOUT_SECS" => Some("15".into()),
            _ => None,
        });
        assert_eq!(config.dir, PathBuf::from("/srv/kg/uploads"));
        assert_eq!(config.url_prefix, "/uploads");
        assert_eq!(config.download_timeout_secs, 15);
    }
}
