//! Kinder Observability
//!
//! Logging setup shared by every kinder-ops binary. Console output is
//! compact and colored by default; `LOG_FORMAT=json` switches to one JSON
//! object per line for log shippers.
//!
//! # Examples
//!
//! ```no_run
//! use kinder_observability::{LoggingConfig, init_logging};
//!
//! init_logging(&LoggingConfig::from_env());
//! tracing::info!("ready");
//! ```

pub mod logging;

pub use logging::{LogFormat, LoggingConfig, init_logging};
