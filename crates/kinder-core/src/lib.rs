//! # Kinder Core
//!
//! Core types shared by every kinder-ops crate:
//!
//! - [`errors`]: the operational error taxonomy
//! - [`file_storage`]: the `uploads/` tree that generated media is written to
//! - [`roles`]: role codes used by the permission tables
//!
//! # Example
//!
//! ```ignore
//! use kinder_core::{OpsError, LocalFileStorage, RoleCode};
//!
//! let storage = LocalFileStorage::new("./uploads".into(), "/uploads".to_string());
//! if !storage.exists("assessment-images/q-12.png").await {
//!     // generate it
//! }
//!
//! let role: RoleCode = "principal".parse()?;
//! ```

pub mod errors;
pub mod file_storage;
pub mod roles;

// Re-export commonly used types at crate root
pub use errors::OpsError;
pub use file_storage::{FileStorage, LocalFileStorage, StorageError};
pub use roles::RoleCode;
