//! Error taxonomy for operational tasks.
//!
//! Every task distinguishes three kinds of failure:
//!
//! - already-exists conditions, which callers treat as no-ops (see
//!   `kinder_db::is_duplicate_error`)
//! - [`OpsError::MissingPrerequisite`] and [`OpsError::AlreadyExists`],
//!   raised before any write so the database is left untouched
//! - everything else, which ends the run with a non-zero exit code

use crate::file_storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum OpsError {
    /// A row or resource the task depends on does not exist.
    #[error("Missing prerequisite: {0}")]
    MissingPrerequisite(String),

    /// The task would create something that is already there and cannot
    /// be treated as a no-op.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Seed content failed validation.
    #[error("Invalid seed data: {0}")]
    InvalidSeed(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OpsError {
    pub fn missing<S: Into<String>>(what: S) -> Self {
        Self::MissingPrerequisite(what.into())
    }

    pub fn already_exists<S: Into<String>>(what: S) -> Self {
        Self::AlreadyExists(what.into())
    }

    pub fn invalid_seed<S: Into<String>>(reason: S) -> Self {
        Self::InvalidSeed(reason.into())
    }

    /// True for failures that happen before any side effect.
    pub fn is_prerequisite(&self) -> bool {
        matches!(
            self,
            Self::MissingPrerequisite(_) | Self::AlreadyExists(_) | Self::InvalidSeed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_prerequisite_message() {
        let err = OpsError::missing("role 'admin' not found");
        assert_eq!(err.to_string(), "Missing prerequisite: role 'admin' not found");
        assert!(err.is_prerequisite());
    }

    #[test]
    fn test_already_exists_is_distinct_from_missing() {
        let err = OpsError::already_exists("a demo roster already exists");
        assert_eq!(err.to_string(), "Already exists: a demo roster already exists");
        assert!(err.is_prerequisite());
        assert!(!matches!(err, OpsError::MissingPrerequisite(_)));
    }

    #[test]
    fn test_other_errors_are_not_prerequisites() {
        let err = OpsError::from(anyhow::anyhow!("boom"));
        assert!(!err.is_prerequisite());
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_storage_error_converts() {
        let err: OpsError = StorageError::NotFound.into();
        assert!(matches!(err, OpsError::Storage(StorageError::NotFound)));
    }
}
