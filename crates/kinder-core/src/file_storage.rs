//! Storage for generated media under the application's `uploads/` tree.
//!
//! Generators write images and audio through [`FileStorage`] and store the
//! relative URL returned by [`FileStorage::get_url`] back onto a database
//! row. The main application serves the same tree at `/uploads`.
//!
//! # Example
//!
//! ```ignore
//! use kinder_core::file_storage::{FileStorage, LocalFileStorage};
//! use std::path::PathBuf;
//!
//! let storage = LocalFileStorage::new(PathBuf::from("./uploads"), "/uploads".to_string());
//!
//! let key = "assessment-audio/question-42.mp3";
//! if !storage.exists(key).await {
//!     storage.save(key, &bytes).await?;
//! }
//! let url = storage.get_url(key)?; // "/uploads/assessment-audio/question-42.mp3"
//! ```

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::fs;

type StorageFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StorageError>> + Send + 'a>>;

/// Abstract trait for media storage backends.
pub trait FileStorage: Send + Sync {
    /// Save file content and return the storage key.
    ///
    /// # Arguments
    /// * `key` - Relative path inside the storage root (e.g., "games/images/cat.png")
    /// * `content` - File bytes to store
    fn save<'a>(&'a self, key: &'a str, content: &'a [u8]) -> StorageFuture<'a, String>;

    /// Whether an artifact is already stored under `key`.
    ///
    /// Invalid keys report `false`.
    fn exists<'a>(&'a self, key: &'a str) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>>;

    /// Delete a file by key. Missing files are not an error.
    fn delete<'a>(&'a self, key: &'a str) -> StorageFuture<'a, ()>;

    /// Relative URL stored on database rows.
    fn get_url(&self, key: &str) -> Result<String, StorageError>;
}

/// Error type for file storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// File exceeds maximum allowed size.
    InvalidFileSize { max_bytes: usize },

    /// Empty payload; providers occasionally answer 200 with no body.
    EmptyContent,

    /// I/O error (file system or similar).
    IoError(std::io::Error),

    /// File not found.
    NotFound,

    /// Invalid storage key format.
    InvalidKey(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFileSize { max_bytes } => {
                write!(f, "File exceeds maximum size of {} bytes", max_bytes)
            }
            Self::EmptyContent => write!(f, "Refusing to store an empty file"),
            Self::IoError(e) => write!(f, "I/O error: {}", e),
            Self::NotFound => write!(f, "File not found"),
            Self::InvalidKey(msg) => write!(f, "Invalid storage key: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::IoError(e)
    }
}

/// Local filesystem-backed storage rooted at the uploads directory.
#[derive(Clone, Debug)]
pub struct LocalFileStorage {
    /// Root of the uploads tree (e.g. "./uploads")
    base_dir: PathBuf,

    /// URL prefix the application serves the tree under (e.g. "/uploads")
    base_url: String,

    /// Maximum file size in bytes
    max_file_size: usize,
}

impl LocalFileStorage {
    /// Default size ceiling, large enough for 1024x1024 PNGs and short clips.
    pub const DEFAULT_MAX_FILE_SIZE: usize = 20 * 1024 * 1024;

    pub fn new(base_dir: PathBuf, base_url: String) -> Self {
        Self::with_max_size(base_dir, base_url, Self::DEFAULT_MAX_FILE_SIZE)
    }

    pub fn with_max_size(base_dir: PathBuf, base_url: String, max_file_size: usize) -> Self {
        Self {
            base_dir,
            base_url,
            max_file_size,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Absolute (or root-relative) filesystem path for a key.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        Self::validate_key(key)?;
        Ok(self.base_dir.join(key))
    }

    /// Counts regular files directly under `dir_key` whose extension is in
    /// `extensions` (case-insensitive). A missing directory counts as zero.
    pub async fn count_files(&self, dir_key: &str, extensions: &[&str]) -> Result<usize, StorageError> {
        let dir = self.path_for(dir_key)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut count = 0;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let matches = entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
                .unwrap_or(false);
            if matches {
                count += 1;
            }
        }

        Ok(count)
    }

    /// Validate storage key format to prevent path traversal.
    fn validate_key(key: &str) -> Result<(), StorageError> {
        if key.is_empty() || key.contains("..") || key.starts_with('/') || key.starts_with('\\') {
            return Err(StorageError::InvalidKey(
                "Key must not be empty, contain '..', or start with a separator".to_string(),
            ));
        }

        if !key
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '/' || c == '.')
        {
            return Err(StorageError::InvalidKey(
                "Key contains invalid characters".to_string(),
            ));
        }

        Ok(())
    }
}

impl FileStorage for LocalFileStorage {
    fn save<'a>(&'a self, key: &'a str, content: &'a [u8]) -> StorageFuture<'a, String> {
        Box::pin(async move {
            let file_path = self.path_for(key)?;

            if content.is_empty() {
                return Err(StorageError::EmptyContent);
            }
            if content.len() > self.max_file_size {
                return Err(StorageError::InvalidFileSize {
                    max_bytes: self.max_file_size,
                });
            }

            if let Some(parent) = file_path.parent() {
                fs::create_dir_all(parent).await?;
            }

            // Write to a sibling temp file first so an interrupted run never
            // leaves a truncated file that the skip check would accept.
            let tmp_path = file_path.with_extension("part");
            fs::write(&tmp_path, content).await?;
            fs::rename(&tmp_path, &file_path).await?;

            tracing::debug!(storage.key = %key, bytes = content.len(), "Stored file");

            Ok(key.to_string())
        })
    }

    fn exists<'a>(&'a self, key: &'a str) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async move {
            match self.path_for(key) {
                Ok(path) => fs::metadata(&path)
                    .await
                    .map(|meta| meta.is_file() && meta.len() > 0)
                    .unwrap_or(false),
                Err(_) => false,
            }
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> StorageFuture<'a, ()> {
        Box::pin(async move {
            let file_path = self.path_for(key)?;

            match fs::remove_file(&file_path).await {
                Ok(_) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn get_url(&self, key: &str) -> Result<String, StorageError> {
        Self::validate_key(key)?;
        Ok(format!("{}/{}", self.base_url.trim_end_matches('/'), key))
    }
}
