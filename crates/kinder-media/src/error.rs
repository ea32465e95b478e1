use kinder_core::StorageError;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The provider answered 2xx but without usable content.
    #[error("Provider response unusable: {0}")]
    Provider(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid base64 payload: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("ffmpeg exited with {code:?}: {stderr}")]
    Ffmpeg { code: Option<i32>, stderr: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No {0} model configured")]
    MissingModel(&'static str),
}

impl MediaError {
    /// Errors worth another attempt against the same provider.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Status { status: 503, .. })
    }
}
