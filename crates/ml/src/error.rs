//! Error types for training and search.

use thiserror::Error;

/// Training platform and search errors.
#[derive(Debug, Error)]
pub enum MlError {
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("training platform error: {0}")]
    Platform(String),

    #[error("training platform not configured")]
    PlatformUnavailable,

    #[error("search request timed out")]
    SearchTimeout,

    #[error("search service error: {0}")]
    SearchService(String),

    #[error(transparent)]
    Metadata(#[from] shutter_metadata::MetadataError),

    #[error(transparent)]
    Storage(#[from] shutter_storage::StorageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for MlError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            MlError::SearchTimeout
        } else {
            MlError::SearchService(e.to_string())
        }
    }
}

/// Result type for ml operations.
pub type MlResult<T> = std::result::Result<T, MlError>;
