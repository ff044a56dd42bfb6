//! Blob store error types.

use thiserror::Error;

/// Blob store operation errors.
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid location: {0}")]
    InvalidLocation(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for blob store operations.
pub type BlobResult<T> = std::result::Result<T, BlobError>;
