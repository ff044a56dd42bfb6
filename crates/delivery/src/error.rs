//! Delivery-layer error types.

use crate::fetch::FetchError;
use thiserror::Error;

/// Errors surfaced by the coherence, population, and walk protocols.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("registry error: {0}")]
    Registry(#[from] glossa_registry::RegistryError),

    #[error("blob store error: {0}")]
    Blob(#[from] glossa_blob::BlobError),

    #[error("core error: {0}")]
    Core(#[from] glossa_core::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Retryable collaborator failure (transport errors, 5xx-class).
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Upstream client error, already cached as an error pointer record.
    #[error("upstream returned {status_code}: {message}")]
    Upstream { status_code: u16, message: String },

    #[error("invalid scope: {0}")]
    InvalidScope(String),

    #[error("population queue closed")]
    QueueClosed,
}

/// Result type for delivery operations.
pub type DeliveryResult<T> = std::result::Result<T, DeliveryError>;
