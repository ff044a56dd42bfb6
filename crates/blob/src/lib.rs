//! Content blob storage for the Glossa content cache.
//!
//! This crate provides:
//! - The `BlobStore` contract: opaque payloads under content-addressed keys
//! - The `Location` URI type with the reserved `blob://` scheme
//! - Backends: in-process and local filesystem (atomic writes)

pub mod backends;
pub mod error;
pub mod location;
pub mod traits;

pub use backends::{filesystem::FilesystemBackend, memory::MemoryBackend};
pub use error::{BlobError, BlobResult};
pub use location::Location;
pub use traits::BlobStore;

use glossa_core::config::BlobConfig;
use std::sync::Arc;

/// Create a blob store from configuration. Selected once at startup; call
/// sites only ever see the trait.
pub async fn from_config(config: &BlobConfig) -> BlobResult<Arc<dyn BlobStore>> {
    match config {
        BlobConfig::Memory => Ok(Arc::new(MemoryBackend::new())),
        BlobConfig::Filesystem { path } => Ok(Arc::new(FilesystemBackend::new(path).await?)),
    }
}
