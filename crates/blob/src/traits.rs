//! Blob store trait definition.

use crate::error::BlobResult;
use crate::location::Location;
use async_trait::async_trait;
use bytes::Bytes;

/// Opaque payload storage keyed by content-addressed cache keys.
///
/// All backends tolerate get-of-absent and delete-of-absent as normal
/// outcomes, not errors; the coherence and purge protocols lean on that.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Fetch a blob. Absent keys are `None`.
    async fn get(&self, key: &str) -> BlobResult<Option<Bytes>>;

    /// Store a blob and return where it can be fetched from.
    async fn put(&self, key: &str, data: Bytes) -> BlobResult<Location>;

    /// Delete a blob. Deleting an absent key is a no-op.
    async fn delete(&self, key: &str) -> BlobResult<()>;

    /// Check whether a blob exists.
    async fn exists(&self, key: &str) -> BlobResult<bool>;

    /// Static identifier for logs.
    fn backend_name(&self) -> &'static str;

    /// Verify backend connectivity.
    async fn health_check(&self) -> BlobResult<()> {
        Ok(())
    }
}
