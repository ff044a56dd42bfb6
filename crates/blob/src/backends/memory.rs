//! In-process blob store backend.

use crate::error::BlobResult;
use crate::location::Location;
use crate::traits::BlobStore;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::instrument;

/// In-memory blob store.
pub struct MemoryBackend {
    blobs: RwLock<HashMap<String, Bytes>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for MemoryBackend {
    #[instrument(skip(self), fields(backend = "memory"))]
    async fn get(&self, key: &str) -> BlobResult<Option<Bytes>> {
        Ok(self.blobs.read().await.get(key).cloned())
    }

    #[instrument(skip(self, data), fields(backend = "memory", size = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> BlobResult<Location> {
        self.blobs.write().await.insert(key.to_string(), data);
        Ok(Location::for_blob(key))
    }

    #[instrument(skip(self), fields(backend = "memory"))]
    async fn delete(&self, key: &str) -> BlobResult<()> {
        self.blobs.write().await.remove(key);
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "memory"))]
    async fn exists(&self, key: &str) -> BlobResult<bool> {
        Ok(self.blobs.read().await.contains_key(key))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
