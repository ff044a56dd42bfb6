//! The populate-and-publish routine.
//!
//! One idempotent unit of work shared by queue workers and the synchronous
//! write path: fetch content from the collaborator, publish the blob under
//! its content-hash key, then flip the pointer record. The blob is keyed on
//! the content hash and the pointer is written last, so re-running after a
//! partial failure can only converge, never corrupt.

use crate::error::{DeliveryError, DeliveryResult};
use crate::fetch::{ContentFetcher, Credentials, FetchSpec};
use bytes::Bytes;
use glossa_blob::BlobStore;
use glossa_core::config::DeliveryConfig;
use glossa_core::{ContentHash, KeyParts, PointerRecord, blob_key_for};
use glossa_registry::RegistryStore;
use std::sync::Arc;

pub(crate) fn now_epoch() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

pub(crate) struct Populator {
    registry: Arc<dyn RegistryStore>,
    blob: Arc<dyn BlobStore>,
    fetcher: Arc<dyn ContentFetcher>,
    config: DeliveryConfig,
}

impl Populator {
    pub(crate) fn new(
        registry: Arc<dyn RegistryStore>,
        blob: Arc<dyn BlobStore>,
        fetcher: Arc<dyn ContentFetcher>,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            registry,
            blob,
            fetcher,
            config,
        }
    }

    /// Run one population. Returns the pointer record that was written:
    /// a success record, or an error record for a cached upstream client
    /// failure. Transient failures return `Err` and write nothing, leaving
    /// the retry decision to the caller.
    pub(crate) async fn run(
        &self,
        key: &KeyParts,
        spec: &FetchSpec,
        credentials: &Credentials,
    ) -> DeliveryResult<PointerRecord> {
        let record_key = key.record_key();

        match self
            .fetcher
            .fetch(&spec.function, credentials, &spec.args)
            .await
        {
            Ok(content) => {
                let payload = serde_json::to_vec(&content)?;
                let hash = ContentHash::compute(&payload);
                let cache_key = blob_key_for(&record_key, &hash);

                // Index entry first, blob second, pointer last: a reader
                // can only observe the pointer once everything it points
                // at exists.
                self.registry
                    .add_to_set(&key.index_key(), &record_key, None)
                    .await?;
                let location = self.blob.put(&cache_key, Bytes::from(payload)).await?;
                let record = PointerRecord::success(
                    now_epoch(),
                    hash.to_hex(),
                    location.as_str().to_string(),
                    cache_key,
                );
                self.registry
                    .set(
                        &record_key,
                        serde_json::to_value(&record)?,
                        Some(self.config.pointer_ttl()),
                    )
                    .await?;

                tracing::debug!(key = %record_key, etag = %hash, "published fresh content");
                Ok(record)
            }
            Err(err) if err.is_client_error() => {
                // Cache the upstream verdict so repeated requests
                // short-circuit without re-fetching until expiry.
                let record = PointerRecord::error(
                    now_epoch(),
                    err.status_code.unwrap_or(400),
                    err.message.clone(),
                );
                self.registry
                    .add_to_set(&key.index_key(), &record_key, None)
                    .await?;
                self.registry
                    .set(
                        &record_key,
                        serde_json::to_value(&record)?,
                        Some(self.config.pointer_ttl()),
                    )
                    .await?;

                tracing::debug!(
                    key = %record_key,
                    status_code = err.status_code,
                    "cached upstream client error"
                );
                Ok(record)
            }
            Err(err) => Err(DeliveryError::Fetch(err)),
        }
    }
}
