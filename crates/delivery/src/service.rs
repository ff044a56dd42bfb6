//! Cache service construction and the synchronous write path.

use crate::error::{DeliveryError, DeliveryResult};
use crate::fetch::{ContentFetcher, Credentials, FetchSpec};
use crate::populate::Populator;
use crate::queue::{PopulationJob, PopulationQueue};
use glossa_blob::BlobStore;
use glossa_core::config::DeliveryConfig;
use glossa_core::{KeyParts, PointerRecord, PointerStatus};
use glossa_registry::RegistryStore;
use std::sync::Arc;

/// The cache core: registry, blob store, and population queue behind the
/// coherence and invalidation protocols. Store handles are injected once
/// at construction; there is no ambient global state.
pub struct CacheService {
    pub(crate) registry: Arc<dyn RegistryStore>,
    pub(crate) blob: Arc<dyn BlobStore>,
    pub(crate) queue: Arc<PopulationQueue>,
    pub(crate) populator: Arc<Populator>,
    pub(crate) config: DeliveryConfig,
}

impl CacheService {
    /// Build the service and start its population workers.
    pub fn new(
        registry: Arc<dyn RegistryStore>,
        blob: Arc<dyn BlobStore>,
        fetcher: Arc<dyn ContentFetcher>,
        config: DeliveryConfig,
    ) -> DeliveryResult<Self> {
        for warning in config.validate()? {
            tracing::warn!("configuration warning: {warning}");
        }

        let populator = Arc::new(Populator::new(
            registry.clone(),
            blob.clone(),
            fetcher,
            config.clone(),
        ));
        let queue = PopulationQueue::new(registry.clone(), populator.clone(), &config);

        Ok(Self {
            registry,
            blob,
            queue,
            populator,
            config,
        })
    }

    /// The population queue, for `has`/`counts` observability.
    pub fn queue(&self) -> &PopulationQueue {
        &self.queue
    }

    /// Stop the population workers.
    pub async fn shutdown(&self) {
        self.queue.shutdown().await;
    }

    /// Populate a key synchronously, bypassing the queue. Used by the
    /// push-style write path to seed pointer record and blob right after a
    /// successful upstream write. An upstream client error is still cached
    /// as an error pointer record, then reported to the caller.
    pub async fn populate(
        &self,
        raw_key: &str,
        spec: FetchSpec,
        credentials: &Credentials,
    ) -> DeliveryResult<PointerRecord> {
        let parts = KeyParts::split(raw_key)?;
        let record = self.populator.run(&parts, &spec, credentials).await?;
        match record.status {
            PointerStatus::Success => Ok(record),
            PointerStatus::Error => Err(DeliveryError::Upstream {
                status_code: record.status_code.unwrap_or(400),
                message: record.status_message.unwrap_or_default(),
            }),
        }
    }

    /// Fire-and-forget population trigger used by the read path and the
    /// invalidation walk. Never blocks the caller on the fetch; enqueue
    /// failures are logged and swallowed (the next read re-triggers).
    pub(crate) async fn trigger_population(&self, parts: &KeyParts, credentials: &Credentials) {
        let job = PopulationJob::for_key(parts, credentials);
        if let Err(err) = self.queue.enqueue(job).await {
            tracing::warn!(
                key = %parts.record_key(),
                error = %err,
                "failed to enqueue population job"
            );
        }
    }
}
