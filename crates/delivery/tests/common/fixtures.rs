//! Test harness around a fully wired cache service.

use super::mocks::MockFetcher;
use glossa_blob::BlobStore;
use glossa_blob::backends::memory::MemoryBackend as MemoryBlob;
use glossa_core::PointerRecord;
use glossa_core::config::DeliveryConfig;
use glossa_delivery::CacheService;
use glossa_registry::MemoryBackend as MemoryRegistry;
use glossa_registry::RegistryStore;
use std::sync::Arc;
use std::time::Duration;

const WAIT_TIMEOUT: Duration = Duration::from_secs(2);
const POLL: Duration = Duration::from_millis(10);

/// A cache service over in-memory stores and a scripted collaborator.
pub struct TestCache {
    pub registry: Arc<dyn RegistryStore>,
    pub blob: Arc<dyn BlobStore>,
    pub fetcher: Arc<MockFetcher>,
    pub service: Arc<CacheService>,
}

/// Delivery config tuned for fast tests: quick retries, small queue.
#[allow(dead_code)]
pub fn test_config() -> DeliveryConfig {
    DeliveryConfig {
        pointer_ttl_secs: 86400,
        auto_refresh_secs: 3600,
        job_retry_delay_ms: 10,
        ..DeliveryConfig::default()
    }
}

#[allow(dead_code)]
pub fn cache() -> TestCache {
    cache_with_config(test_config())
}

pub fn cache_with_config(config: DeliveryConfig) -> TestCache {
    let registry: Arc<dyn RegistryStore> = Arc::new(MemoryRegistry::new());
    let blob: Arc<dyn BlobStore> = Arc::new(MemoryBlob::new());
    let fetcher = MockFetcher::new();
    let service = CacheService::new(
        registry.clone(),
        blob.clone(),
        fetcher.clone(),
        config,
    )
    .expect("service construction");

    TestCache {
        registry,
        blob,
        fetcher,
        service: Arc::new(service),
    }
}

/// Poll until the pointer record for `key` exists; panics on timeout.
#[allow(dead_code)]
pub async fn wait_for_record(cache: &TestCache, key: &str) -> PointerRecord {
    let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
    loop {
        if let Ok(Some(value)) = cache.registry.get(key).await {
            if let Ok(record) = serde_json::from_value::<PointerRecord>(value) {
                return record;
            }
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for pointer record {key}");
        }
        tokio::time::sleep(POLL).await;
    }
}

/// Poll until the pointer record's ETag differs from `old`; panics on
/// timeout.
#[allow(dead_code)]
pub async fn wait_for_etag_change(cache: &TestCache, key: &str, old: &str) -> PointerRecord {
    let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
    loop {
        if let Ok(Some(value)) = cache.registry.get(key).await {
            if let Ok(record) = serde_json::from_value::<PointerRecord>(value) {
                if record.etag.as_deref() != Some(old) {
                    return record;
                }
            }
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for etag change on {key}");
        }
        tokio::time::sleep(POLL).await;
    }
}

/// Poll until no job with this id is queued or running; panics on timeout.
#[allow(dead_code)]
pub async fn wait_for_queue_idle(cache: &TestCache, key: &str) {
    let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
    loop {
        if !cache.service.queue().has(key).await.expect("has") {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for queue to go idle on {key}");
        }
        tokio::time::sleep(POLL).await;
    }
}

/// Poll until a blob exists at `cache_key`; panics on timeout.
#[allow(dead_code)]
pub async fn wait_for_blob(cache: &TestCache, cache_key: &str) {
    let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
    loop {
        if cache.blob.exists(cache_key).await.expect("exists") {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for blob {cache_key}");
        }
        tokio::time::sleep(POLL).await;
    }
}
