//! End-to-end over the durable backends: the factory-built SQLite registry
//! and filesystem blob store behind the same protocols the in-memory tests
//! exercise.

mod common;

use common::fixtures::{wait_for_record, TestCache};
use common::mocks::MockFetcher;
use glossa_core::config::{BlobConfig, DeliveryConfig, RegistryConfig};
use glossa_delivery::{CacheService, Credentials, ReadOutcome, Scope};
use serde_json::json;
use std::sync::Arc;

const KEY: &str = "cache:p1:en:content";

fn creds() -> Credentials {
    Credentials(json!({"api_key": "test"}))
}

async fn durable_cache(temp: &tempfile::TempDir) -> TestCache {
    let registry = glossa_registry::from_config(&RegistryConfig::Sqlite {
        path: temp.path().join("registry.db"),
    })
    .await
    .unwrap();
    let blob = glossa_blob::from_config(&BlobConfig::Filesystem {
        path: temp.path().join("blobs"),
    })
    .await
    .unwrap();
    let fetcher = MockFetcher::new();
    let config = DeliveryConfig {
        job_retry_delay_ms: 10,
        ..DeliveryConfig::default()
    };
    let service = CacheService::new(registry.clone(), blob.clone(), fetcher.clone(), config)
        .expect("service construction");

    TestCache {
        registry,
        blob,
        fetcher,
        service: Arc::new(service),
    }
}

#[tokio::test]
async fn read_populate_conditional_cycle_on_durable_backends() {
    let temp = tempfile::tempdir().unwrap();
    let cache = durable_cache(&temp).await;

    let outcome = cache.service.read(KEY, None, &creds()).await.unwrap();
    assert_eq!(outcome, ReadOutcome::Accepted);

    wait_for_record(&cache, KEY).await;

    let outcome = cache.service.read(KEY, None, &creds()).await.unwrap();
    let etag = match outcome {
        ReadOutcome::Content { etag, body, .. } => {
            assert!(!body.is_empty());
            etag
        }
        other => panic!("expected content, got {other:?}"),
    };

    let outcome = cache
        .service
        .read(KEY, Some(etag.as_str()), &creds())
        .await
        .unwrap();
    assert!(matches!(outcome, ReadOutcome::NotModified { .. }));
    assert_eq!(cache.fetcher.calls(), 1);
}

#[tokio::test]
async fn purge_couples_pointer_and_blob_on_durable_backends() {
    let temp = tempfile::tempdir().unwrap();
    let cache = durable_cache(&temp).await;

    cache.service.read(KEY, None, &creds()).await.unwrap();
    let record = wait_for_record(&cache, KEY).await;
    let cache_key = record.cache_key.unwrap();
    assert!(cache.blob.exists(&cache_key).await.unwrap());

    let scope = Scope::project("p1").unwrap();
    let processed = cache.service.purge(&scope).await.unwrap();
    assert_eq!(processed, 1);

    assert_eq!(cache.registry.get(KEY).await.unwrap(), None);
    assert!(!cache.blob.exists(&cache_key).await.unwrap());
}
