//! Integration tests for the invalidation and purge scope walks.

mod common;

use common::fixtures::*;
use common::mocks::FetchPlan;
use glossa_core::index_key_for;
use glossa_delivery::{Credentials, DeliveryError, FetchSpec, ReadOutcome, Scope};
use serde_json::json;

fn creds() -> Credentials {
    Credentials(json!({"api_key": "test"}))
}

async fn populate(cache: &TestCache, key: &str, project: &str, language: &str, filter: Option<&str>) {
    let mut args = vec![json!(project), json!(language)];
    if let Some(filter) = filter {
        args.push(json!(filter));
    }
    cache
        .service
        .populate(key, FetchSpec::new("fetch-language-content", args), &creds())
        .await
        .unwrap();
}

#[tokio::test]
async fn invalidating_a_scope_requeues_every_key_still_servable() {
    let cache = cache();
    populate(&cache, "cache:p1:en:content", "p1", "en", None).await;
    populate(
        &cache,
        "cache:p1:en:content[tag1,tag2]",
        "p1",
        "en",
        Some("[tag1,tag2]"),
    )
    .await;

    let scope = Scope::project("p1").unwrap();
    let processed = cache.service.invalidate(&scope, &creds()).await.unwrap();
    assert_eq!(processed, 2);

    // Soft invalidation: the old pointers stay servable while jobs run.
    let outcome = cache
        .service
        .read("cache:p1:en:content", None, &creds())
        .await
        .unwrap();
    assert!(matches!(outcome, ReadOutcome::Content { .. }));
    let outcome = cache
        .service
        .read("cache:p1:en:content[tag1,tag2]", None, &creds())
        .await
        .unwrap();
    assert!(matches!(outcome, ReadOutcome::Content { .. }));
}

#[tokio::test]
async fn purge_removes_pointer_blob_and_index_entry() {
    let cache = cache();
    populate(&cache, "cache:p1:en:content", "p1", "en", None).await;

    let record = wait_for_record(&cache, "cache:p1:en:content").await;
    let cache_key = record.cache_key.unwrap();
    assert!(cache.blob.exists(&cache_key).await.unwrap());

    let scope = Scope::project("p1").unwrap();
    let processed = cache.service.purge(&scope).await.unwrap();
    assert_eq!(processed, 1);

    assert_eq!(cache.registry.get("cache:p1:en:content").await.unwrap(), None);
    assert!(!cache.blob.exists(&cache_key).await.unwrap());
    assert_eq!(
        cache.registry.list_set(&index_key_for("p1")).await.unwrap(),
        Vec::<String>::new()
    );

    // No repopulation after a purge.
    assert_eq!(
        cache.registry.get("cache:p1:en:content").await.unwrap(),
        None
    );
}

#[tokio::test]
async fn walks_are_idempotent() {
    let cache = cache();
    populate(&cache, "cache:p1:en:content", "p1", "en", None).await;
    populate(&cache, "cache:p1:de:content", "p1", "de", None).await;

    let scope = Scope::project("p1").unwrap();

    let first = cache.service.invalidate(&scope, &creds()).await.unwrap();
    let second = cache.service.invalidate(&scope, &creds()).await.unwrap();
    assert_eq!(first, 2);
    assert!(second <= first);

    // Let the re-population jobs drain so the purge below is not racing a
    // worker that would rewrite a pointer it just deleted.
    wait_for_queue_idle(&cache, "cache:p1:en:content").await;
    wait_for_queue_idle(&cache, "cache:p1:de:content").await;

    let first = cache.service.purge(&scope).await.unwrap();
    assert_eq!(first, 2);
    let second = cache.service.purge(&scope).await.unwrap();
    assert_eq!(second, 0);
}

#[tokio::test]
async fn malformed_qualifier_is_purged_by_either_walk() {
    let cache = cache();
    populate(&cache, "cache:p1:en:content", "p1", "en", None).await;
    populate(
        &cache,
        "cache:p1:en:content[not a valid list]",
        "p1",
        "en",
        Some("[not a valid list]"),
    )
    .await;

    let corrupt_record = wait_for_record(&cache, "cache:p1:en:content[not a valid list]").await;
    let corrupt_blob = corrupt_record.cache_key.unwrap();

    // Invalidate was requested, but the corrupt key is purged outright.
    let scope = Scope::project("p1").unwrap();
    let processed = cache.service.invalidate(&scope, &creds()).await.unwrap();
    assert_eq!(processed, 2);

    assert_eq!(
        cache
            .registry
            .get("cache:p1:en:content[not a valid list]")
            .await
            .unwrap(),
        None
    );
    assert!(!cache.blob.exists(&corrupt_blob).await.unwrap());

    // The healthy key survived as a soft invalidation.
    let outcome = cache
        .service
        .read("cache:p1:en:content", None, &creds())
        .await
        .unwrap();
    assert!(matches!(outcome, ReadOutcome::Content { .. }));
}

#[tokio::test]
async fn remnant_index_entries_are_cleaned_not_counted() {
    let cache = cache();

    // An index entry whose pointer record is long gone.
    cache
        .registry
        .add_to_set(&index_key_for("p1"), "cache:p1:en:content", None)
        .await
        .unwrap();

    let scope = Scope::project("p1").unwrap();
    let processed = cache.service.invalidate(&scope, &creds()).await.unwrap();
    assert_eq!(processed, 0);
    assert_eq!(
        cache.registry.list_set(&index_key_for("p1")).await.unwrap(),
        Vec::<String>::new()
    );
}

#[tokio::test]
async fn error_records_are_cleaned_not_counted() {
    let cache = cache();
    cache
        .fetcher
        .set_plan("p1", "en", FetchPlan::ClientError(404, "missing".into()))
        .await;

    // Cache the upstream failure through the read path.
    cache
        .service
        .read("cache:p1:en:content", None, &creds())
        .await
        .unwrap();
    wait_for_record(&cache, "cache:p1:en:content").await;

    let scope = Scope::project("p1").unwrap();
    let processed = cache.service.purge(&scope).await.unwrap();
    assert_eq!(processed, 0);

    assert_eq!(cache.registry.get("cache:p1:en:content").await.unwrap(), None);
    assert_eq!(
        cache.registry.list_set(&index_key_for("p1")).await.unwrap(),
        Vec::<String>::new()
    );
}

#[tokio::test]
async fn language_filter_narrows_the_walk() {
    let cache = cache();
    populate(&cache, "cache:p1:en:content", "p1", "en", None).await;
    populate(&cache, "cache:p1:de:content", "p1", "de", None).await;

    let scope = Scope::new("p1", Some("en"), None).unwrap();
    let processed = cache.service.purge(&scope).await.unwrap();
    assert_eq!(processed, 1);

    assert_eq!(cache.registry.get("cache:p1:en:content").await.unwrap(), None);
    assert!(
        cache
            .registry
            .get("cache:p1:de:content")
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn qualifier_filter_narrows_the_walk() {
    let cache = cache();
    populate(&cache, "cache:p1:en:content", "p1", "en", None).await;
    populate(
        &cache,
        "cache:p1:en:content[tag1]",
        "p1",
        "en",
        Some("[tag1]"),
    )
    .await;

    let scope = Scope::new("p1", Some("en"), Some("[tag1]")).unwrap();
    let processed = cache.service.purge(&scope).await.unwrap();
    assert_eq!(processed, 1);

    assert_eq!(
        cache
            .registry
            .get("cache:p1:en:content[tag1]")
            .await
            .unwrap(),
        None
    );
    assert!(
        cache
            .registry
            .get("cache:p1:en:content")
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn invalid_scope_syntax_is_rejected_without_mutation() {
    let cache = cache();
    populate(&cache, "cache:p1:en:content", "p1", "en", None).await;

    assert!(matches!(
        Scope::new("p 1", None, None),
        Err(DeliveryError::InvalidScope(_))
    ));
    assert!(matches!(
        Scope::new("p1", Some("e n"), None),
        Err(DeliveryError::InvalidScope(_))
    ));
    assert!(matches!(
        Scope::new("p1", None, Some("[bad tag]")),
        Err(DeliveryError::InvalidScope(_))
    ));

    // The populated key is untouched by the failed scope constructions.
    assert!(
        cache
            .registry
            .get("cache:p1:en:content")
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn purging_an_external_pointer_skips_the_blob_store() {
    let cache = cache();

    let mut record =
        glossa_core::PointerRecord::success(1, "e".into(), "https://cdn.example.com/x".into(), String::new());
    record.cache_key = None;
    cache
        .registry
        .set(
            "cache:p1:en:content",
            serde_json::to_value(&record).unwrap(),
            None,
        )
        .await
        .unwrap();
    cache
        .registry
        .add_to_set(&index_key_for("p1"), "cache:p1:en:content", None)
        .await
        .unwrap();

    let scope = Scope::project("p1").unwrap();
    let processed = cache.service.purge(&scope).await.unwrap();
    assert_eq!(processed, 1);
    assert_eq!(cache.registry.get("cache:p1:en:content").await.unwrap(), None);
}

#[tokio::test]
async fn scopes_do_not_leak_across_projects() {
    let cache = cache();
    populate(&cache, "cache:p1:en:content", "p1", "en", None).await;
    populate(&cache, "cache:p2:en:content", "p2", "en", None).await;

    let scope = Scope::project("p1").unwrap();
    let processed = cache.service.purge(&scope).await.unwrap();
    assert_eq!(processed, 1);

    assert!(
        cache
            .registry
            .get("cache:p2:en:content")
            .await
            .unwrap()
            .is_some()
    );
}
