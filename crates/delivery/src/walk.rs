//! Invalidation and purge: the scope-walk protocols.
//!
//! Both read the scope's key-set index and process each member key. The
//! index is advisory: stray entries referencing missing records are
//! cleaned up along the way, never treated as errors. A key whose
//! qualifier fails the grammar is corrupt and purged outright regardless
//! of which protocol was requested. Every per-key step is idempotent, so
//! concurrent overlapping walks are safe.

use crate::error::{DeliveryError, DeliveryResult};
use crate::fetch::Credentials;
use crate::service::CacheService;
use glossa_blob::Location;
use glossa_core::qualifier::Qualifier;
use glossa_core::{CacheKey, KeyParts, PointerRecord, index_key_for, is_valid_segment};

/// Invalidation/purge granularity: a project, optionally narrowed to a
/// language and a qualifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Scope {
    project: String,
    language: Option<String>,
    filter: Option<Qualifier>,
}

impl Scope {
    /// Build a scope, validating every part. Invalid syntax is reported
    /// here, before any state is touched.
    pub fn new(
        project: &str,
        language: Option<&str>,
        filter: Option<&str>,
    ) -> DeliveryResult<Self> {
        if !is_valid_segment(project) {
            return Err(DeliveryError::InvalidScope(format!(
                "bad project {project:?}"
            )));
        }
        if let Some(language) = language {
            if !is_valid_segment(language) {
                return Err(DeliveryError::InvalidScope(format!(
                    "bad language {language:?}"
                )));
            }
        }
        let filter = match filter {
            Some(raw) => Some(
                Qualifier::parse(raw)
                    .map_err(|err| DeliveryError::InvalidScope(err.to_string()))?,
            ),
            None => None,
        };

        Ok(Self {
            project: project.to_string(),
            language: language.map(str::to_string),
            filter,
        })
    }

    /// The whole-project scope.
    pub fn project(project: &str) -> DeliveryResult<Self> {
        Self::new(project, None, None)
    }

    pub fn project_name(&self) -> &str {
        &self.project
    }

    fn matches(&self, key: &CacheKey) -> bool {
        self.language
            .as_deref()
            .is_none_or(|language| key.language() == language)
            && self
                .filter
                .as_ref()
                .is_none_or(|filter| key.qualifier() == filter)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WalkMode {
    Invalidate,
    Purge,
}

impl CacheService {
    /// Soft invalidation: re-enqueue population for every matching key.
    /// Stale pointers and blobs stay servable until their jobs complete.
    /// Returns the number of keys processed.
    pub async fn invalidate(
        &self,
        scope: &Scope,
        credentials: &Credentials,
    ) -> DeliveryResult<u64> {
        self.walk(scope, WalkMode::Invalidate, credentials).await
    }

    /// Hard eviction: delete pointer, blob, and index entry for every
    /// matching key. No repopulation. Returns the number of keys
    /// processed.
    pub async fn purge(&self, scope: &Scope) -> DeliveryResult<u64> {
        self.walk(scope, WalkMode::Purge, &Credentials::none()).await
    }

    async fn walk(
        &self,
        scope: &Scope,
        mode: WalkMode,
        credentials: &Credentials,
    ) -> DeliveryResult<u64> {
        let index_key = index_key_for(&scope.project);
        let members = self.registry.list_set(&index_key).await?;

        let mut processed = 0u64;
        for member in members {
            let key = match CacheKey::parse(&member) {
                Ok(key) => key,
                Err(err) => {
                    // Corrupt key: purge outright, whichever walk this is.
                    tracing::warn!(key = %member, error = %err, "corrupt key in index, purging");
                    self.purge_member(&index_key, &member).await?;
                    processed += 1;
                    continue;
                }
            };
            if !scope.matches(&key) {
                continue;
            }

            let record = match self.registry.get(&member).await {
                Ok(None) => {
                    // Remnant: the index outlived the record.
                    self.registry.del_from_set(&index_key, &member).await?;
                    continue;
                }
                Ok(Some(value)) => serde_json::from_value::<PointerRecord>(value).ok(),
                Err(err) => {
                    tracing::warn!(key = %member, error = %err, "unreadable record in walk");
                    None
                }
            };

            match record {
                Some(record) if record.is_success() => {
                    match mode {
                        WalkMode::Invalidate => {
                            let parts = KeyParts::split(&member)?;
                            self.trigger_population(&parts, credentials).await;
                        }
                        WalkMode::Purge => {
                            self.purge_member(&index_key, &member).await?;
                        }
                    }
                    processed += 1;
                }
                _ => {
                    // Failed or malformed entries are cleaned, not counted.
                    self.registry.del(&member).await?;
                    self.registry.del_from_set(&index_key, &member).await?;
                }
            }
        }

        tracing::info!(
            project = %scope.project,
            mode = ?mode,
            processed,
            "scope walk complete"
        );
        Ok(processed)
    }

    /// Delete a member's blob (when its location resolves into the blob
    /// store), its pointer record, and its index entry.
    async fn purge_member(&self, index_key: &str, member: &str) -> DeliveryResult<()> {
        match self.registry.get(member).await {
            Ok(Some(value)) => {
                if let Ok(record) = serde_json::from_value::<PointerRecord>(value) {
                    if let Some(blob_key) = blob_key_of(&record) {
                        self.blob.delete(&blob_key).await?;
                    }
                }
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(key = %member, error = %err, "unreadable record during purge");
            }
        }
        self.registry.del(member).await?;
        self.registry.del_from_set(index_key, member).await?;
        Ok(())
    }
}

/// Blob-store key referenced by a record, if its location resolves there.
fn blob_key_of(record: &PointerRecord) -> Option<String> {
    let location = Location::parse(record.location.clone()?);
    let location_key = location.blob_key()?;
    Some(
        record
            .cache_key
            .clone()
            .unwrap_or_else(|| location_key.to_string()),
    )
}
