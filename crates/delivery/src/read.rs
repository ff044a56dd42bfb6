//! The cache coherence read path.
//!
//! A per-key state machine entered on every read. Population never blocks
//! the request: the first reader after a miss pays for triggering the job,
//! not for waiting on it, and queue dedup collapses concurrent misses into
//! a single fetch. Store failures on a miss degrade to "accepted, try
//! later" instead of surfacing a hard error.

use crate::error::DeliveryResult;
use crate::fetch::Credentials;
use crate::populate::now_epoch;
use crate::service::CacheService;
use bytes::Bytes;
use glossa_blob::Location;
use glossa_core::{KeyParts, PointerRecord, PointerStatus};

/// Outcome of a cache read, ready for the HTTP layer to render.
#[derive(Clone, Debug, PartialEq)]
pub enum ReadOutcome {
    /// No content yet; population has been triggered. "Accepted, try later."
    Accepted,
    /// The client's conditional token matches the stored ETag.
    NotModified { etag: String },
    /// Cached content served from the blob store.
    Content {
        body: Bytes,
        etag: String,
        cache_control: String,
    },
    /// Content lives at an external URL; redirect instead of proxying.
    Redirect { location: String },
    /// Cached upstream client error, replayed verbatim until expiry.
    UpstreamError { status_code: u16, message: String },
}

impl ReadOutcome {
    /// HTTP status the excluded routing layer should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Accepted => 202,
            Self::NotModified { .. } => 304,
            Self::Content { .. } => 200,
            Self::Redirect { .. } => 302,
            Self::UpstreamError { status_code, .. } => *status_code,
        }
    }
}

impl CacheService {
    /// Read a key, applying conditional-request and auto-refresh rules.
    ///
    /// `conditional_etag` is the client's validator (If-None-Match value);
    /// when it matches the stored ETag the blob store and the collaborator
    /// are never touched.
    pub async fn read(
        &self,
        raw_key: &str,
        conditional_etag: Option<&str>,
        credentials: &Credentials,
    ) -> DeliveryResult<ReadOutcome> {
        // Malformed keys are protocol misuse: synchronous error, nothing
        // mutated, no degradation.
        let parts = KeyParts::split(raw_key)?;
        let record_key = parts.record_key();

        let value = match self.registry.get(&record_key).await {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(key = %record_key, error = %err, "registry read failed, degrading");
                self.trigger_population(&parts, credentials).await;
                return Ok(ReadOutcome::Accepted);
            }
        };

        let Some(value) = value else {
            // Absent record is the implicit pending state.
            self.trigger_population(&parts, credentials).await;
            return Ok(ReadOutcome::Accepted);
        };

        let record: PointerRecord = match serde_json::from_value(value) {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(key = %record_key, error = %err, "malformed pointer record, discarding");
                if let Err(err) = self.registry.del(&record_key).await {
                    tracing::warn!(key = %record_key, error = %err, "failed to discard record");
                }
                self.trigger_population(&parts, credentials).await;
                return Ok(ReadOutcome::Accepted);
            }
        };

        match record.status {
            PointerStatus::Error => Ok(ReadOutcome::UpstreamError {
                status_code: record.status_code.unwrap_or(500),
                message: record.status_message.unwrap_or_default(),
            }),
            PointerStatus::Success => {
                self.serve_success(&parts, record, conditional_etag, credentials)
                    .await
            }
        }
    }

    async fn serve_success(
        &self,
        parts: &KeyParts,
        record: PointerRecord,
        conditional_etag: Option<&str>,
        credentials: &Credentials,
    ) -> DeliveryResult<ReadOutcome> {
        let etag = record.etag.clone().unwrap_or_default();
        if !etag.is_empty() && conditional_etag == Some(etag.as_str()) {
            return Ok(ReadOutcome::NotModified { etag });
        }

        let location = Location::parse(record.location.clone().unwrap_or_default());
        let Some(location_key) = location.blob_key() else {
            return Ok(ReadOutcome::Redirect {
                location: location.as_str().to_string(),
            });
        };
        let cache_key = record.cache_key.as_deref().unwrap_or(location_key);

        match self.blob.get(cache_key).await {
            Ok(Some(body)) => {
                if self.needs_refresh(record.ts) {
                    // Stale-while-revalidate: serve now, refresh behind.
                    self.trigger_population(parts, credentials).await;
                }
                Ok(ReadOutcome::Content {
                    body,
                    etag,
                    cache_control: format!(
                        "public, max-age={}",
                        self.config.cache_control_max_age_secs
                    ),
                })
            }
            Ok(None) => {
                // Raced with a purge, or the blob store evicted it.
                tracing::debug!(key = %parts.record_key(), cache_key, "pointer has no blob, repopulating");
                self.trigger_population(parts, credentials).await;
                Ok(ReadOutcome::Accepted)
            }
            Err(err) => {
                tracing::warn!(key = %parts.record_key(), error = %err, "blob read failed, degrading");
                self.trigger_population(parts, credentials).await;
                Ok(ReadOutcome::Accepted)
            }
        }
    }

    fn needs_refresh(&self, ts: i64) -> bool {
        let age = now_epoch().saturating_sub(ts);
        age >= 0 && age as u64 >= self.config.auto_refresh_secs
    }
}
