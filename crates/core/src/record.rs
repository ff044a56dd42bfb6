//! Cache pointer records.
//!
//! A pointer record is the registry entry describing where (and whether)
//! cached content exists for a key. The "pending" state is implicit: a key
//! with no record has either never been populated or has expired.

use serde::{Deserialize, Serialize};

/// Terminal population outcome stored in a pointer record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerStatus {
    Success,
    Error,
}

/// Pointer record stored under `cache:{project}:{language}:content...`.
///
/// Field names are part of the persisted layout; do not rename.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointerRecord {
    pub status: PointerStatus,
    /// Population timestamp, epoch seconds.
    pub ts: i64,
    /// Content hash of the serialized payload. Present when status=success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// `blob://` URI or absolute external URL. Present when status=success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Blob-store key. Present when status=success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
    /// Upstream HTTP-style status code. Present when status=error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Upstream error message. Present when status=error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
}

impl PointerRecord {
    /// Build a success record pointing at a stored blob.
    pub fn success(ts: i64, etag: String, location: String, cache_key: String) -> Self {
        Self {
            status: PointerStatus::Success,
            ts,
            etag: Some(etag),
            location: Some(location),
            cache_key: Some(cache_key),
            status_code: None,
            status_message: None,
        }
    }

    /// Build an error record replaying an upstream client failure.
    pub fn error(ts: i64, status_code: u16, status_message: String) -> Self {
        Self {
            status: PointerStatus::Error,
            ts,
            etag: None,
            location: None,
            cache_key: None,
            status_code: Some(status_code),
            status_message: Some(status_message),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == PointerStatus::Success
    }
}
