//! Blob location URIs.

use glossa_core::BLOB_SCHEME;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a cached payload can be fetched from.
///
/// The `blob://` scheme is reserved: it means "resolve via the same blob
/// store using the embedded key". Any other scheme is an externally
/// fetchable URL the read path redirects to instead of proxying bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Location(String);

impl Location {
    /// A location resolving into the blob store by key.
    pub fn for_blob(key: &str) -> Self {
        Self(format!("{BLOB_SCHEME}://{key}"))
    }

    /// An externally fetchable URL.
    pub fn external(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn parse(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The blob-store key, when this is a `blob://` location.
    pub fn blob_key(&self) -> Option<&str> {
        self.0
            .strip_prefix(BLOB_SCHEME)
            .and_then(|rest| rest.strip_prefix("://"))
    }

    pub fn is_blob(&self) -> bool {
        self.blob_key().is_some()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
