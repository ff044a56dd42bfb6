//! Namespaced cache-key model.
//!
//! Pointer records live under colon-delimited keys of the form
//! `cache:{project}:{language}:content[qualifier]`; each project's key-set
//! index lives at `cache:{project}:keys`. [`KeyParts`] is the structural
//! split used on request paths (it does not validate the qualifier, so a
//! corrupt key can still be looked up and cleaned); [`CacheKey`] is the
//! fully validated form used by the invalidation walk.

use crate::CACHE_PREFIX;
use crate::error::{Error, Result};
use crate::hash::ContentHash;
use crate::qualifier::Qualifier;
use std::fmt;

/// Final key segment carrying the content marker and qualifier suffix.
pub const CONTENT_SEGMENT: &str = "content";

/// Whether a string is usable as a project or language segment.
pub fn is_valid_segment(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
}

/// The key-set index key for a project scope.
pub fn index_key_for(project: &str) -> String {
    format!("{CACHE_PREFIX}:{project}:keys")
}

/// Blob-store key for a logical key and its content hash. Re-fetches of
/// unchanged content land on the same blob; changed content gets a fresh
/// key so a concurrent reader never sees it swapped underneath.
pub fn blob_key_for(record_key: &str, hash: &ContentHash) -> String {
    format!("{record_key}:{hash}")
}

/// Structural split of a raw pointer-record key. The qualifier suffix is
/// kept verbatim and NOT validated; use [`CacheKey::parse`] for that.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyParts {
    project: String,
    language: String,
    qualifier_raw: String,
}

impl KeyParts {
    /// Split `cache:{project}:{language}:content...` into its parts.
    pub fn split(raw: &str) -> Result<Self> {
        let mut segments = raw.split(':');
        let prefix = segments.next().unwrap_or_default();
        if prefix != CACHE_PREFIX {
            return Err(Error::InvalidKey(format!(
                "expected `{CACHE_PREFIX}:` prefix in {raw:?}"
            )));
        }
        let project = segments
            .next()
            .filter(|s| is_valid_segment(s))
            .ok_or_else(|| Error::InvalidKey(format!("missing project in {raw:?}")))?;
        let language = segments
            .next()
            .filter(|s| is_valid_segment(s))
            .ok_or_else(|| Error::InvalidKey(format!("missing language in {raw:?}")))?;
        let last = segments
            .next()
            .ok_or_else(|| Error::InvalidKey(format!("missing content segment in {raw:?}")))?;
        if segments.next().is_some() {
            return Err(Error::InvalidKey(format!("too many segments in {raw:?}")));
        }
        let qualifier_raw = last
            .strip_prefix(CONTENT_SEGMENT)
            .ok_or_else(|| Error::InvalidKey(format!("missing content segment in {raw:?}")))?;

        Ok(Self {
            project: project.to_string(),
            language: language.to_string(),
            qualifier_raw: qualifier_raw.to_string(),
        })
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// The verbatim qualifier suffix (possibly invalid, possibly empty).
    pub fn qualifier_raw(&self) -> &str {
        &self.qualifier_raw
    }

    /// The key-set index key for this key's project.
    pub fn index_key(&self) -> String {
        index_key_for(&self.project)
    }

    pub fn record_key(&self) -> String {
        format!(
            "{CACHE_PREFIX}:{}:{}:{CONTENT_SEGMENT}{}",
            self.project, self.language, self.qualifier_raw
        )
    }
}

/// A fully validated cache key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheKey {
    project: String,
    language: String,
    qualifier: Qualifier,
}

impl CacheKey {
    pub fn new(project: &str, language: &str, qualifier: Qualifier) -> Result<Self> {
        if !is_valid_segment(project) {
            return Err(Error::InvalidKey(format!("bad project {project:?}")));
        }
        if !is_valid_segment(language) {
            return Err(Error::InvalidKey(format!("bad language {language:?}")));
        }
        Ok(Self {
            project: project.to_string(),
            language: language.to_string(),
            qualifier,
        })
    }

    /// Parse and validate a raw pointer-record key, qualifier included.
    pub fn parse(raw: &str) -> Result<Self> {
        let parts = KeyParts::split(raw)?;
        let qualifier = Qualifier::parse(&parts.qualifier_raw)?;
        Ok(Self {
            project: parts.project,
            language: parts.language,
            qualifier,
        })
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn qualifier(&self) -> &Qualifier {
        &self.qualifier
    }

    /// The registry key this cache key is stored under.
    pub fn record_key(&self) -> String {
        format!(
            "{CACHE_PREFIX}:{}:{}:{CONTENT_SEGMENT}{}",
            self.project, self.language, self.qualifier
        )
    }

    pub fn index_key(&self) -> String {
        index_key_for(&self.project)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.record_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_plain_key() {
        let parts = KeyParts::split("cache:p1:en:content").unwrap();
        assert_eq!(parts.project(), "p1");
        assert_eq!(parts.language(), "en");
        assert_eq!(parts.qualifier_raw(), "");
        assert_eq!(parts.record_key(), "cache:p1:en:content");
        assert_eq!(parts.index_key(), "cache:p1:keys");
    }

    #[test]
    fn split_keeps_invalid_qualifier_verbatim() {
        let parts = KeyParts::split("cache:p1:en:content[not a valid list]").unwrap();
        assert_eq!(parts.qualifier_raw(), "[not a valid list]");
    }

    #[test]
    fn split_rejects_foreign_namespace() {
        assert!(KeyParts::split("auth:p1:en:content").is_err());
        assert!(KeyParts::split("cache:p1:keys").is_err());
        assert!(KeyParts::split("cache:p1:en:tokens").is_err());
        assert!(KeyParts::split("cache::en:content").is_err());
    }

    #[test]
    fn parse_validates_qualifier() {
        let key = CacheKey::parse("cache:p1:en-US:content[tag1,tag2]").unwrap();
        assert_eq!(key.language(), "en-US");
        assert_eq!(key.qualifier().tags, vec!["tag1", "tag2"]);
        assert_eq!(key.record_key(), "cache:p1:en-US:content[tag1,tag2]");

        assert!(CacheKey::parse("cache:p1:en:content[not a valid list]").is_err());
    }

    #[test]
    fn blob_key_embeds_hash() {
        let hash = ContentHash::compute(b"payload");
        let key = blob_key_for("cache:p1:en:content", &hash);
        assert!(key.starts_with("cache:p1:en:content:"));
        assert!(key.ends_with(&hash.to_hex()));
    }
}
