//! Tag/status qualifier grammar for cache keys.
//!
//! A pointer-record key may carry a qualifier suffix narrowing the cached
//! content: `[tag,tag]` selects a tag list, `{status}` a workflow status.
//! Both are optional, the tag list comes first. Qualifiers are parsed and
//! validated once at the boundary; downstream code only ever sees the
//! structured form. A key whose qualifier fails this grammar is corrupt and
//! gets purged by the invalidation walk.

use crate::error::{Error, Result};
use std::fmt;

/// Parsed qualifier of a cache key: `[tag,tag]` and/or `{status}`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Qualifier {
    /// Tag filter, in the order they appear in the key.
    pub tags: Vec<String>,
    /// Workflow status filter.
    pub status: Option<String>,
}

fn valid_token(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl Qualifier {
    /// An empty qualifier (no tags, no status).
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.status.is_none()
    }

    /// Parse a qualifier suffix, e.g. `""`, `"[a,b]"`, `"{published}"`,
    /// `"[a]{draft}"`. Tokens are `[A-Za-z0-9_-]+`; anything else is
    /// rejected.
    pub fn parse(input: &str) -> Result<Self> {
        let mut qualifier = Qualifier::default();
        let mut rest = input;

        if let Some(inner) = rest.strip_prefix('[') {
            let (list, after) = inner.split_once(']').ok_or_else(|| {
                Error::InvalidQualifier(format!("unterminated tag list in {input:?}"))
            })?;
            for tag in list.split(',') {
                if !valid_token(tag) {
                    return Err(Error::InvalidQualifier(format!(
                        "bad tag {tag:?} in {input:?}"
                    )));
                }
                qualifier.tags.push(tag.to_string());
            }
            rest = after;
        }

        if let Some(inner) = rest.strip_prefix('{') {
            let (status, after) = inner.split_once('}').ok_or_else(|| {
                Error::InvalidQualifier(format!("unterminated status in {input:?}"))
            })?;
            if !valid_token(status) {
                return Err(Error::InvalidQualifier(format!(
                    "bad status {status:?} in {input:?}"
                )));
            }
            qualifier.status = Some(status.to_string());
            rest = after;
        }

        if !rest.is_empty() {
            return Err(Error::InvalidQualifier(format!(
                "trailing {rest:?} in {input:?}"
            )));
        }

        Ok(qualifier)
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.tags.is_empty() {
            write!(f, "[{}]", self.tags.join(","))?;
        }
        if let Some(status) = &self.status {
            write!(f, "{{{status}}}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty() {
        let q = Qualifier::parse("").unwrap();
        assert!(q.is_empty());
    }

    #[test]
    fn parse_tags() {
        let q = Qualifier::parse("[tag1,tag2]").unwrap();
        assert_eq!(q.tags, vec!["tag1", "tag2"]);
        assert_eq!(q.status, None);
    }

    #[test]
    fn parse_status() {
        let q = Qualifier::parse("{published}").unwrap();
        assert!(q.tags.is_empty());
        assert_eq!(q.status.as_deref(), Some("published"));
    }

    #[test]
    fn parse_tags_and_status() {
        let q = Qualifier::parse("[a,b-c]{draft}").unwrap();
        assert_eq!(q.tags, vec!["a", "b-c"]);
        assert_eq!(q.status.as_deref(), Some("draft"));
    }

    #[test]
    fn rejects_spaces_in_tags() {
        assert!(Qualifier::parse("[not a valid list]").is_err());
    }

    #[test]
    fn rejects_empty_tag() {
        assert!(Qualifier::parse("[a,,b]").is_err());
        assert!(Qualifier::parse("[]").is_err());
    }

    #[test]
    fn rejects_unterminated() {
        assert!(Qualifier::parse("[a,b").is_err());
        assert!(Qualifier::parse("{draft").is_err());
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(Qualifier::parse("[a]x").is_err());
        assert!(Qualifier::parse("{a}[b]").is_err());
    }

    #[test]
    fn display_round_trips() {
        for raw in ["", "[a]", "[a,b]", "{s}", "[a,b]{s}"] {
            let q = Qualifier::parse(raw).unwrap();
            assert_eq!(q.to_string(), raw);
        }
    }
}
