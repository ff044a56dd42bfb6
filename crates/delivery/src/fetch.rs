//! Content-fetch collaborator interface.
//!
//! The upstream provider is an external collaborator: a function keyed by
//! name taking credentials plus arguments and returning a JSON-serializable
//! result. A failure carrying a 4xx-class status code means "content not
//! found/authorized" and is cached as an error pointer record; every other
//! failure is retried by the population queue.

use async_trait::async_trait;
use glossa_core::KeyParts;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

/// Collaborator function fetching one language's content for a project.
pub const FETCH_LANGUAGE_CONTENT: &str = "fetch-language-content";

/// Collaborator function listing a project's languages.
pub const FETCH_LANGUAGE_LIST: &str = "fetch-language-list";

/// Opaque upstream credentials, forwarded verbatim to the collaborator.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials(pub Value);

impl Credentials {
    pub fn none() -> Self {
        Self(Value::Null)
    }
}

/// Collaborator failure with an optional HTTP-style status code.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct FetchError {
    pub status_code: Option<u16>,
    pub message: String,
}

impl FetchError {
    /// A failure carrying an upstream status code.
    pub fn with_status(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code: Some(status_code),
            message: message.into(),
        }
    }

    /// A transport-level failure with no status code.
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status_code: None,
            message: message.into(),
        }
    }

    /// 4xx-class failures are cached; everything else is retried.
    pub fn is_client_error(&self) -> bool {
        matches!(self.status_code, Some(code) if (400..500).contains(&code))
    }
}

/// What to fetch: a collaborator function name and its arguments.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FetchSpec {
    pub function: String,
    pub args: Vec<Value>,
}

impl FetchSpec {
    pub fn new(function: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            function: function.into(),
            args,
        }
    }

    /// The spec the read path derives for a cache key: fetch the key's
    /// language content, passing the qualifier suffix as a content filter
    /// when present.
    pub fn language_content(parts: &KeyParts) -> Self {
        let mut args = vec![json!(parts.project()), json!(parts.language())];
        if !parts.qualifier_raw().is_empty() {
            args.push(json!(parts.qualifier_raw()));
        }
        Self::new(FETCH_LANGUAGE_CONTENT, args)
    }
}

/// Upstream content provider.
#[async_trait]
pub trait ContentFetcher: Send + Sync + 'static {
    async fn fetch(
        &self,
        function: &str,
        credentials: &Credentials,
        args: &[Value],
    ) -> Result<Value, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_error_classification() {
        assert!(FetchError::with_status(404, "missing").is_client_error());
        assert!(FetchError::with_status(403, "denied").is_client_error());
        assert!(!FetchError::with_status(500, "boom").is_client_error());
        assert!(!FetchError::transport("timeout").is_client_error());
    }

    #[test]
    fn language_content_spec_includes_filter() {
        let parts = KeyParts::split("cache:p1:en:content[tag1]").unwrap();
        let spec = FetchSpec::language_content(&parts);
        assert_eq!(spec.function, FETCH_LANGUAGE_CONTENT);
        assert_eq!(spec.args, vec![json!("p1"), json!("en"), json!("[tag1]")]);

        let plain = KeyParts::split("cache:p1:en:content").unwrap();
        assert_eq!(
            FetchSpec::language_content(&plain).args,
            vec![json!("p1"), json!("en")]
        );
    }
}
