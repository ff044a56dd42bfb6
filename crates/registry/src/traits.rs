//! Registry store trait definition.

use crate::error::RegistryResult;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Key/value metadata store abstraction.
///
/// Records are JSON scalars or objects with an optional TTL. A record may
/// instead be a set of strings sharing a single expiry; set records and
/// scalar records are distinct kinds, and an operation applied to the wrong
/// kind fails with `WrongKind` rather than silently coercing.
#[async_trait]
pub trait RegistryStore: Send + Sync + 'static {
    /// Fetch a record. Expired and absent records are both `None`.
    async fn get(&self, key: &str) -> RegistryResult<Option<Value>>;

    /// Store a record, replacing any previous value. `None` TTL means the
    /// record never expires.
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> RegistryResult<()>;

    /// Delete a record. Deleting an absent key is a no-op.
    async fn del(&self, key: &str) -> RegistryResult<()>;

    /// Glob lookup over keys (`*` wildcard). A full scan on every backend;
    /// maintenance and migration paths only, never request serving.
    async fn find(&self, pattern: &str) -> RegistryResult<Vec<String>>;

    /// Add `delta` to a numeric record, creating it at `delta` (with `ttl`)
    /// if absent. Returns the new value.
    async fn incr(&self, key: &str, delta: i64, ttl: Option<Duration>) -> RegistryResult<i64>;

    /// Add a member to a set record, creating the set (with `ttl`) if
    /// absent. Returns whether the member was new.
    async fn add_to_set(
        &self,
        key: &str,
        member: &str,
        ttl: Option<Duration>,
    ) -> RegistryResult<bool>;

    /// List a set record's members. Absent sets list as empty.
    async fn list_set(&self, key: &str) -> RegistryResult<Vec<String>>;

    /// Remove one member from a set record. Absent sets and absent members
    /// are no-ops; a set emptied by this call is deleted.
    async fn del_from_set(&self, key: &str, member: &str) -> RegistryResult<()>;

    /// Remaining lifetime of a record, `None` for absent records and
    /// records without expiry.
    async fn ttl_remaining(&self, key: &str) -> RegistryResult<Option<Duration>>;

    /// Physically remove expired records. Backends with native TTL have
    /// nothing to do; returns the number of reaped records.
    async fn reap_expired(&self) -> RegistryResult<u64> {
        Ok(0)
    }

    /// Static identifier for logs.
    fn backend_name(&self) -> &'static str;

    /// Verify backend connectivity.
    async fn health_check(&self) -> RegistryResult<()> {
        Ok(())
    }
}

/// Match a key against a glob pattern where `*` matches any run of
/// characters (including none). No other metacharacters.
pub(crate) fn glob_match(pattern: &str, key: &str) -> bool {
    fn inner(pattern: &[u8], key: &[u8]) -> bool {
        match pattern.split_first() {
            None => key.is_empty(),
            Some((b'*', rest)) => (0..=key.len()).any(|i| inner(rest, &key[i..])),
            Some((c, rest)) => key
                .split_first()
                .is_some_and(|(kc, krest)| kc == c && inner(rest, krest)),
        }
    }
    inner(pattern.as_bytes(), key.as_bytes())
}
