//! In-process registry backend.
//!
//! The fast-store option: a single low-latency map with native TTL. Expired
//! entries are treated as absent the moment their deadline passes and are
//! physically removed when next touched; nothing is reaped eagerly.

use crate::error::{RegistryError, RegistryResult};
use crate::traits::{RegistryStore, glob_match};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::instrument;

enum EntryValue {
    Scalar(Value),
    Set(BTreeSet<String>),
}

struct Entry {
    value: EntryValue,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= Instant::now())
    }
}

/// In-memory registry store.
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn deadline(ttl: Option<Duration>) -> Option<Instant> {
        ttl.map(|ttl| Instant::now() + ttl)
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RegistryStore for MemoryBackend {
    #[instrument(skip(self), fields(backend = "memory"))]
    async fn get(&self, key: &str) -> RegistryResult<Option<Value>> {
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            None => Ok(None),
            Some(entry) if entry.expired() => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => match &entry.value {
                EntryValue::Scalar(value) => Ok(Some(value.clone())),
                EntryValue::Set(_) => Err(RegistryError::WrongKind(format!(
                    "{key} is a set record"
                ))),
            },
        }
    }

    #[instrument(skip(self, value), fields(backend = "memory"))]
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> RegistryResult<()> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: EntryValue::Scalar(value),
                expires_at: Self::deadline(ttl),
            },
        );
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "memory"))]
    async fn del(&self, key: &str) -> RegistryResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "memory"))]
    async fn find(&self, pattern: &str) -> RegistryResult<Vec<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|(key, entry)| !entry.expired() && glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect())
    }

    #[instrument(skip(self), fields(backend = "memory"))]
    async fn incr(&self, key: &str, delta: i64, ttl: Option<Duration>) -> RegistryResult<i64> {
        let mut entries = self.entries.write().await;
        let current = match entries.get(key) {
            Some(entry) if !entry.expired() => match &entry.value {
                EntryValue::Scalar(value) => Some((
                    value.as_i64().ok_or_else(|| {
                        RegistryError::WrongKind(format!("{key} is not a number"))
                    })?,
                    entry.expires_at,
                )),
                EntryValue::Set(_) => {
                    return Err(RegistryError::WrongKind(format!("{key} is a set record")));
                }
            },
            _ => None,
        };

        let (next, expires_at) = match current {
            Some((n, expires_at)) => (n + delta, expires_at),
            None => (delta, Self::deadline(ttl)),
        };
        entries.insert(
            key.to_string(),
            Entry {
                value: EntryValue::Scalar(Value::from(next)),
                expires_at,
            },
        );
        Ok(next)
    }

    #[instrument(skip(self), fields(backend = "memory"))]
    async fn add_to_set(
        &self,
        key: &str,
        member: &str,
        ttl: Option<Duration>,
    ) -> RegistryResult<bool> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some(entry) if !entry.expired() => match &mut entry.value {
                EntryValue::Set(members) => Ok(members.insert(member.to_string())),
                EntryValue::Scalar(_) => Err(RegistryError::WrongKind(format!(
                    "{key} is not a set record"
                ))),
            },
            _ => {
                let mut members = BTreeSet::new();
                members.insert(member.to_string());
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: EntryValue::Set(members),
                        expires_at: Self::deadline(ttl),
                    },
                );
                Ok(true)
            }
        }
    }

    #[instrument(skip(self), fields(backend = "memory"))]
    async fn list_set(&self, key: &str) -> RegistryResult<Vec<String>> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if !entry.expired() => match &entry.value {
                EntryValue::Set(members) => Ok(members.iter().cloned().collect()),
                EntryValue::Scalar(_) => Err(RegistryError::WrongKind(format!(
                    "{key} is not a set record"
                ))),
            },
            _ => Ok(Vec::new()),
        }
    }

    #[instrument(skip(self), fields(backend = "memory"))]
    async fn del_from_set(&self, key: &str, member: &str) -> RegistryResult<()> {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(key) {
            if entry.expired() {
                entries.remove(key);
                return Ok(());
            }
            match &mut entry.value {
                EntryValue::Set(members) => {
                    members.remove(member);
                    if members.is_empty() {
                        entries.remove(key);
                    }
                }
                EntryValue::Scalar(_) => {
                    return Err(RegistryError::WrongKind(format!(
                        "{key} is not a set record"
                    )));
                }
            }
        }
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "memory"))]
    async fn ttl_remaining(&self, key: &str) -> RegistryResult<Option<Duration>> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if !entry.expired() => Ok(entry
                .expires_at
                .map(|deadline| deadline.saturating_duration_since(Instant::now()))),
            _ => Ok(None),
        }
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
