//! Durable SQLite registry backend.
//!
//! Records live in one table keyed by the registry key, with the JSON value
//! as text and an advisory `expires_at` epoch-seconds column. Expiry is
//! lazy: reads treat an expired row as absent even before it is physically
//! reaped, and `reap_expired` removes the bodies on maintenance schedules.
//! `find` is a full-table scan and must stay off request-serving paths.
//!
//! Set records are stored as JSON arrays; scalar values are never arrays,
//! which keeps the two kinds distinguishable in one column.

use crate::error::{RegistryError, RegistryResult};
use crate::traits::RegistryStore;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::instrument;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS registry (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    expires_at INTEGER
);
CREATE INDEX IF NOT EXISTS idx_registry_expires_at
    ON registry (expires_at) WHERE expires_at IS NOT NULL;
"#;

/// SQLite-backed registry store.
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
}

fn now_epoch() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

fn deadline(ttl: Option<Duration>, now: i64) -> Option<i64> {
    ttl.map(|ttl| now.saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)))
}

fn is_live(expires_at: Option<i64>, now: i64) -> bool {
    expires_at.is_none_or(|deadline| deadline > now)
}

/// Translate a `*` glob into a LIKE pattern, escaping LIKE metacharacters.
fn like_pattern(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        match c {
            '*' => out.push('%'),
            '%' | '_' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

impl SqliteBackend {
    /// Open (creating if missing) and migrate the registry database.
    pub async fn new(path: impl AsRef<Path>) -> RegistryResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RegistryError::Config(format!("cannot create {parent:?}: {e}")))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection
            // avoids persistent "database is locked" failures.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        sqlx::query(SCHEMA_SQL).execute(&pool).await?;

        Ok(Self { pool })
    }

    async fn fetch_row(&self, key: &str) -> RegistryResult<Option<(String, Option<i64>)>> {
        let row: Option<(String, Option<i64>)> =
            sqlx::query_as("SELECT value, expires_at FROM registry WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row)
    }
}

#[async_trait]
impl RegistryStore for SqliteBackend {
    #[instrument(skip(self), fields(backend = "sqlite"))]
    async fn get(&self, key: &str) -> RegistryResult<Option<Value>> {
        match self.fetch_row(key).await? {
            None => Ok(None),
            Some((_, expires_at)) if !is_live(expires_at, now_epoch()) => {
                // Lazy reap: the row is already dead for readers.
                sqlx::query("DELETE FROM registry WHERE key = ?")
                    .bind(key)
                    .execute(&self.pool)
                    .await?;
                Ok(None)
            }
            Some((raw, _)) => {
                let value: Value = serde_json::from_str(&raw)?;
                if value.is_array() {
                    return Err(RegistryError::WrongKind(format!("{key} is a set record")));
                }
                Ok(Some(value))
            }
        }
    }

    #[instrument(skip(self, value), fields(backend = "sqlite"))]
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> RegistryResult<()> {
        if value.is_array() {
            return Err(RegistryError::WrongKind(
                "arrays are reserved for set records".to_string(),
            ));
        }
        let raw = serde_json::to_string(&value)?;
        sqlx::query("INSERT OR REPLACE INTO registry (key, value, expires_at) VALUES (?, ?, ?)")
            .bind(key)
            .bind(raw)
            .bind(deadline(ttl, now_epoch()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "sqlite"))]
    async fn del(&self, key: &str) -> RegistryResult<()> {
        sqlx::query("DELETE FROM registry WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "sqlite"))]
    async fn find(&self, pattern: &str) -> RegistryResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT key FROM registry WHERE key LIKE ? ESCAPE '\\' \
             AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(like_pattern(pattern))
        .bind(now_epoch())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(key,)| key).collect())
    }

    #[instrument(skip(self), fields(backend = "sqlite"))]
    async fn incr(&self, key: &str, delta: i64, ttl: Option<Duration>) -> RegistryResult<i64> {
        let mut tx = self.pool.begin().await?;
        let row: Option<(String, Option<i64>)> =
            sqlx::query_as("SELECT value, expires_at FROM registry WHERE key = ?")
                .bind(key)
                .fetch_optional(&mut *tx)
                .await?;

        let now = now_epoch();
        let (next, expires_at) = match row {
            Some((raw, expires_at)) if is_live(expires_at, now) => {
                let value: Value = serde_json::from_str(&raw)?;
                let n = value.as_i64().ok_or_else(|| {
                    RegistryError::WrongKind(format!("{key} is not a number"))
                })?;
                (n + delta, expires_at)
            }
            _ => (delta, deadline(ttl, now)),
        };

        sqlx::query("INSERT OR REPLACE INTO registry (key, value, expires_at) VALUES (?, ?, ?)")
            .bind(key)
            .bind(next.to_string())
            .bind(expires_at)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(next)
    }

    #[instrument(skip(self), fields(backend = "sqlite"))]
    async fn add_to_set(
        &self,
        key: &str,
        member: &str,
        ttl: Option<Duration>,
    ) -> RegistryResult<bool> {
        let mut tx = self.pool.begin().await?;
        let row: Option<(String, Option<i64>)> =
            sqlx::query_as("SELECT value, expires_at FROM registry WHERE key = ?")
                .bind(key)
                .fetch_optional(&mut *tx)
                .await?;

        let now = now_epoch();
        let (mut members, expires_at) = match row {
            Some((raw, expires_at)) if is_live(expires_at, now) => {
                let value: Value = serde_json::from_str(&raw)?;
                let members = match value {
                    Value::Array(items) => items
                        .into_iter()
                        .map(|item| {
                            item.as_str().map(str::to_string).ok_or_else(|| {
                                RegistryError::WrongKind(format!(
                                    "{key} holds non-string set members"
                                ))
                            })
                        })
                        .collect::<RegistryResult<Vec<String>>>()?,
                    _ => {
                        return Err(RegistryError::WrongKind(format!(
                            "{key} is not a set record"
                        )));
                    }
                };
                (members, expires_at)
            }
            _ => (Vec::new(), deadline(ttl, now)),
        };

        let was_new = !members.iter().any(|m| m == member);
        if was_new {
            members.push(member.to_string());
            let raw = serde_json::to_string(&members)?;
            sqlx::query(
                "INSERT OR REPLACE INTO registry (key, value, expires_at) VALUES (?, ?, ?)",
            )
            .bind(key)
            .bind(raw)
            .bind(expires_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(was_new)
    }

    #[instrument(skip(self), fields(backend = "sqlite"))]
    async fn list_set(&self, key: &str) -> RegistryResult<Vec<String>> {
        match self.fetch_row(key).await? {
            Some((raw, expires_at)) if is_live(expires_at, now_epoch()) => {
                let value: Value = serde_json::from_str(&raw)?;
                match value {
                    Value::Array(items) => items
                        .into_iter()
                        .map(|item| {
                            item.as_str().map(str::to_string).ok_or_else(|| {
                                RegistryError::WrongKind(format!(
                                    "{key} holds non-string set members"
                                ))
                            })
                        })
                        .collect(),
                    _ => Err(RegistryError::WrongKind(format!(
                        "{key} is not a set record"
                    ))),
                }
            }
            _ => Ok(Vec::new()),
        }
    }

    #[instrument(skip(self), fields(backend = "sqlite"))]
    async fn del_from_set(&self, key: &str, member: &str) -> RegistryResult<()> {
        let mut tx = self.pool.begin().await?;
        let row: Option<(String, Option<i64>)> =
            sqlx::query_as("SELECT value, expires_at FROM registry WHERE key = ?")
                .bind(key)
                .fetch_optional(&mut *tx)
                .await?;

        if let Some((raw, expires_at)) = row {
            if !is_live(expires_at, now_epoch()) {
                sqlx::query("DELETE FROM registry WHERE key = ?")
                    .bind(key)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;
                return Ok(());
            }
            let value: Value = serde_json::from_str(&raw)?;
            let members = match value {
                Value::Array(items) => items,
                _ => {
                    return Err(RegistryError::WrongKind(format!(
                        "{key} is not a set record"
                    )));
                }
            };
            let remaining: Vec<&Value> = members
                .iter()
                .filter(|item| item.as_str() != Some(member))
                .collect();

            if remaining.is_empty() {
                sqlx::query("DELETE FROM registry WHERE key = ?")
                    .bind(key)
                    .execute(&mut *tx)
                    .await?;
            } else if remaining.len() != members.len() {
                let raw = serde_json::to_string(&remaining)?;
                sqlx::query("UPDATE registry SET value = ? WHERE key = ?")
                    .bind(raw)
                    .bind(key)
                    .execute(&mut *tx)
                    .await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "sqlite"))]
    async fn ttl_remaining(&self, key: &str) -> RegistryResult<Option<Duration>> {
        match self.fetch_row(key).await? {
            Some((_, Some(expires_at))) => {
                let remaining = expires_at - now_epoch();
                if remaining > 0 {
                    Ok(Some(Duration::from_secs(remaining as u64)))
                } else {
                    Ok(None)
                }
            }
            _ => Ok(None),
        }
    }

    #[instrument(skip(self), fields(backend = "sqlite"))]
    async fn reap_expired(&self) -> RegistryResult<u64> {
        let result =
            sqlx::query("DELETE FROM registry WHERE expires_at IS NOT NULL AND expires_at <= ?")
                .bind(now_epoch())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn health_check(&self) -> RegistryResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
