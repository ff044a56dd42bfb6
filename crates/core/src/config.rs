//! Configuration types shared across crates.
//!
//! Backends are selected once at startup through the tagged enums below and
//! the `from_config` factories in the registry and blob crates; call sites
//! only ever see the store traits.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Metadata registry backend selection.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RegistryConfig {
    /// In-process store with native TTL. Fast, ephemeral.
    Memory,
    /// Durable SQLite store with advisory (lazily enforced) TTL.
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
    /// Durable SQLite store accelerated by an in-process cache, kept
    /// convergent by a background reconciler.
    Hybrid {
        /// Database file path.
        path: PathBuf,
        /// Reconciliation interval in seconds; bounds accelerator staleness.
        #[serde(default = "default_reconcile_interval_secs")]
        reconcile_interval_secs: u64,
        /// Key prefixes whose writes bypass the accelerator entirely.
        #[serde(default = "default_write_skip_prefixes")]
        write_skip_prefixes: Vec<String>,
    },
}

/// Content blob store backend selection.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BlobConfig {
    /// In-process store.
    Memory,
    /// Local filesystem storage with atomic writes.
    Filesystem {
        /// Root directory for blobs.
        path: PathBuf,
    },
}

/// Delivery-layer tunables: pointer expiry, refresh, and queue policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Pointer-record expiry in seconds (success and error records alike).
    #[serde(default = "default_pointer_ttl_secs")]
    pub pointer_ttl_secs: u64,
    /// Age after which a served record also triggers a background refresh.
    #[serde(default = "default_auto_refresh_secs")]
    pub auto_refresh_secs: u64,
    /// `max-age` advertised in the Cache-Control directive on served blobs.
    #[serde(default = "default_cache_control_max_age_secs")]
    pub cache_control_max_age_secs: u64,
    /// Population attempts before a job is dropped.
    #[serde(default = "default_job_attempts")]
    pub job_attempts: u32,
    /// Delay between population attempts, in milliseconds.
    #[serde(default = "default_job_retry_delay_ms")]
    pub job_retry_delay_ms: u64,
    /// Dedup-latch lease in seconds; a crashed worker's latch expires after
    /// this long and the key becomes populatable again.
    #[serde(default = "default_job_lease_secs")]
    pub job_lease_secs: u64,
    /// Bounded population-queue depth.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Number of population workers.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_reconcile_interval_secs() -> u64 {
    30
}

fn default_write_skip_prefixes() -> Vec<String> {
    vec!["analytics:".to_string()]
}

fn default_pointer_ttl_secs() -> u64 {
    86400
}

fn default_auto_refresh_secs() -> u64 {
    3600
}

fn default_cache_control_max_age_secs() -> u64 {
    3600
}

fn default_job_attempts() -> u32 {
    3
}

fn default_job_retry_delay_ms() -> u64 {
    250
}

fn default_job_lease_secs() -> u64 {
    600
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_workers() -> usize {
    2
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            pointer_ttl_secs: default_pointer_ttl_secs(),
            auto_refresh_secs: default_auto_refresh_secs(),
            cache_control_max_age_secs: default_cache_control_max_age_secs(),
            job_attempts: default_job_attempts(),
            job_retry_delay_ms: default_job_retry_delay_ms(),
            job_lease_secs: default_job_lease_secs(),
            queue_capacity: default_queue_capacity(),
            workers: default_workers(),
        }
    }
}

impl DeliveryConfig {
    pub fn pointer_ttl(&self) -> Duration {
        Duration::from_secs(self.pointer_ttl_secs)
    }

    pub fn auto_refresh_window(&self) -> Duration {
        Duration::from_secs(self.auto_refresh_secs)
    }

    pub fn job_lease(&self) -> Duration {
        Duration::from_secs(self.job_lease_secs)
    }

    pub fn job_retry_delay(&self) -> Duration {
        Duration::from_millis(self.job_retry_delay_ms)
    }

    /// Validate hard constraints; returns warnings for legal-but-suspect
    /// settings.
    pub fn validate(&self) -> crate::Result<Vec<String>> {
        if self.job_attempts == 0 {
            return Err(crate::Error::Config(
                "job_attempts must be at least 1".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(crate::Error::Config(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(crate::Error::Config(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.pointer_ttl_secs == 0 {
            return Err(crate::Error::Config(
                "pointer_ttl_secs must be positive".to_string(),
            ));
        }

        let mut warnings = Vec::new();
        if self.auto_refresh_secs >= self.pointer_ttl_secs {
            warnings.push(format!(
                "auto_refresh_secs ({}) is not below pointer_ttl_secs ({}); \
                 records will expire before ever refreshing in the background",
                self.auto_refresh_secs, self.pointer_ttl_secs
            ));
        }
        if self.job_lease_secs == 0 {
            warnings.push(
                "job_lease_secs is 0; dedup latches never expire and a crashed \
                 worker permanently blocks its key"
                    .to_string(),
            );
        }
        Ok(warnings)
    }
}

/// Top-level application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    pub registry: RegistryConfig,
    pub blob: BlobConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

impl AppConfig {
    /// In-memory configuration for tests.
    pub fn for_testing() -> Self {
        Self {
            registry: RegistryConfig::Memory,
            blob: BlobConfig::Memory,
            delivery: DeliveryConfig::default(),
        }
    }
}
