//! Metadata registry for the Glossa content cache.
//!
//! This crate provides:
//! - The `RegistryStore` contract: namespaced JSON records with optional
//!   TTL, counters, set records, and glob lookup
//! - Backends: in-process (fast, native TTL), SQLite (durable, advisory
//!   TTL), and a hybrid of both with background reconciliation

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::{hybrid::HybridBackend, memory::MemoryBackend, sqlite::SqliteBackend};
pub use error::{RegistryError, RegistryResult};
pub use traits::RegistryStore;

use glossa_core::config::RegistryConfig;
use std::sync::Arc;
use std::time::Duration;

/// Create a registry store from configuration. Selected once at startup;
/// call sites only ever see the trait.
pub async fn from_config(config: &RegistryConfig) -> RegistryResult<Arc<dyn RegistryStore>> {
    match config {
        RegistryConfig::Memory => Ok(Arc::new(MemoryBackend::new())),
        RegistryConfig::Sqlite { path } => Ok(Arc::new(SqliteBackend::new(path).await?)),
        RegistryConfig::Hybrid {
            path,
            reconcile_interval_secs,
            write_skip_prefixes,
        } => {
            let durable: Arc<dyn RegistryStore> = Arc::new(SqliteBackend::new(path).await?);
            let fast: Arc<dyn RegistryStore> = Arc::new(MemoryBackend::new());
            let backend = HybridBackend::new(
                durable,
                fast,
                Duration::from_secs(*reconcile_interval_secs),
                write_skip_prefixes.clone(),
            );
            Ok(backend as Arc<dyn RegistryStore>)
        }
    }
}
