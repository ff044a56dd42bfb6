//! Core domain types and shared logic for the Glossa content cache.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Cache keys and the tag/status qualifier grammar
//! - Pointer records describing where cached content lives
//! - Content hashes used for blob addressing and ETags
//! - Configuration types for backend selection

pub mod config;
pub mod error;
pub mod hash;
pub mod key;
pub mod qualifier;
pub mod record;

pub use config::{AppConfig, BlobConfig, DeliveryConfig, RegistryConfig};
pub use error::{Error, Result};
pub use hash::ContentHash;
pub use key::{CacheKey, KeyParts, blob_key_for, index_key_for, is_valid_segment};
pub use qualifier::Qualifier;
pub use record::{PointerRecord, PointerStatus};

/// Namespace prefix owned by the cache core. Other registry tenants
/// (auth tokens, locks, counters) must stay out of it.
pub const CACHE_PREFIX: &str = "cache";

/// Reserved location scheme meaning "resolve via the blob store".
pub const BLOB_SCHEME: &str = "blob";
