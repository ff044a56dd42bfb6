//! Delivery protocols for the Glossa content cache.
//!
//! This crate ties the registry and blob store together:
//! - The content-fetch collaborator interface
//! - The deduplicated background-population job queue
//! - The cache coherence read path (read-through, conditional requests,
//!   stale-while-revalidate)
//! - The invalidation/purge scope walks

pub mod error;
pub mod fetch;
mod populate;
pub mod queue;
pub mod read;
pub mod service;
pub mod walk;

pub use error::{DeliveryError, DeliveryResult};
pub use fetch::{
    ContentFetcher, Credentials, FETCH_LANGUAGE_CONTENT, FETCH_LANGUAGE_LIST, FetchError,
    FetchSpec,
};
pub use queue::{PopulationJob, PopulationQueue, QueueCounts};
pub use read::ReadOutcome;
pub use service::CacheService;
pub use walk::Scope;
