//! # cache-guard
//!
//! Read-through caching that survives the three classic cache failure modes.
//!
//! ## Features
//!
//! - **Penetration:** IDs that do not exist are remembered with a short-lived
//!   null marker, so repeated lookups never reach the repository
//! - **Breakdown:** a per-key distributed lock lets exactly one caller rebuild
//!   a hot entry while the others wait and re-read
//! - **Stale-while-revalidate:** logically expiring entries keep serving the
//!   last value while a bounded background pool refreshes them
//! - **Backend Agnostic:** in-memory and Redis backends, or your own
//! - **Repository Agnostic:** the cache only needs `fetch_by_id`
//!
//! ## Quick Start
//!
//! ```ignore
//! use cache_guard::{
//!     CacheEntity, CacheReader, CacheStrategy,
//!     backend::InMemoryBackend,
//!     repository::InMemoryRepository,
//! };
//!
//! // 1. Define your entity
//! #[derive(Clone, Serialize, Deserialize)]
//! struct Shop {
//!     id: u64,
//!     name: String,
//! }
//!
//! // 2. Implement CacheEntity
//! impl CacheEntity for Shop {
//!     type Key = u64;
//!
//!     fn cache_key(&self) -> Self::Key {
//!         self.id
//!     }
//!
//!     fn cache_prefix() -> &'static str {
//!         "shop"
//!     }
//! }
//!
//! // 3. Read through the cache
//! let reader = CacheReader::new(InMemoryBackend::new())?;
//! let shop = reader
//!     .fetch::<Shop, _>(&1, &repository, CacheStrategy::Mutex)
//!     .await?;
//! ```

#[macro_use]
extern crate log;

pub mod backend;
pub mod builder;
pub mod config;
pub mod entity;
pub mod error;
pub mod executor;
pub mod feed;
pub mod key;
pub mod lock;
pub mod observability;
pub mod reader;
pub mod repository;
pub mod serialization;
pub mod service;
pub mod strategy;

// Re-exports for convenience
pub use backend::CacheBackend;
pub use builder::CacheOperationBuilder;
pub use config::{CacheConfig, TtlPolicy};
pub use entity::CacheEntity;
pub use error::{Error, Result};
pub use executor::{ExecutorStats, RebuildExecutor};
pub use feed::{CacheFeed, GenericFeeder};
pub use lock::{DistributedLock, LockToken};
pub use reader::{CacheReader, OperationConfig};
pub use repository::DataRepository;
pub use service::CacheService;
pub use strategy::CacheStrategy;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
