//! Authoritative data source behind the cache.

use crate::entity::CacheEntity;
use crate::error::{Error, Result};
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// The backing store the cache protects.
///
/// Only consulted on a cache miss or a rebuild. Repositories are cheap
/// handles (connection pools, `Arc`s) so they can be cloned into background
/// rebuild tasks.
///
/// # Example
///
/// ```ignore
/// impl DataRepository<Shop> for ShopRepository {
///     async fn fetch_by_id(&self, id: &u64) -> Result<Option<Shop>> {
///         sqlx::query_as("SELECT * FROM shop WHERE id = $1")
///             .bind(*id as i64)
///             .fetch_optional(&self.pool)
///             .await
///             .map_err(|e| Error::RepositoryError(e.to_string()))
///     }
///     // ...
/// }
/// ```
pub trait DataRepository<T: CacheEntity>: Clone + Send + Sync + 'static {
    /// Load an entity. `Ok(None)` means the store confirms it does not exist.
    fn fetch_by_id(&self, id: &T::Key) -> impl Future<Output = Result<Option<T>>> + Send;

    /// Persist a new entity and return it as stored.
    fn save(&self, entity: T) -> impl Future<Output = Result<T>> + Send;

    /// Overwrite an existing entity.
    fn update(&self, entity: &T) -> impl Future<Output = Result<()>> + Send;

    /// Load every entity of this kind, for small reference tables such as
    /// shop categories. Order is up to the repository.
    fn fetch_all(&self) -> impl Future<Output = Result<Vec<T>>> + Send {
        async {
            Err(Error::RepositoryError(format!(
                "{} does not support collection reads",
                T::cache_prefix()
            )))
        }
    }
}

/// `DashMap`-backed repository for tests, demos and prototypes.
///
/// Clones share the same data. An optional latency is applied to every
/// fetch to mimic a slow database, and fetches are counted.
#[derive(Clone)]
pub struct InMemoryRepository<T: CacheEntity> {
    data: Arc<DashMap<T::Key, T>>,
    fetches: Arc<AtomicUsize>,
    latency: Duration,
}

impl<T: CacheEntity> Default for InMemoryRepository<T> {
    fn default() -> Self {
        InMemoryRepository {
            data: Arc::new(DashMap::new()),
            fetches: Arc::new(AtomicUsize::new(0)),
            latency: Duration::ZERO,
        }
    }
}

impl<T: CacheEntity> InMemoryRepository<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every fetch by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn insert(&self, id: T::Key, entity: T) {
        self.data.insert(id, entity);
    }

    pub fn remove(&self, id: &T::Key) -> Option<T> {
        self.data.remove(id).map(|(_, entity)| entity)
    }

    /// Number of `fetch_by_id` and `fetch_all` calls served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl<T: CacheEntity> DataRepository<T> for InMemoryRepository<T> {
    async fn fetch_by_id(&self, id: &T::Key) -> Result<Option<T>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let entity = self.data.get(id).map(|entry| entry.value().clone());
        debug!(
            "[repository] fetch {}:{} -> {}",
            T::cache_prefix(),
            id,
            if entity.is_some() { "found" } else { "absent" }
        );
        Ok(entity)
    }

    async fn fetch_all(&self) -> Result<Vec<T>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let entities: Vec<T> = self.data.iter().map(|entry| entry.value().clone()).collect();
        debug!(
            "[repository] fetch all {} -> {} row(s)",
            T::cache_prefix(),
            entities.len()
        );
        Ok(entities)
    }

    async fn save(&self, entity: T) -> Result<T> {
        self.data.insert(entity.cache_key(), entity.clone());
        Ok(entity)
    }

    async fn update(&self, entity: &T) -> Result<()> {
        let id = entity.cache_key();
        match self.data.get_mut(&id) {
            Some(mut slot) => {
                *slot = entity.clone();
                Ok(())
            }
            None => Err(Error::RepositoryError(format!(
                "cannot update missing {}:{}",
                T::cache_prefix(),
                id
            ))),
        }
    }
}
