//! Shareable handle around a [`CacheReader`].

use crate::backend::CacheBackend;
use crate::config::CacheConfig;
use crate::error::Result;
use crate::reader::CacheReader;
use crate::strategy::CacheStrategy;
use crate::{CacheEntity, CacheFeed, DataRepository};
use std::sync::Arc;

/// Cheap-to-clone cache handle for application state.
///
/// Every clone drives the same reader, so locks, the rebuild pool and
/// metrics are shared.
///
/// # Example
///
/// ```ignore
/// let cache = CacheService::new(InMemoryBackend::new())?;
///
/// let handle = cache.clone();
/// tokio::spawn(async move {
///     handle.fetch::<Shop, _>(&1, &repo, CacheStrategy::Mutex).await
/// });
/// ```
pub struct CacheService<B: CacheBackend> {
    reader: Arc<CacheReader<B>>,
}

impl<B: CacheBackend> Clone for CacheService<B> {
    fn clone(&self) -> Self {
        CacheService {
            reader: Arc::clone(&self.reader),
        }
    }
}

impl<B: CacheBackend> CacheService<B> {
    pub fn new(backend: B) -> Result<Self> {
        Ok(Self::from_reader(CacheReader::new(backend)?))
    }

    pub fn from_config(backend: B, config: CacheConfig) -> Result<Self> {
        Ok(Self::from_reader(CacheReader::from_config(backend, config)?))
    }

    /// Wrap a reader that was already customized, e.g. with metrics.
    pub fn from_reader(reader: CacheReader<B>) -> Self {
        CacheService {
            reader: Arc::new(reader),
        }
    }

    pub async fn execute<T, F, R>(
        &self,
        feeder: &mut F,
        repository: &R,
        strategy: CacheStrategy,
    ) -> Result<()>
    where
        T: CacheEntity,
        F: CacheFeed<T>,
        R: DataRepository<T>,
    {
        self.reader.with(feeder, repository, strategy).await
    }

    pub async fn fetch<T, R>(
        &self,
        id: &T::Key,
        repository: &R,
        strategy: CacheStrategy,
    ) -> Result<Option<T>>
    where
        T: CacheEntity,
        R: DataRepository<T>,
    {
        self.reader.fetch(id, repository, strategy).await
    }

    /// Every entity of a kind, through one cached list.
    pub async fn fetch_all<T, R>(&self, repository: &R) -> Result<Vec<T>>
    where
        T: CacheEntity,
        R: DataRepository<T>,
    {
        self.reader.fetch_all(repository).await
    }

    pub async fn update<T, R>(&self, repository: &R, entity: &T) -> Result<()>
    where
        T: CacheEntity,
        R: DataRepository<T>,
    {
        self.reader.update(repository, entity).await
    }

    pub async fn save<T, R>(&self, repository: &R, entity: T) -> Result<T>
    where
        T: CacheEntity,
        R: DataRepository<T>,
    {
        self.reader.save(repository, entity).await
    }

    pub async fn invalidate<T: CacheEntity>(&self, id: &T::Key) -> Result<()> {
        self.reader.invalidate::<T>(id).await
    }

    pub async fn warm_up<T, R>(&self, id: &T::Key, repository: &R) -> Result<Option<T>>
    where
        T: CacheEntity,
        R: DataRepository<T>,
    {
        self.reader.warm_up(id, repository).await
    }

    /// Access the underlying reader for builder or TTL-specific calls.
    pub fn reader(&self) -> &CacheReader<B> {
        &self.reader
    }
}
