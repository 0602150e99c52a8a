//! Cache reader - main entry point for cache operations.

use crate::backend::CacheBackend;
use crate::config::CacheConfig;
use crate::entity::CacheEntity;
use crate::error::{Error, Result};
use crate::executor::{ExecutorStats, RebuildExecutor, RebuildTask};
use crate::feed::{CacheFeed, GenericFeeder};
use crate::key::CacheKeyBuilder;
use crate::lock::DistributedLock;
use crate::observability::{CacheMetrics, NoOpMetrics};
use crate::repository::DataRepository;
use crate::serialization::{self, CachedValue, LogicalEntry};
use crate::strategy::CacheStrategy;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

/// Per-operation overrides.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OperationConfig {
    /// Replaces the value TTL (pass-through, mutex) or the logical TTL
    /// (logical expiration) for this operation.
    pub ttl_override: Option<Duration>,
}

/// Outcome of reading a plain-mode data key.
enum PlainRead<T> {
    Hit(T),
    Null,
    Miss,
}

/// What a strategy resolved to, and whether the cache answered on its own.
struct Lookup<T> {
    entity: Option<T>,
    from_cache: bool,
}

impl<T> Lookup<T> {
    fn cached(entity: Option<T>) -> Self {
        Lookup {
            entity,
            from_cache: true,
        }
    }

    fn loaded(entity: Option<T>) -> Self {
        Lookup {
            entity,
            from_cache: false,
        }
    }
}

/// Orchestrates the read strategies over a backend, a lock and a rebuild
/// pool.
///
/// Results resolve to `Some(entity)` (found) or `None` (not found). Only
/// store failures, feeder/entity validation failures and mutex timeouts are
/// returned as errors.
///
/// Creating a reader spawns the rebuild workers, so it must happen inside a
/// tokio runtime.
///
/// # Example
///
/// ```ignore
/// use cache_guard::{CacheReader, CacheStrategy, backend::InMemoryBackend};
///
/// let reader = CacheReader::new(InMemoryBackend::new())?;
/// let shop: Option<Shop> = reader
///     .fetch::<Shop, _>(&1, &repository, CacheStrategy::Mutex)
///     .await?;
/// ```
pub struct CacheReader<B: CacheBackend> {
    backend: B,
    lock: DistributedLock<B>,
    executor: RebuildExecutor,
    config: CacheConfig,
    metrics: Box<dyn CacheMetrics>,
}

impl<B: CacheBackend> CacheReader<B> {
    /// Create a reader with the default configuration.
    pub fn new(backend: B) -> Result<Self> {
        Self::from_config(backend, CacheConfig::default())
    }

    /// Create a reader with a custom configuration.
    ///
    /// # Errors
    /// `Error::ConfigError` when the configuration does not validate.
    pub fn from_config(backend: B, config: CacheConfig) -> Result<Self> {
        config.validate()?;
        let executor =
            RebuildExecutor::new(config.rebuild_workers, config.rebuild_queue_capacity)?;

        Ok(CacheReader {
            lock: DistributedLock::new(backend.clone()),
            backend,
            executor,
            config,
            metrics: Box::new(NoOpMetrics),
        })
    }

    /// Set custom metrics handler.
    pub fn with_metrics(mut self, metrics: Box<dyn CacheMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Create a builder for operations with retries or TTL overrides.
    ///
    /// # Example
    ///
    /// ```ignore
    /// reader
    ///     .builder()
    ///     .with_strategy(CacheStrategy::Mutex)
    ///     .with_ttl(Duration::from_secs(300))
    ///     .with_retry(3)
    ///     .execute::<Shop, _, _>(&mut feeder, &repo)
    ///     .await?;
    /// ```
    pub fn builder(&self) -> crate::builder::CacheOperationBuilder<'_, B> {
        crate::builder::CacheOperationBuilder::new(self)
    }

    /// Read an entity through the cache and hand the result to `feeder`.
    ///
    /// # Errors
    ///
    /// - `Error::ValidationError`: Feeder or entity validation fails
    /// - `Error::StoreUnavailable`: Cache store unreachable
    /// - `Error::RepositoryError`: Backing store failed
    /// - `Error::Timeout`: Mutex strategy gave up waiting for the lock
    /// - `Error::SerializationError`: Entity could not be encoded
    pub async fn with<T, F, R>(
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
        self.with_config(feeder, repository, strategy, OperationConfig::default())
            .await
    }

    /// Same as [`with`](Self::with) with per-operation overrides.
    pub async fn with_config<T, F, R>(
        &self,
        feeder: &mut F,
        repository: &R,
        strategy: CacheStrategy,
        operation: OperationConfig,
    ) -> Result<()>
    where
        T: CacheEntity,
        F: CacheFeed<T>,
        R: DataRepository<T>,
    {
        let timer = Instant::now();

        feeder.validate()?;

        let id = feeder.entity_id();
        let cache_key = CacheKeyBuilder::data_key::<T>(&id);

        debug!(
            "» Cache operation for key: {} (strategy: {})",
            cache_key, strategy
        );

        let result = match strategy {
            CacheStrategy::PassThrough => {
                let ttl = self.value_ttl::<T>(&operation);
                self.strategy_pass_through(&id, &cache_key, repository, ttl)
                    .await
            }
            CacheStrategy::Mutex => {
                let ttl = self.value_ttl::<T>(&operation);
                self.strategy_mutex(&id, &cache_key, repository, ttl).await
            }
            CacheStrategy::LogicalExpiration => {
                let ttl = operation.ttl_override.unwrap_or(self.config.logical_ttl);
                self.strategy_logical(&id, &cache_key, repository, ttl)
                    .await
            }
        };

        let lookup = match result {
            Ok(lookup) => lookup,
            Err(e) => {
                self.metrics.record_error(&cache_key, &e.to_string());
                return Err(e);
            }
        };

        if let Some(entity) = &lookup.entity {
            entity.validate()?;
        }

        let elapsed = timer.elapsed();
        if lookup.from_cache {
            feeder.on_hit(&cache_key)?;
            self.metrics.record_hit(&cache_key, elapsed);
        } else {
            feeder.on_miss(&cache_key)?;
            self.metrics.record_miss(&cache_key, elapsed);
        }

        match lookup.entity {
            Some(entity) => {
                feeder.on_loaded(&entity)?;
                feeder.feed(Some(entity));
                debug!("✓ Cache operation succeeded in {:?}", elapsed);
            }
            None => {
                feeder.feed(None);
                debug!("Entity not found after cache operation for {}", cache_key);
            }
        }

        Ok(())
    }

    /// Read an entity without a custom feeder.
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
        let mut feeder = GenericFeeder::new(id.clone());
        self.with(&mut feeder, repository, strategy).await?;
        Ok(feeder.data)
    }

    /// Read every entity of a kind as one cached list.
    ///
    /// The list lives under [`CacheKeyBuilder::collection_key`] with the
    /// kind's value TTL. Writes through [`update`](Self::update) and
    /// [`save`](Self::save) drop it.
    pub async fn fetch_all<T, R>(&self, repository: &R) -> Result<Vec<T>>
    where
        T: CacheEntity,
        R: DataRepository<T>,
    {
        let timer = Instant::now();
        let cache_key = CacheKeyBuilder::collection_key::<T>();
        debug!("» Collection read for key: {}", cache_key);

        let lookup = match self.read_collection::<T, R>(&cache_key, repository).await {
            Ok(lookup) => lookup,
            Err(e) => {
                self.metrics.record_error(&cache_key, &e.to_string());
                return Err(e);
            }
        };

        let entities = lookup.entity.unwrap_or_default();
        for entity in &entities {
            entity.validate()?;
        }

        let elapsed = timer.elapsed();
        if lookup.from_cache {
            self.metrics.record_hit(&cache_key, elapsed);
        } else {
            self.metrics.record_miss(&cache_key, elapsed);
        }
        debug!(
            "✓ Collection {} has {} entr(ies) in {:?}",
            cache_key,
            entities.len(),
            elapsed
        );
        Ok(entities)
    }

    /// Update the entity in the repository, then drop its cache entry.
    ///
    /// The entry is gone before this returns, so the next read cannot observe
    /// the pre-update value.
    pub async fn update<T, R>(&self, repository: &R, entity: &T) -> Result<()>
    where
        T: CacheEntity,
        R: DataRepository<T>,
    {
        entity.validate()?;
        repository.update(entity).await?;
        self.invalidate::<T>(&entity.cache_key()).await
    }

    /// Save a new entity, then drop any null marker recorded for its ID.
    pub async fn save<T, R>(&self, repository: &R, entity: T) -> Result<T>
    where
        T: CacheEntity,
        R: DataRepository<T>,
    {
        entity.validate()?;
        let saved = repository.save(entity).await?;
        self.invalidate::<T>(&saved.cache_key()).await?;
        Ok(saved)
    }

    /// Remove the cached entry of an entity and the cached list of its kind.
    pub async fn invalidate<T: CacheEntity>(&self, id: &T::Key) -> Result<()> {
        let cache_key = CacheKeyBuilder::data_key::<T>(id);
        self.backend.delete(&cache_key).await?;
        self.backend
            .delete(&CacheKeyBuilder::collection_key::<T>())
            .await?;
        debug!("✓ Cache invalidated for {}", cache_key);
        Ok(())
    }

    /// Load an entity and store it as a wrapped entry with the configured
    /// logical TTL. Required before logical-expiration reads can find it.
    pub async fn warm_up<T, R>(&self, id: &T::Key, repository: &R) -> Result<Option<T>>
    where
        T: CacheEntity,
        R: DataRepository<T>,
    {
        self.warm_up_with_ttl(id, repository, self.config.logical_ttl)
            .await
    }

    /// [`warm_up`](Self::warm_up) with an explicit logical TTL.
    pub async fn warm_up_with_ttl<T, R>(
        &self,
        id: &T::Key,
        repository: &R,
        logical_ttl: Duration,
    ) -> Result<Option<T>>
    where
        T: CacheEntity,
        R: DataRepository<T>,
    {
        let cache_key = CacheKeyBuilder::data_key::<T>(id);
        let entity =
            write_logical_entry(&self.backend, repository, id, &cache_key, logical_ttl).await?;
        info!("✓ Warmed up {} (logical TTL: {:?})", cache_key, logical_ttl);
        Ok(entity)
    }

    /// Pass-through: cache, then repository; absent entities get a null marker.
    async fn strategy_pass_through<T, R>(
        &self,
        id: &T::Key,
        cache_key: &str,
        repository: &R,
        ttl: Duration,
    ) -> Result<Lookup<T>>
    where
        T: CacheEntity,
        R: DataRepository<T>,
    {
        match self.read_plain::<T>(cache_key).await? {
            PlainRead::Hit(entity) => {
                debug!("✓ Cache hit (PassThrough strategy)");
                Ok(Lookup::cached(Some(entity)))
            }
            PlainRead::Null => {
                debug!("✓ Null marker hit for {} - skipping repository", cache_key);
                Ok(Lookup::cached(None))
            }
            PlainRead::Miss => {
                debug!("Cache miss, falling back to repository");
                self.load_plain(id, cache_key, repository, ttl)
                    .await
                    .map(Lookup::loaded)
            }
        }
    }

    /// Mutex: only the lock holder queries the repository; others back off
    /// and re-read until the entry appears, the attempts run out or the
    /// deadline passes.
    async fn strategy_mutex<T, R>(
        &self,
        id: &T::Key,
        cache_key: &str,
        repository: &R,
        ttl: Duration,
    ) -> Result<Lookup<T>>
    where
        T: CacheEntity,
        R: DataRepository<T>,
    {
        let lock_key = CacheKeyBuilder::lock_key::<T>(id);
        let backoff = self.config.lock_retry_backoff;
        let started = tokio::time::Instant::now();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;

            match self.read_plain::<T>(cache_key).await? {
                PlainRead::Hit(entity) => return Ok(Lookup::cached(Some(entity))),
                PlainRead::Null => return Ok(Lookup::cached(None)),
                PlainRead::Miss => {}
            }

            if let Some(token) = self
                .lock
                .try_acquire(&lock_key, self.config.lock_ttl)
                .await?
            {
                let outcome = AssertUnwindSafe(
                    self.rebuild_under_lock(id, cache_key, repository, ttl),
                )
                .catch_unwind()
                .await;
                self.lock.release_quietly(token).await;

                return match outcome {
                    Ok(result) => result,
                    Err(panic) => std::panic::resume_unwind(panic),
                };
            }

            let waited = started.elapsed();
            if attempts >= self.config.lock_max_attempts
                || waited + backoff > self.config.lock_wait_timeout
            {
                warn!(
                    "✗ Gave up on {} after {} attempts ({:?})",
                    lock_key, attempts, waited
                );
                return Err(Error::Timeout(format!(
                    "lock {} still held after {} attempts ({:?})",
                    lock_key, attempts, waited
                )));
            }

            debug!(
                "Lock {} busy (attempt {}/{}), retrying in {:?}",
                lock_key, attempts, self.config.lock_max_attempts, backoff
            );
            tokio::time::sleep(backoff).await;
        }
    }

    /// Runs while holding the rebuild lock.
    async fn rebuild_under_lock<T, R>(
        &self,
        id: &T::Key,
        cache_key: &str,
        repository: &R,
        ttl: Duration,
    ) -> Result<Lookup<T>>
    where
        T: CacheEntity,
        R: DataRepository<T>,
    {
        // Another caller may have rebuilt the entry while we waited.
        match self.read_plain::<T>(cache_key).await? {
            PlainRead::Hit(entity) => {
                debug!("✓ {} was rebuilt by another caller", cache_key);
                Ok(Lookup::cached(Some(entity)))
            }
            PlainRead::Null => Ok(Lookup::cached(None)),
            PlainRead::Miss => self
                .load_plain(id, cache_key, repository, ttl)
                .await
                .map(Lookup::loaded),
        }
    }

    /// Logical expiration: never queries the repository inline.
    async fn strategy_logical<T, R>(
        &self,
        id: &T::Key,
        cache_key: &str,
        repository: &R,
        logical_ttl: Duration,
    ) -> Result<Lookup<T>>
    where
        T: CacheEntity,
        R: DataRepository<T>,
    {
        let Some(bytes) = self.backend.get(cache_key).await? else {
            debug!("✗ {} is not warmed up (LogicalExpiration strategy)", cache_key);
            return Ok(Lookup::loaded(None));
        };

        match serialization::decode_logical::<T>(&bytes) {
            Ok(entry) if !entry.is_expired() => {
                debug!("✓ Fresh hit (LogicalExpiration strategy)");
                Ok(Lookup::cached(Some(entry.data)))
            }
            Ok(entry) => {
                debug!("⌛ {} is logically expired, serving stale value", cache_key);
                self.metrics.record_stale(cache_key);
                self.schedule_rebuild(id, cache_key, repository, logical_ttl)
                    .await?;
                Ok(Lookup::cached(Some(entry.data)))
            }
            Err(e) => {
                warn!(
                    "⚠ Undecodable wrapped entry {}: {} - scheduling rebuild",
                    cache_key, e
                );
                self.schedule_rebuild(id, cache_key, repository, logical_ttl)
                    .await?;
                Ok(Lookup::loaded(None))
            }
        }
    }

    /// Hand a rebuild to the executor unless one is already in flight.
    async fn schedule_rebuild<T, R>(
        &self,
        id: &T::Key,
        cache_key: &str,
        repository: &R,
        logical_ttl: Duration,
    ) -> Result<()>
    where
        T: CacheEntity,
        R: DataRepository<T>,
    {
        let lock_key = CacheKeyBuilder::lock_key::<T>(id);
        let Some(token) = self
            .lock
            .try_acquire(&lock_key, self.config.lock_ttl)
            .await?
        else {
            debug!("Rebuild of {} already in progress", cache_key);
            return Ok(());
        };

        let work = {
            let backend = self.backend.clone();
            let repository = repository.clone();
            let id = id.clone();
            let cache_key = cache_key.to_string();
            async move {
                write_logical_entry(&backend, &repository, &id, &cache_key, logical_ttl)
                    .await
                    .map(|_| ())
            }
            .boxed()
        };
        let cleanup = {
            let lock = self.lock.clone();
            async move { lock.release_quietly(token).await }.boxed()
        };

        match self
            .executor
            .submit(RebuildTask::new(cache_key, work, cleanup))
            .await
        {
            Ok(()) => {
                self.metrics.record_rebuild_scheduled(cache_key);
                debug!("» Rebuild of {} scheduled", cache_key);
            }
            // Lock already released; a later stale read will try again.
            Err(e) => debug!("Skipped rebuild of {}: {}", cache_key, e),
        }
        Ok(())
    }

    async fn read_collection<T, R>(&self, cache_key: &str, repository: &R) -> Result<Lookup<Vec<T>>>
    where
        T: CacheEntity,
        R: DataRepository<T>,
    {
        if let Some(bytes) = self.backend.get(cache_key).await? {
            match serialization::deserialize_from_cache::<Vec<T>>(&bytes) {
                Ok(entities) => {
                    debug!("✓ Cache hit for collection {}", cache_key);
                    return Ok(Lookup::cached(Some(entities)));
                }
                Err(e) => {
                    warn!("⚠ Discarding undecodable entry {}: {}", cache_key, e);
                    self.backend.delete(cache_key).await?;
                }
            }
        }

        debug!("Collection miss, falling back to repository");
        let entities = repository.fetch_all().await?;
        let ttl = self.config.value_ttl.get_ttl(T::cache_prefix());
        let bytes = serialization::serialize_for_cache(&entities)?;
        self.backend.set(cache_key, bytes, Some(ttl)).await?;
        debug!("✓ Cached {} (TTL: {:?})", cache_key, ttl);
        Ok(Lookup::loaded(Some(entities)))
    }

    async fn read_plain<T: CacheEntity>(&self, cache_key: &str) -> Result<PlainRead<T>> {
        let Some(bytes) = self.backend.get(cache_key).await? else {
            return Ok(PlainRead::Miss);
        };

        match serialization::decode_plain::<T>(&bytes) {
            Ok(CachedValue::Present(entity)) => Ok(PlainRead::Hit(entity)),
            Ok(CachedValue::Absent) => Ok(PlainRead::Null),
            Err(e) => {
                warn!("⚠ Discarding undecodable entry {}: {}", cache_key, e);
                self.backend.delete(cache_key).await?;
                Ok(PlainRead::Miss)
            }
        }
    }

    /// Query the repository and record the answer as a plain entry or a null
    /// marker.
    async fn load_plain<T, R>(
        &self,
        id: &T::Key,
        cache_key: &str,
        repository: &R,
        ttl: Duration,
    ) -> Result<Option<T>>
    where
        T: CacheEntity,
        R: DataRepository<T>,
    {
        match repository.fetch_by_id(id).await? {
            Some(entity) => {
                let bytes = entity.serialize_for_cache()?;
                self.backend.set(cache_key, bytes, Some(ttl)).await?;
                debug!("✓ Cached {} (TTL: {:?})", cache_key, ttl);
                Ok(Some(entity))
            }
            None => {
                self.backend
                    .set(
                        cache_key,
                        serialization::NULL_MARKER.to_vec(),
                        Some(self.config.null_ttl),
                    )
                    .await?;
                debug!(
                    "✓ Null marker for {} (TTL: {:?})",
                    cache_key, self.config.null_ttl
                );
                Ok(None)
            }
        }
    }

    fn value_ttl<T: CacheEntity>(&self, operation: &OperationConfig) -> Duration {
        operation
            .ttl_override
            .unwrap_or_else(|| self.config.value_ttl.get_ttl(T::cache_prefix()))
    }

    /// Wait until every scheduled rebuild has finished.
    pub async fn wait_for_rebuilds(&self) {
        self.executor.wait_idle().await
    }

    pub fn rebuild_stats(&self) -> ExecutorStats {
        self.executor.stats()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get backend reference (for advanced use).
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Get the lock used to guard rebuilds.
    pub fn lock(&self) -> &DistributedLock<B> {
        &self.lock
    }

    /// Drain pending rebuilds and stop the workers.
    pub async fn shutdown(self) {
        self.executor.shutdown().await
    }
}

/// Fetch from the repository and store a fresh wrapped entry. An entity that
/// no longer exists has its entry removed.
async fn write_logical_entry<T, B, R>(
    backend: &B,
    repository: &R,
    id: &T::Key,
    cache_key: &str,
    logical_ttl: Duration,
) -> Result<Option<T>>
where
    T: CacheEntity,
    B: CacheBackend,
    R: DataRepository<T>,
{
    match repository.fetch_by_id(id).await? {
        Some(entity) => {
            let entry = LogicalEntry::new(entity, logical_ttl);
            backend
                .set(cache_key, serialization::encode_logical(&entry)?, None)
                .await?;
            debug!("✓ Rebuilt {} (fresh for {:?})", cache_key, logical_ttl);
            Ok(Some(entry.data))
        }
        None => {
            backend.delete(cache_key).await?;
            debug!("{} no longer exists, entry removed", cache_key);
            Ok(None)
        }
    }
}
