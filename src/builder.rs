//! Builder pattern for one-off cache operations.

use crate::backend::CacheBackend;
use crate::error::Result;
use crate::reader::{CacheReader, OperationConfig};
use crate::strategy::CacheStrategy;
use crate::{CacheEntity, CacheFeed, DataRepository};
use std::time::Duration;

/// Base delay between retries; doubles after each failed attempt.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Upper bound for a single retry delay.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Delay before the retry that follows failed attempt number `attempt`.
fn retry_delay(attempt: u32) -> Duration {
    let factor = 2_u32
        .checked_pow(attempt.saturating_sub(1))
        .unwrap_or(u32::MAX);
    RETRY_BASE_DELAY.saturating_mul(factor).min(MAX_RETRY_DELAY)
}

/// Fluent builder for a single cache operation.
///
/// # Example
///
/// ```ignore
/// use cache_guard::CacheStrategy;
/// use std::time::Duration;
///
/// reader
///     .builder()
///     .with_strategy(CacheStrategy::Mutex)
///     .with_ttl(Duration::from_secs(300))
///     .with_retry(3)
///     .execute::<Shop, _, _>(&mut feeder, &repo)
///     .await?;
/// ```
pub struct CacheOperationBuilder<'a, B: CacheBackend> {
    reader: &'a CacheReader<B>,
    strategy: CacheStrategy,
    operation: OperationConfig,
    retry_count: u32,
}

impl<'a, B: CacheBackend> CacheOperationBuilder<'a, B> {
    pub(crate) fn new(reader: &'a CacheReader<B>) -> Self {
        Self {
            reader,
            strategy: CacheStrategy::default(),
            operation: OperationConfig::default(),
            retry_count: 0,
        }
    }

    pub fn with_strategy(mut self, strategy: CacheStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Override the TTL for this operation only.
    ///
    /// Applies to the value TTL for pass-through and mutex reads and to the
    /// logical TTL of rebuilds scheduled by a logical-expiration read.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.operation.ttl_override = Some(ttl);
        self
    }

    /// Retry up to `count` times when a store is unavailable.
    ///
    /// Validation failures, timeouts and decode errors are returned as-is.
    pub fn with_retry(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }

    /// Execute the cache operation.
    ///
    /// # Errors
    ///
    /// The error of the last attempt, see [`CacheReader::with`].
    pub async fn execute<T, F, R>(self, feeder: &mut F, repository: &R) -> Result<()>
    where
        T: CacheEntity,
        F: CacheFeed<T>,
        R: DataRepository<T>,
    {
        let max_attempts = self.retry_count.saturating_add(1);
        let mut attempts = 0;

        loop {
            attempts += 1;

            match self
                .reader
                .with_config::<T, F, R>(feeder, repository, self.strategy, self.operation)
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) if e.is_unavailable() && attempts < max_attempts => {
                    let delay = retry_delay(attempts);
                    debug!(
                        "Cache operation failed (attempt {}/{}): {}, retrying in {:?}",
                        attempts, max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
