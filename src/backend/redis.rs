//! Redis cache backend implementation.

use super::CacheBackend;
use crate::error::{Error, Result};
use deadpool_redis::{Config, Connection, Pool, Runtime};
use std::time::Duration;

/// Default Redis connection pool size.
/// Formula: (CPU cores × 2) + 1
/// Override with REDIS_POOL_SIZE environment variable
const DEFAULT_POOL_SIZE: usize = 16;

/// Deletes KEYS[1] only while it still holds ARGV[1].
const COMPARE_AND_DELETE: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Configuration for Redis backend.
#[derive(Clone, Debug)]
pub struct RedisConfig {
    pub url: String, // e.g., "redis://localhost:6379/0"
    pub connection_timeout: Duration,
    pub pool_size: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        RedisConfig {
            url: "redis://localhost:6379".to_string(),
            connection_timeout: Duration::from_secs(5),
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

impl RedisConfig {
    /// Read `REDIS_URL` and `REDIS_POOL_SIZE`, keeping defaults for the rest.
    pub fn from_env() -> Self {
        let defaults = RedisConfig::default();
        RedisConfig {
            url: std::env::var("REDIS_URL").unwrap_or(defaults.url),
            pool_size: std::env::var("REDIS_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(defaults.pool_size),
            ..defaults
        }
    }
}

/// Redis backend with connection pooling.
///
/// Gives cluster-wide semantics to the distributed lock: every process
/// pointed at the same Redis shares lock ownership.
///
/// # Example
///
/// ```no_run
/// # use cache_guard::backend::{RedisBackend, RedisConfig, CacheBackend};
/// # use cache_guard::error::Result;
/// # async fn example() -> Result<()> {
/// let backend = RedisBackend::new(RedisConfig::default())?;
/// backend.set("key", b"value".to_vec(), None).await?;
/// let value = backend.get("key").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisBackend {
    pool: Pool,
    timeout: Duration,
}

impl RedisBackend {
    /// Create new Redis backend from configuration.
    ///
    /// # Errors
    /// Returns `Err` if connection pool creation fails
    pub fn new(config: RedisConfig) -> Result<Self> {
        let mut pool_config = Config::from_url(config.url.clone());
        pool_config.pool = Some(deadpool_redis::PoolConfig::new(config.pool_size));

        let pool = pool_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| Error::ConfigError(format!("Failed to create Redis pool: {}", e)))?;

        info!(
            "✓ Redis backend initialized for {} (pool size: {})",
            config.url, config.pool_size
        );

        Ok(RedisBackend {
            pool,
            timeout: config.connection_timeout,
        })
    }

    async fn connection(&self) -> Result<Connection> {
        match tokio::time::timeout(self.timeout, self.pool.get()).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(Error::StoreUnavailable(format!(
                "Failed to get Redis connection: {}",
                e
            ))),
            Err(_) => Err(Error::StoreUnavailable(format!(
                "Timed out after {:?} waiting for a Redis connection",
                self.timeout
            ))),
        }
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    // Redis rejects PX 0
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.connection().await?;

        let value: Option<Vec<u8>> = ::redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                Error::StoreUnavailable(format!("Redis GET failed for key {}: {}", key, e))
            })?;

        match &value {
            Some(_) => debug!("✓ Redis GET {} -> HIT", key),
            None => debug!("✓ Redis GET {} -> MISS", key),
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.connection().await?;

        let mut cmd = ::redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }

        let _: () = cmd.query_async(&mut conn).await.map_err(|e| {
            Error::StoreUnavailable(format!("Redis SET failed for key {}: {}", key, e))
        })?;

        debug!("✓ Redis SET {} (TTL: {:?})", key, ttl);
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool> {
        let mut conn = self.connection().await?;

        // SET NX replies OK when written and nil otherwise
        let reply: Option<String> = ::redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                Error::StoreUnavailable(format!("Redis SET NX failed for key {}: {}", key, e))
            })?;

        let written = reply.is_some();
        debug!("✓ Redis SET NX {} -> {}", key, written);
        Ok(written)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection().await?;

        let _: i64 = ::redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                Error::StoreUnavailable(format!("Redis DEL failed for key {}: {}", key, e))
            })?;

        debug!("✓ Redis DEL {}", key);
        Ok(())
    }

    async fn delete_if_equals(&self, key: &str, expected: &[u8]) -> Result<bool> {
        let mut conn = self.connection().await?;

        let deleted: i64 = ::redis::Script::new(COMPARE_AND_DELETE)
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                Error::StoreUnavailable(format!(
                    "Redis compare-and-delete failed for key {}: {}",
                    key, e
                ))
            })?;

        debug!("✓ Redis DEL-IF-EQ {} -> {}", key, deleted == 1);
        Ok(deleted == 1)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.connection().await?;

        let updated: i64 = ::redis::cmd("PEXPIRE")
            .arg(key)
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                Error::StoreUnavailable(format!("Redis PEXPIRE failed for key {}: {}", key, e))
            })?;

        debug!("✓ Redis PEXPIRE {} {:?} -> {}", key, ttl, updated == 1);
        Ok(updated == 1)
    }

    async fn health_check(&self) -> Result<bool> {
        let mut conn = match self.connection().await {
            Ok(conn) => conn,
            Err(_) => return Ok(false),
        };

        let pong: std::result::Result<String, _> =
            ::redis::cmd("PING").query_async(&mut conn).await;
        Ok(pong.is_ok())
    }
}
