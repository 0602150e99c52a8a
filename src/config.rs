//! Tunable parameters of the cache strategies.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

/// Default TTL of plain entries.
pub const DEFAULT_VALUE_TTL: Duration = Duration::from_secs(30 * 60);
/// Default TTL of null markers.
pub const DEFAULT_NULL_TTL: Duration = Duration::from_secs(2 * 60);
/// Default TTL of rebuild locks.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(10);
/// Default sleep between mutex-strategy attempts.
pub const DEFAULT_LOCK_RETRY_BACKOFF: Duration = Duration::from_millis(50);
pub const DEFAULT_LOCK_MAX_ATTEMPTS: u32 = 200;
pub const DEFAULT_LOCK_WAIT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default freshness window of wrapped entries.
pub const DEFAULT_LOGICAL_TTL: Duration = Duration::from_secs(30);
pub const DEFAULT_REBUILD_WORKERS: usize = 10;
pub const DEFAULT_REBUILD_QUEUE_CAPACITY: usize = 1024;

/// TTL applied to plain entries.
#[derive(Clone, Debug, PartialEq)]
pub enum TtlPolicy {
    /// Same TTL for every entity kind.
    Fixed(Duration),
    /// Per-prefix TTLs with a fallback.
    PerType {
        default: Duration,
        overrides: HashMap<String, Duration>,
    },
}

impl Default for TtlPolicy {
    fn default() -> Self {
        TtlPolicy::Fixed(DEFAULT_VALUE_TTL)
    }
}

impl TtlPolicy {
    /// TTL for entities with the given cache prefix.
    pub fn get_ttl(&self, prefix: &str) -> Duration {
        match self {
            TtlPolicy::Fixed(ttl) => *ttl,
            TtlPolicy::PerType { default, overrides } => {
                overrides.get(prefix).copied().unwrap_or(*default)
            }
        }
    }

    fn shortest(&self) -> Duration {
        match self {
            TtlPolicy::Fixed(ttl) => *ttl,
            TtlPolicy::PerType { default, overrides } => overrides
                .values()
                .copied()
                .fold(*default, Duration::min),
        }
    }
}

/// Configuration of a [`CacheReader`](crate::CacheReader).
///
/// # Example
///
/// ```
/// use cache_guard::config::CacheConfig;
/// use std::time::Duration;
///
/// let config = CacheConfig::default()
///     .with_null_ttl(Duration::from_secs(60))
///     .with_rebuild_workers(4);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct CacheConfig {
    pub value_ttl: TtlPolicy,
    pub null_ttl: Duration,
    pub lock_ttl: Duration,
    pub lock_retry_backoff: Duration,
    pub lock_max_attempts: u32,
    pub lock_wait_timeout: Duration,
    pub logical_ttl: Duration,
    pub rebuild_workers: usize,
    pub rebuild_queue_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            value_ttl: TtlPolicy::default(),
            null_ttl: DEFAULT_NULL_TTL,
            lock_ttl: DEFAULT_LOCK_TTL,
            lock_retry_backoff: DEFAULT_LOCK_RETRY_BACKOFF,
            lock_max_attempts: DEFAULT_LOCK_MAX_ATTEMPTS,
            lock_wait_timeout: DEFAULT_LOCK_WAIT_TIMEOUT,
            logical_ttl: DEFAULT_LOGICAL_TTL,
            rebuild_workers: DEFAULT_REBUILD_WORKERS,
            rebuild_queue_capacity: DEFAULT_REBUILD_QUEUE_CAPACITY,
        }
    }
}

impl CacheConfig {
    /// Build a configuration from `CACHE_*` environment variables.
    ///
    /// | variable                       | unit    |
    /// |--------------------------------|---------|
    /// | `CACHE_VALUE_TTL_SECS`         | seconds |
    /// | `CACHE_NULL_TTL_SECS`          | seconds |
    /// | `CACHE_LOCK_TTL_SECS`          | seconds |
    /// | `CACHE_LOCK_RETRY_MS`          | millis  |
    /// | `CACHE_LOCK_MAX_ATTEMPTS`      | count   |
    /// | `CACHE_LOCK_WAIT_MS`           | millis  |
    /// | `CACHE_LOGICAL_TTL_SECS`       | seconds |
    /// | `CACHE_REBUILD_WORKERS`        | count   |
    /// | `CACHE_REBUILD_QUEUE_CAPACITY` | count   |
    ///
    /// Unset variables keep their default; malformed ones are logged and
    /// ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = CacheConfig::default();
        let secs = |name: &str, fallback: Duration| {
            parse_var::<u64, _>(&lookup, name)
                .map(Duration::from_secs)
                .unwrap_or(fallback)
        };
        let millis = |name: &str, fallback: Duration| {
            parse_var::<u64, _>(&lookup, name)
                .map(Duration::from_millis)
                .unwrap_or(fallback)
        };

        CacheConfig {
            value_ttl: parse_var::<u64, _>(&lookup, "CACHE_VALUE_TTL_SECS")
                .map(|s| TtlPolicy::Fixed(Duration::from_secs(s)))
                .unwrap_or(defaults.value_ttl),
            null_ttl: secs("CACHE_NULL_TTL_SECS", defaults.null_ttl),
            lock_ttl: secs("CACHE_LOCK_TTL_SECS", defaults.lock_ttl),
            lock_retry_backoff: millis("CACHE_LOCK_RETRY_MS", defaults.lock_retry_backoff),
            lock_max_attempts: parse_var(&lookup, "CACHE_LOCK_MAX_ATTEMPTS")
                .unwrap_or(defaults.lock_max_attempts),
            lock_wait_timeout: millis("CACHE_LOCK_WAIT_MS", defaults.lock_wait_timeout),
            logical_ttl: secs("CACHE_LOGICAL_TTL_SECS", defaults.logical_ttl),
            rebuild_workers: parse_var(&lookup, "CACHE_REBUILD_WORKERS")
                .unwrap_or(defaults.rebuild_workers),
            rebuild_queue_capacity: parse_var(&lookup, "CACHE_REBUILD_QUEUE_CAPACITY")
                .unwrap_or(defaults.rebuild_queue_capacity),
        }
    }

    pub fn with_value_ttl(mut self, policy: TtlPolicy) -> Self {
        self.value_ttl = policy;
        self
    }

    pub fn with_null_ttl(mut self, ttl: Duration) -> Self {
        self.null_ttl = ttl;
        self
    }

    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    /// Set the mutex strategy's retry schedule.
    pub fn with_lock_retry(mut self, backoff: Duration, max_attempts: u32, timeout: Duration) -> Self {
        self.lock_retry_backoff = backoff;
        self.lock_max_attempts = max_attempts;
        self.lock_wait_timeout = timeout;
        self
    }

    pub fn with_logical_ttl(mut self, ttl: Duration) -> Self {
        self.logical_ttl = ttl;
        self
    }

    pub fn with_rebuild_workers(mut self, workers: usize) -> Self {
        self.rebuild_workers = workers;
        self
    }

    pub fn with_rebuild_queue_capacity(mut self, capacity: usize) -> Self {
        self.rebuild_queue_capacity = capacity;
        self
    }

    /// Check the configuration for values the strategies cannot work with.
    ///
    /// # Errors
    ///
    /// `Error::ConfigError` when a duration or count is zero, when null
    /// markers would outlive regular entries, or when a mutex reader would
    /// time out before its first retry.
    pub fn validate(&self) -> Result<()> {
        if self.null_ttl.is_zero() || self.lock_ttl.is_zero() || self.logical_ttl.is_zero() {
            return Err(Error::ConfigError(
                "null, lock and logical TTLs must be non-zero".to_string(),
            ));
        }
        if self.null_ttl >= self.value_ttl.shortest() {
            return Err(Error::ConfigError(format!(
                "null marker TTL {:?} must be shorter than every value TTL",
                self.null_ttl
            )));
        }
        if self.lock_max_attempts == 0 {
            return Err(Error::ConfigError(
                "lock_max_attempts must be at least 1".to_string(),
            ));
        }
        if self.lock_wait_timeout < self.lock_retry_backoff {
            return Err(Error::ConfigError(format!(
                "lock wait timeout {:?} must cover at least one retry backoff of {:?}",
                self.lock_wait_timeout, self.lock_retry_backoff
            )));
        }
        if self.rebuild_workers == 0 || self.rebuild_queue_capacity == 0 {
            return Err(Error::ConfigError(
                "rebuild pool needs at least one worker and one queue slot".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<V, F>(lookup: &F, name: &str) -> Option<V>
where
    V: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring malformed {}={:?}, using default", name, raw);
            None
        }
    }
}
