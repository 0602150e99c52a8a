//! Cache store backends.
//!
//! A backend is a byte-oriented key/value store with TTLs and one atomic
//! "set if absent" primitive. Every operation touches a single key and is
//! atomic with respect to it; nothing here spans keys.

use crate::error::Result;
use std::future::Future;
use std::time::Duration;

#[cfg(feature = "inmemory")]
mod inmemory;
#[cfg(feature = "redis")]
mod redis;

#[cfg(feature = "inmemory")]
pub use inmemory::InMemoryBackend;
#[cfg(feature = "redis")]
pub use self::redis::{RedisBackend, RedisConfig};

/// Storage substrate shared by all strategies.
///
/// Backends are cheap handles (`Clone`) over shared state so they can be
/// moved into background rebuild tasks.
///
/// # Errors
///
/// Transport or availability failures must surface as
/// `Error::StoreUnavailable`. A backend never reports a failure as a miss.
pub trait CacheBackend: Clone + Send + Sync + 'static {
    /// Read a value. `None` when the key is absent or physically expired.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Write a value, replacing any previous one. `ttl: None` never expires.
    fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Write a value only if the key is absent. Returns whether it was written.
    fn set_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Remove a key. Removing an absent key is not an error.
    fn delete(&self, key: &str) -> impl Future<Output = Result<()>> + Send;

    /// Remove a key only if it currently holds `expected`.
    /// Returns whether it was removed.
    fn delete_if_equals(
        &self,
        key: &str,
        expected: &[u8],
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Reset the TTL of an existing key. Returns `false` if the key is absent.
    fn expire(&self, key: &str, ttl: Duration) -> impl Future<Output = Result<bool>> + Send;

    /// Check that the store is reachable.
    fn health_check(&self) -> impl Future<Output = Result<bool>> + Send;
}
