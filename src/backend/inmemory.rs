//! In-process cache backend.

use super::CacheBackend;
use crate::error::Result;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone, Debug)]
struct StoredValue {
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn new(data: Vec<u8>, ttl: Option<Duration>) -> Self {
        StoredValue {
            data,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// In-memory backend built on `DashMap`.
///
/// Clones share the same map. Expiry uses the tokio clock, so tests running
/// with a paused runtime can step across TTL boundaries deterministically.
/// Expired entries are evicted lazily when touched.
///
/// This store is process-local: locks taken through it exclude other tasks in
/// the same process only.
///
/// # Example
///
/// ```
/// # use cache_guard::backend::{CacheBackend, InMemoryBackend};
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> cache_guard::Result<()> {
/// let backend = InMemoryBackend::new();
/// backend.set("cache:shop:1", b"value".to_vec(), None).await?;
/// assert!(backend.get("cache:shop:1").await?.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    store: Arc<DashMap<String, StoredValue>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.store.retain(|_, v| !v.is_expired(now));
        self.store.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every entry.
    pub async fn clear(&self) {
        self.store.clear();
        warn!("⚠ In-memory cache cleared");
    }
}

impl CacheBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = Instant::now();
        let value = match self.store.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.data.clone()),
            Some(_) => None,
            None => {
                debug!("✗ InMemory GET {} -> MISS", key);
                return Ok(None);
            }
        };

        match value {
            Some(data) => {
                debug!("✓ InMemory GET {} -> HIT", key);
                Ok(Some(data))
            }
            None => {
                self.store.remove_if(key, |_, v| v.is_expired(now));
                debug!("✗ InMemory GET {} -> EXPIRED", key);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        self.store
            .insert(key.to_string(), StoredValue::new(value, ttl));
        debug!("✓ InMemory SET {} (TTL: {:?})", key, ttl);
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let written = match self.store.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_expired(now) {
                    entry.insert(StoredValue::new(value, Some(ttl)));
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(StoredValue::new(value, Some(ttl)));
                true
            }
        };

        debug!("✓ InMemory SETNX {} -> {}", key, written);
        Ok(written)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.store.remove(key);
        debug!("✓ InMemory DELETE {}", key);
        Ok(())
    }

    async fn delete_if_equals(&self, key: &str, expected: &[u8]) -> Result<bool> {
        let now = Instant::now();
        let removed = self
            .store
            .remove_if(key, |_, v| !v.is_expired(now) && v.data == expected)
            .is_some();

        debug!("✓ InMemory DELETE-IF-EQ {} -> {}", key, removed);
        Ok(removed)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let updated = match self.store.get_mut(key) {
            Some(mut entry) if !entry.is_expired(now) => {
                entry.expires_at = Some(now + ttl);
                true
            }
            _ => false,
        };

        debug!("✓ InMemory EXPIRE {} {:?} -> {}", key, ttl, updated);
        Ok(updated)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}
