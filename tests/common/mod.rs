#![allow(dead_code)]

use cache_guard::backend::InMemoryBackend;
use cache_guard::repository::InMemoryRepository;
use cache_guard::{CacheBackend, CacheConfig, CacheEntity, CacheReader, DataRepository, Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Shop {
    pub id: u64,
    pub name: String,
    pub score: u32,
}

impl CacheEntity for Shop {
    type Key = u64;

    fn cache_key(&self) -> Self::Key {
        self.id
    }

    fn cache_prefix() -> &'static str {
        "shop"
    }
}

pub fn shop(id: u64, name: &str) -> Shop {
    Shop {
        id,
        name: name.to_string(),
        score: 42,
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Short lock backoff so contended tests finish quickly.
pub fn fast_config() -> CacheConfig {
    CacheConfig::default().with_lock_retry(Duration::from_millis(10), 500, Duration::from_secs(5))
}

pub fn reader(backend: &InMemoryBackend) -> CacheReader<InMemoryBackend> {
    CacheReader::from_config(backend.clone(), fast_config()).expect("valid config")
}

pub fn repository_with(shops: &[Shop]) -> InMemoryRepository<Shop> {
    let repo = InMemoryRepository::new();
    for shop in shops {
        repo.insert(shop.id, shop.clone());
    }
    repo
}

/// Backend whose every command fails as if the server were down.
#[derive(Clone, Default)]
pub struct FailingBackend;

fn down() -> Error {
    Error::StoreUnavailable("connection refused".to_string())
}

impl CacheBackend for FailingBackend {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Err(down())
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Option<Duration>) -> Result<()> {
        Err(down())
    }

    async fn set_if_absent(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<bool> {
        Err(down())
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        Err(down())
    }

    async fn delete_if_equals(&self, _key: &str, _expected: &[u8]) -> Result<bool> {
        Err(down())
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> Result<bool> {
        Err(down())
    }

    async fn health_check(&self) -> Result<bool> {
        Err(down())
    }
}

/// Repository that panics on fetch while armed.
#[derive(Clone)]
pub struct PanickingRepository {
    pub inner: InMemoryRepository<Shop>,
    pub armed: Arc<AtomicBool>,
    pub panics: Arc<AtomicUsize>,
}

impl PanickingRepository {
    pub fn new(inner: InMemoryRepository<Shop>) -> Self {
        PanickingRepository {
            inner,
            armed: Arc::new(AtomicBool::new(true)),
            panics: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }
}

impl DataRepository<Shop> for PanickingRepository {
    async fn fetch_by_id(&self, id: &u64) -> Result<Option<Shop>> {
        if self.armed.load(Ordering::SeqCst) {
            self.panics.fetch_add(1, Ordering::SeqCst);
            panic!("repository blew up while loading shop {}", id);
        }
        self.inner.fetch_by_id(id).await
    }

    async fn save(&self, entity: Shop) -> Result<Shop> {
        self.inner.save(entity).await
    }

    async fn update(&self, entity: &Shop) -> Result<()> {
        self.inner.update(entity).await
    }
}
