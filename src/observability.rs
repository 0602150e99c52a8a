//! Metrics hooks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Receives cache events. Every method defaults to a no-op.
pub trait CacheMetrics: Send + Sync {
    /// The cache answered without the repository. Null markers count.
    fn record_hit(&self, _key: &str, _duration: Duration) {}

    /// The cache could not answer and the repository was consulted, or the
    /// key was cold.
    fn record_miss(&self, _key: &str, _duration: Duration) {}

    /// An operation failed.
    fn record_error(&self, _key: &str, _error: &str) {}

    /// A logically expired entry was served.
    fn record_stale(&self, _key: &str) {}

    /// A background rebuild was handed to the executor.
    fn record_rebuild_scheduled(&self, _key: &str) {}
}

/// Discards everything.
pub struct NoOpMetrics;

impl CacheMetrics for NoOpMetrics {}

/// Snapshot of [`CounterMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub stale: u64,
    pub rebuilds_scheduled: u64,
}

/// Lock-free counters, handy for tests and simple dashboards.
#[derive(Default)]
pub struct CounterMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
    stale: AtomicU64,
    rebuilds_scheduled: AtomicU64,
}

impl CounterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            rebuilds_scheduled: self.rebuilds_scheduled.load(Ordering::Relaxed),
        }
    }
}

impl CacheMetrics for CounterMetrics {
    fn record_hit(&self, _key: &str, _duration: Duration) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self, _key: &str, _duration: Duration) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_error(&self, _key: &str, _error: &str) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    fn record_stale(&self, _key: &str) {
        self.stale.fetch_add(1, Ordering::Relaxed);
    }

    fn record_rebuild_scheduled(&self, _key: &str) {
        self.rebuilds_scheduled.fetch_add(1, Ordering::Relaxed);
    }
}

// Lets callers keep a handle to the counters they hand to a reader.
impl<M: CacheMetrics + ?Sized> CacheMetrics for std::sync::Arc<M> {
    fn record_hit(&self, key: &str, duration: Duration) {
        (**self).record_hit(key, duration)
    }

    fn record_miss(&self, key: &str, duration: Duration) {
        (**self).record_miss(key, duration)
    }

    fn record_error(&self, key: &str, error: &str) {
        (**self).record_error(key, error)
    }

    fn record_stale(&self, key: &str) {
        (**self).record_stale(key)
    }

    fn record_rebuild_scheduled(&self, key: &str) {
        (**self).record_rebuild_scheduled(key)
    }
}
