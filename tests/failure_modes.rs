mod common;

use cache_guard::backend::InMemoryBackend;
use cache_guard::{CacheBackend, CacheConfig, CacheReader, CacheStrategy, Error};
use common::{init_logging, reader, repository_with, shop, FailingBackend, PanickingRepository, Shop};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn unavailable_store_is_reported_without_touching_repository() {
    init_logging();
    let reader = CacheReader::new(FailingBackend).unwrap();
    let repo = repository_with(&[shop(1, "Unreachable")]);

    for strategy in [
        CacheStrategy::PassThrough,
        CacheStrategy::Mutex,
        CacheStrategy::LogicalExpiration,
    ] {
        let result = reader.fetch::<Shop, _>(&1, &repo, strategy).await;
        assert!(
            matches!(result, Err(Error::StoreUnavailable(_))),
            "{} returned {:?}",
            strategy,
            result
        );
    }
    assert_eq!(repo.fetch_count(), 0);
}

#[tokio::test]
async fn update_reports_unavailable_store_after_writing_repository() {
    let reader = CacheReader::new(FailingBackend).unwrap();
    let repo = repository_with(&[shop(2, "Before")]);

    let result = reader.update(&repo, &shop(2, "After")).await;
    assert!(matches!(result, Err(Error::StoreUnavailable(_))));
}

#[tokio::test(start_paused = true)]
async fn mutex_gives_up_when_lock_is_never_released() {
    init_logging();
    let backend = InMemoryBackend::new();
    let config = CacheConfig::default().with_lock_retry(
        Duration::from_millis(50),
        1_000,
        Duration::from_secs(2),
    );
    let reader = CacheReader::from_config(backend.clone(), config).unwrap();
    let repo = repository_with(&[shop(3, "Stuck")]);

    let _held = reader
        .lock()
        .try_acquire("lock:shop:3", Duration::from_secs(3_600))
        .await
        .unwrap()
        .expect("lock is free");

    let started = tokio::time::Instant::now();
    let result = reader
        .fetch::<Shop, _>(&3, &repo, CacheStrategy::Mutex)
        .await;

    assert!(matches!(result, Err(Error::Timeout(_))));
    assert!(started.elapsed() <= Duration::from_secs(2));
    assert_eq!(repo.fetch_count(), 0);
}

#[tokio::test]
async fn corrupt_entry_is_rebuilt_inline_for_plain_strategies() {
    init_logging();
    for strategy in [CacheStrategy::PassThrough, CacheStrategy::Mutex] {
        let backend = InMemoryBackend::new();
        let reader = reader(&backend);
        let repo = repository_with(&[shop(4, "Healthy")]);

        // Right magic, wrong schema version.
        let mut bytes = b"CGRD".to_vec();
        bytes.extend_from_slice(&99u32.to_le_bytes());
        backend.set("cache:shop:4", bytes, None).await.unwrap();

        let result = reader.fetch::<Shop, _>(&4, &repo, strategy).await.unwrap();
        assert_eq!(result, Some(shop(4, "Healthy")), "{}", strategy);
        assert_eq!(repo.fetch_count(), 1);
    }
}

#[tokio::test]
async fn panicking_rebuild_releases_lock_and_keeps_worker_alive() {
    init_logging();
    let backend = InMemoryBackend::new();
    let reader = reader(&backend);
    let repo = PanickingRepository::new(repository_with(&[shop(5, "Eventually")]));

    backend
        .set("cache:shop:5", b"junk".to_vec(), None)
        .await
        .unwrap();

    let first = reader
        .fetch::<Shop, _>(&5, &repo, CacheStrategy::LogicalExpiration)
        .await
        .unwrap();
    assert!(first.is_none());
    reader.wait_for_rebuilds().await;

    assert_eq!(reader.rebuild_stats().failed, 1);
    assert!(backend.get("lock:shop:5").await.unwrap().is_none());

    repo.disarm();
    reader
        .fetch::<Shop, _>(&5, &repo, CacheStrategy::LogicalExpiration)
        .await
        .unwrap();
    reader.wait_for_rebuilds().await;

    let stats = reader.rebuild_stats();
    assert_eq!(stats.completed, 1);
    assert_eq!(
        reader
            .fetch::<Shop, _>(&5, &repo, CacheStrategy::LogicalExpiration)
            .await
            .unwrap(),
        Some(shop(5, "Eventually"))
    );
}

#[tokio::test]
async fn panicking_mutex_rebuild_releases_lock() {
    init_logging();
    let backend = InMemoryBackend::new();
    let reader = Arc::new(reader(&backend));
    let repo = PanickingRepository::new(repository_with(&[shop(6, "Later")]));

    let outcome = {
        let reader = Arc::clone(&reader);
        let repo = repo.clone();
        tokio::spawn(async move {
            reader
                .fetch::<Shop, _>(&6, &repo, CacheStrategy::Mutex)
                .await
        })
        .await
    };
    assert!(outcome.unwrap_err().is_panic());
    assert!(backend.get("lock:shop:6").await.unwrap().is_none());

    repo.disarm();
    let result = reader
        .fetch::<Shop, _>(&6, &repo, CacheStrategy::Mutex)
        .await
        .unwrap();
    assert_eq!(result, Some(shop(6, "Later")));
    assert_eq!(repo.panics.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn full_rebuild_queue_skips_rebuild_but_serves_stale() {
    init_logging();
    let backend = InMemoryBackend::new();
    let config = common::fast_config()
        .with_rebuild_workers(1)
        .with_rebuild_queue_capacity(1);
    let reader = CacheReader::from_config(backend.clone(), config).unwrap();
    let repo = repository_with(&[shop(7, "A"), shop(8, "B"), shop(9, "C"), shop(10, "D")])
        .with_latency(Duration::from_millis(200));

    for id in 7..=10 {
        let stale = cache_guard::serialization::LogicalEntry {
            data: shop(id, "stale"),
            logical_expiry: cache_guard::serialization::now_millis() - 1,
        };
        backend
            .set(
                &format!("cache:shop:{}", id),
                cache_guard::serialization::encode_logical(&stale).unwrap(),
                None,
            )
            .await
            .unwrap();
    }

    for id in 7..=10 {
        let served = reader
            .fetch::<Shop, _>(&id, &repo, CacheStrategy::LogicalExpiration)
            .await
            .unwrap();
        assert_eq!(served.map(|s| s.name), Some("stale".to_string()));
    }

    let stats = reader.rebuild_stats();
    assert!(stats.rejected >= 1, "{:?}", stats);

    reader.wait_for_rebuilds().await;
    // Rejected rebuilds leave no lock behind.
    for id in 7..=10 {
        assert!(backend
            .get(&format!("lock:shop:{}", id))
            .await
            .unwrap()
            .is_none());
    }
}
