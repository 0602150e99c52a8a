mod common;

use cache_guard::backend::InMemoryBackend;
use cache_guard::observability::CounterMetrics;
use cache_guard::repository::InMemoryRepository;
use cache_guard::serialization::{self, LogicalEntry};
use cache_guard::{CacheBackend, CacheReader, CacheStrategy};
use common::{init_logging, reader, repository_with, shop, Shop};
use std::sync::Arc;
use std::time::Duration;

const READERS: usize = 32;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reads_of_missing_id_query_repository_once() {
    init_logging();
    let backend = InMemoryBackend::new();
    let reader = Arc::new(reader(&backend));
    let repo = repository_with(&[]).with_latency(Duration::from_millis(50));

    let mut handles = Vec::with_capacity(READERS);
    for _ in 0..READERS {
        let reader = Arc::clone(&reader);
        let repo = repo.clone();
        handles.push(tokio::spawn(async move {
            reader
                .fetch::<Shop, _>(&404, &repo, CacheStrategy::Mutex)
                .await
        }));
    }

    for handle in handles {
        assert!(handle.await.unwrap().unwrap().is_none());
    }
    assert_eq!(repo.fetch_count(), 1);
}

#[tokio::test]
async fn null_marker_shields_repository_for_pass_through() {
    init_logging();
    let backend = InMemoryBackend::new();
    let reader = Arc::new(reader(&backend));
    let repo = repository_with(&[]);

    assert!(reader
        .fetch::<Shop, _>(&404, &repo, CacheStrategy::PassThrough)
        .await
        .unwrap()
        .is_none());

    let mut handles = Vec::with_capacity(READERS);
    for _ in 0..READERS {
        let reader = Arc::clone(&reader);
        let repo = repo.clone();
        handles.push(tokio::spawn(async move {
            reader
                .fetch::<Shop, _>(&404, &repo, CacheStrategy::PassThrough)
                .await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().unwrap().is_none());
    }

    assert_eq!(repo.fetch_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_cold_reads_rebuild_once_under_mutex() {
    init_logging();
    let backend = InMemoryBackend::new();
    let reader = Arc::new(reader(&backend));
    let repo = repository_with(&[shop(1, "Hot Pot Palace")]).with_latency(Duration::from_millis(100));

    let mut handles = Vec::with_capacity(READERS);
    for _ in 0..READERS {
        let reader = Arc::clone(&reader);
        let repo = repo.clone();
        handles.push(tokio::spawn(async move {
            reader
                .fetch::<Shop, _>(&1, &repo, CacheStrategy::Mutex)
                .await
        }));
    }

    for handle in handles {
        let result = handle.await.unwrap().expect("no caller should time out");
        assert_eq!(result, Some(shop(1, "Hot Pot Palace")));
    }
    assert_eq!(repo.fetch_count(), 1);
    assert!(backend.get("lock:shop:1").await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stale_entry_is_served_while_one_rebuild_runs() {
    init_logging();
    let backend = InMemoryBackend::new();
    let metrics = Arc::new(CounterMetrics::new());
    let reader = Arc::new(reader(&backend).with_metrics(Box::new(Arc::clone(&metrics))));
    let repo = repository_with(&[shop(2, "Renamed")]).with_latency(Duration::from_millis(200));

    let stale = LogicalEntry {
        data: shop(2, "Original"),
        logical_expiry: serialization::now_millis() - 1_000,
    };
    backend
        .set(
            "cache:shop:2",
            serialization::encode_logical(&stale).unwrap(),
            None,
        )
        .await
        .unwrap();

    let mut handles = Vec::with_capacity(READERS);
    for _ in 0..READERS {
        let reader = Arc::clone(&reader);
        let repo = repo.clone();
        handles.push(tokio::spawn(async move {
            reader
                .fetch::<Shop, _>(&2, &repo, CacheStrategy::LogicalExpiration)
                .await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), Some(shop(2, "Original")));
    }

    reader.wait_for_rebuilds().await;

    let stats = reader.rebuild_stats();
    assert_eq!(stats.submitted, 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(metrics.snapshot().rebuilds_scheduled, 1);
    assert_eq!(metrics.snapshot().stale, READERS as u64);
    assert_eq!(repo.fetch_count(), 1);

    let fresh = reader
        .fetch::<Shop, _>(&2, &repo, CacheStrategy::LogicalExpiration)
        .await
        .unwrap();
    assert_eq!(fresh, Some(shop(2, "Renamed")));
    assert!(backend.get("lock:shop:2").await.unwrap().is_none());
}

#[tokio::test]
async fn update_is_visible_to_next_read_for_every_strategy() {
    init_logging();
    for strategy in [
        CacheStrategy::PassThrough,
        CacheStrategy::Mutex,
        CacheStrategy::LogicalExpiration,
    ] {
        let backend = InMemoryBackend::new();
        let reader = reader(&backend);
        let repo = repository_with(&[shop(3, "Before")]);

        if strategy == CacheStrategy::LogicalExpiration {
            reader.warm_up::<Shop, _>(&3, &repo).await.unwrap();
        }
        let before = reader.fetch::<Shop, _>(&3, &repo, strategy).await.unwrap();
        assert_eq!(before, Some(shop(3, "Before")), "{}", strategy);

        reader.update(&repo, &shop(3, "After")).await.unwrap();

        let after = reader.fetch::<Shop, _>(&3, &repo, strategy).await.unwrap();
        assert_ne!(after, Some(shop(3, "Before")), "{}", strategy);
    }
}

#[tokio::test(start_paused = true)]
async fn null_marker_expires_at_its_ttl() {
    init_logging();
    let backend = InMemoryBackend::new();
    let reader = reader(&backend);
    let null_ttl = reader.config().null_ttl;
    let repo = repository_with(&[]);
    let epsilon = Duration::from_millis(5);

    async fn read_missing(reader: &CacheReader<InMemoryBackend>, repo: &InMemoryRepository<Shop>) -> Option<Shop> {
        reader
            .fetch::<Shop, _>(&404, repo, CacheStrategy::PassThrough)
            .await
            .unwrap()
    }

    assert!(read_missing(&reader, &repo).await.is_none());
    assert_eq!(repo.fetch_count(), 1);

    tokio::time::advance(null_ttl - epsilon).await;
    assert!(read_missing(&reader, &repo).await.is_none());
    assert_eq!(repo.fetch_count(), 1);

    tokio::time::advance(epsilon * 2).await;
    assert!(read_missing(&reader, &repo).await.is_none());
    assert_eq!(repo.fetch_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn value_entry_expires_at_configured_ttl() {
    init_logging();
    let backend = InMemoryBackend::new();
    let reader = reader(&backend);
    let value_ttl = reader.config().value_ttl.get_ttl("shop");
    let repo = repository_with(&[shop(4, "Noodles")]);

    reader
        .fetch::<Shop, _>(&4, &repo, CacheStrategy::Mutex)
        .await
        .unwrap();
    tokio::time::advance(value_ttl - Duration::from_secs(1)).await;
    reader
        .fetch::<Shop, _>(&4, &repo, CacheStrategy::Mutex)
        .await
        .unwrap();
    assert_eq!(repo.fetch_count(), 1);

    tokio::time::advance(Duration::from_secs(2)).await;
    reader
        .fetch::<Shop, _>(&4, &repo, CacheStrategy::Mutex)
        .await
        .unwrap();
    assert_eq!(repo.fetch_count(), 2);
}

#[tokio::test]
async fn lock_is_mutually_exclusive_across_readers() {
    let backend = InMemoryBackend::new();
    let first = CacheReader::new(backend.clone()).unwrap();
    let second = CacheReader::new(backend.clone()).unwrap();

    let (a, b) = tokio::join!(
        first.lock().try_acquire("lock:shop:5", Duration::from_secs(10)),
        second.lock().try_acquire("lock:shop:5", Duration::from_secs(10)),
    );
    let winners = [a.unwrap(), b.unwrap()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>();
    assert_eq!(winners.len(), 1);
}
