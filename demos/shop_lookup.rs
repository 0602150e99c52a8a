//! Shop lookups through all three read strategies.

use cache_guard::{
    backend::InMemoryBackend, error::Result, repository::InMemoryRepository, CacheConfig,
    CacheEntity, CacheFeed, CacheService, CacheStrategy,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Example entity: Shop
#[derive(Clone, Serialize, Deserialize, Debug)]
struct Shop {
    id: u64,
    name: String,
    area: String,
    score: u32,
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

/// Feeder for Shop
struct ShopFeeder {
    id: u64,
    shop: Option<Shop>,
}

impl ShopFeeder {
    fn new(id: u64) -> Self {
        ShopFeeder { id, shop: None }
    }
}

impl CacheFeed<Shop> for ShopFeeder {
    fn entity_id(&mut self) -> u64 {
        self.id
    }

    fn feed(&mut self, entity: Option<Shop>) {
        self.shop = entity;
    }
}

fn describe(feeder: &ShopFeeder) -> String {
    match &feeder.shop {
        Some(shop) => format!("{} in {} ({}/50)", shop.name, shop.area, shop.score),
        None => format!("shop {} not found", feeder.id),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init()
        .ok();

    println!("\n=== Cache Guard - Shop Lookup ===\n");

    // 1. Cache and a slow repository
    println!("1. Initializing in-memory cache and repository...");
    let repository = InMemoryRepository::new().with_latency(Duration::from_millis(30));
    repository.insert(
        1,
        Shop {
            id: 1,
            name: "Hot Pot Palace".to_string(),
            area: "Riverside".to_string(),
            score: 47,
        },
    );
    repository.insert(
        2,
        Shop {
            id: 2,
            name: "Dumpling House".to_string(),
            area: "Old Town".to_string(),
            score: 44,
        },
    );

    let config = CacheConfig::from_env().with_logical_ttl(Duration::from_secs(1));
    let cache = CacheService::from_config(InMemoryBackend::new(), config)?;
    println!("   ✓ Cache ready\n");

    // 2. Pass-through: miss, then hit
    println!("2. Pass-through lookups for shop 1:");
    for attempt in 1..=2 {
        let mut feeder = ShopFeeder::new(1);
        cache
            .execute::<Shop, _, _>(&mut feeder, &repository, CacheStrategy::PassThrough)
            .await?;
        println!("   attempt {}: {}", attempt, describe(&feeder));
    }
    println!(
        "   ✓ Repository queried {} time(s)\n",
        repository.fetch_count()
    );

    // 3. Missing shop is remembered
    println!("3. Looking up a shop that does not exist (999):");
    let before = repository.fetch_count();
    for _ in 0..3 {
        let mut feeder = ShopFeeder::new(999);
        cache
            .execute::<Shop, _, _>(&mut feeder, &repository, CacheStrategy::PassThrough)
            .await?;
        println!("   {}", describe(&feeder));
    }
    println!(
        "   ✓ Repository queried {} time(s) for 3 lookups\n",
        repository.fetch_count() - before
    );

    // 4. Mutex under a burst of concurrent readers
    println!("4. 20 concurrent mutex lookups for cold shop 2:");
    let before = repository.fetch_count();
    let mut handles = Vec::new();
    for _ in 0..20 {
        let cache = cache.clone();
        let repository = repository.clone();
        handles.push(tokio::spawn(async move {
            cache
                .fetch::<Shop, _>(&2, &repository, CacheStrategy::Mutex)
                .await
        }));
    }
    for handle in handles {
        if handle.await.is_err() {
            println!("   ✗ A reader panicked");
        }
    }
    println!(
        "   ✓ Repository queried {} time(s) for 20 readers\n",
        repository.fetch_count() - before
    );

    // 5. Logical expiration: warm up, go stale, refresh in background
    println!("5. Logical expiration for shop 1:");
    cache.warm_up::<Shop, _>(&1, &repository).await?;
    repository.insert(
        1,
        Shop {
            id: 1,
            name: "Hot Pot Palace (renovated)".to_string(),
            area: "Riverside".to_string(),
            score: 49,
        },
    );
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let mut feeder = ShopFeeder::new(1);
    cache
        .execute::<Shop, _, _>(&mut feeder, &repository, CacheStrategy::LogicalExpiration)
        .await?;
    println!("   stale read: {}", describe(&feeder));

    cache.reader().wait_for_rebuilds().await;
    let mut feeder = ShopFeeder::new(1);
    cache
        .execute::<Shop, _, _>(&mut feeder, &repository, CacheStrategy::LogicalExpiration)
        .await?;
    println!("   after rebuild: {}", describe(&feeder));
    println!("   ✓ {:?}\n", cache.reader().rebuild_stats());

    // 6. Updates invalidate
    println!("6. Updating shop 2 and reading it back:");
    cache
        .update(
            &repository,
            &Shop {
                id: 2,
                name: "Dumpling House".to_string(),
                area: "Old Town".to_string(),
                score: 50,
            },
        )
        .await?;
    let mut feeder = ShopFeeder::new(2);
    cache
        .execute::<Shop, _, _>(&mut feeder, &repository, CacheStrategy::Mutex)
        .await?;
    println!("   ✓ {}\n", describe(&feeder));

    // 7. Whole shop list, cached as one entry
    println!("7. Listing every shop twice:");
    let before = repository.fetch_count();
    for _ in 0..2 {
        let shops: Vec<Shop> = cache.fetch_all(&repository).await?;
        println!("   {} shop(s)", shops.len());
    }
    println!(
        "   ✓ Repository queried {} time(s) for 2 listings\n",
        repository.fetch_count() - before
    );

    println!("=== Example Complete ===\n");

    Ok(())
}
