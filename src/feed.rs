//! Feeders carry a request's entity ID in and the loaded entity out.

use crate::entity::CacheEntity;
use crate::error::Result;

/// Receives the outcome of a cache operation.
///
/// `feed(Some(entity))` means Found, `feed(None)` means NotFound. The hooks
/// have no-op defaults; returning `Err` from one aborts the operation.
///
/// # Example
///
/// ```
/// use cache_guard::{CacheEntity, CacheFeed};
/// # use serde::{Deserialize, Serialize};
/// # #[derive(Clone, Serialize, Deserialize)]
/// # struct Shop { id: u64 }
/// # impl CacheEntity for Shop {
/// #     type Key = u64;
/// #     fn cache_key(&self) -> u64 { self.id }
/// #     fn cache_prefix() -> &'static str { "shop" }
/// # }
///
/// struct ShopFeeder {
///     id: u64,
///     shop: Option<Shop>,
/// }
///
/// impl CacheFeed<Shop> for ShopFeeder {
///     fn entity_id(&mut self) -> u64 {
///         self.id
///     }
///
///     fn feed(&mut self, entity: Option<Shop>) {
///         self.shop = entity;
///     }
/// }
/// ```
pub trait CacheFeed<T: CacheEntity>: Send {
    /// ID of the entity to load.
    fn entity_id(&mut self) -> T::Key;

    /// Store the result.
    fn feed(&mut self, entity: Option<T>);

    /// Validate the request before touching the cache.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Called when the cache answered on its own, with an entity or a null
    /// marker.
    fn on_hit(&mut self, _key: &str) -> Result<()> {
        Ok(())
    }

    /// Called when the answer had to come from the repository, or when a
    /// logical-expiration key is not warmed up.
    fn on_miss(&mut self, _key: &str) -> Result<()> {
        Ok(())
    }

    /// Called with the entity right before it is fed.
    fn on_loaded(&mut self, _entity: &T) -> Result<()> {
        Ok(())
    }
}

/// Feeder that just keeps the result.
pub struct GenericFeeder<T: CacheEntity> {
    pub id: T::Key,
    pub data: Option<T>,
}

impl<T: CacheEntity> GenericFeeder<T> {
    pub fn new(id: T::Key) -> Self {
        GenericFeeder { id, data: None }
    }
}

impl<T: CacheEntity> CacheFeed<T> for GenericFeeder<T> {
    fn entity_id(&mut self) -> T::Key {
        self.id.clone()
    }

    fn feed(&mut self, entity: Option<T>) {
        self.data = entity;
    }
}
