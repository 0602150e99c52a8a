//! Cache key construction.

use crate::entity::CacheEntity;

/// Namespace prefix for data entries.
pub const DATA_NAMESPACE: &str = "cache";

/// Namespace prefix for rebuild locks.
pub const LOCK_NAMESPACE: &str = "lock";

/// Builds the keys an entity occupies in the cache store.
///
/// Every entity kind gets its own `{prefix}` segment so IDs of different
/// kinds never collide:
///
/// ```text
/// cache:shop:42   data entry (plain, wrapped or null marker)
/// lock:shop:42    rebuild lock
/// cache:shop      every shop, as one list
/// ```
///
/// The collection key has no ID segment, so no ID can ever map onto it.
pub struct CacheKeyBuilder;

impl CacheKeyBuilder {
    /// Key holding the entity's cached value.
    pub fn data_key<T: CacheEntity>(id: &T::Key) -> String {
        format!("{}:{}:{}", DATA_NAMESPACE, T::cache_prefix(), id)
    }

    /// Key holding the cached list of every entity of the kind.
    pub fn collection_key<T: CacheEntity>() -> String {
        format!("{}:{}", DATA_NAMESPACE, T::cache_prefix())
    }

    /// Key guarding rebuilds of the entity's cached value.
    pub fn lock_key<T: CacheEntity>(id: &T::Key) -> String {
        format!("{}:{}:{}", LOCK_NAMESPACE, T::cache_prefix(), id)
    }
}
