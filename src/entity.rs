//! Core entity trait that all cached entities must implement.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Display;
use std::hash::Hash;

/// Trait that all entities stored in cache must implement.
///
/// The cache never looks inside an entity beyond serializing it; the ID and
/// the prefix are all it needs to place the entity in the key namespace.
///
/// # Example
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use cache_guard::CacheEntity;
///
/// #[derive(Clone, Serialize, Deserialize)]
/// pub struct Shop {
///     pub id: u64,
///     pub name: String,
/// }
///
/// impl CacheEntity for Shop {
///     type Key = u64;
///
///     fn cache_key(&self) -> Self::Key {
///         self.id
///     }
///
///     fn cache_prefix() -> &'static str {
///         "shop"
///     }
/// }
/// ```
pub trait CacheEntity: Send + Sync + Serialize + DeserializeOwned + Clone + 'static {
    /// Type of the entity's ID (numeric or string).
    type Key: Display + Clone + Send + Sync + Eq + Hash + 'static;

    /// Return the entity's ID.
    fn cache_key(&self) -> Self::Key;

    /// Return the prefix naming this entity kind.
    ///
    /// Final keys look like `"cache:{prefix}:{id}"` and `"lock:{prefix}:{id}"`.
    fn cache_prefix() -> &'static str;

    /// Serialize entity as a plain cache entry.
    ///
    /// # Format
    ///
    /// ```text
    /// [MAGIC: 4 bytes] [VERSION: 4 bytes] [POSTCARD PAYLOAD]
    /// ```
    fn serialize_for_cache(&self) -> Result<Vec<u8>> {
        crate::serialization::serialize_for_cache(self)
    }

    /// Deserialize entity from a plain cache entry.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidCacheEntry`: Bad magic or truncated envelope
    /// - `Error::VersionMismatch`: Schema version changed
    /// - `Error::DeserializationError`: Corrupted payload
    fn deserialize_from_cache(bytes: &[u8]) -> Result<Self> {
        crate::serialization::deserialize_from_cache(bytes)
    }

    /// Optional: Validate entity after it was loaded.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}
