//! Error types for cache operations.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by cache operations.
///
/// "Not found" is never an error: strategies resolve to `Ok(None)` when the
/// entity is confirmed absent. Lock contention is retried internally and never
/// shows up here either.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The cache store could not be reached or rejected the command.
    #[error("cache store unavailable: {0}")]
    StoreUnavailable(String),

    /// The backing repository failed.
    #[error("repository error: {0}")]
    RepositoryError(String),

    /// Entity could not be encoded for caching.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Cached payload could not be decoded.
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// Cached bytes do not carry a valid envelope.
    #[error("invalid cache entry: {0}")]
    InvalidCacheEntry(String),

    /// Cached envelope was written by a different schema version.
    #[error("cache schema version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    /// Mutex strategy gave up waiting for the rebuild lock.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Feeder or entity validation failed.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// The rebuild queue refused a task.
    #[error("rebuild rejected: {0}")]
    RebuildRejected(String),
}

impl Error {
    /// True for transport failures of either store.
    ///
    /// These are the only failures worth retrying from the outside.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Error::StoreUnavailable(_) | Error::RepositoryError(_))
    }

    /// True when a cached payload could not be decoded.
    pub fn is_decode_failure(&self) -> bool {
        matches!(
            self,
            Error::DeserializationError(_)
                | Error::InvalidCacheEntry(_)
                | Error::VersionMismatch { .. }
        )
    }
}
