//! Per-key advisory lock built on the backend's atomic set-if-absent.

use crate::backend::CacheBackend;
use crate::error::Result;
use std::time::Duration;
use uuid::Uuid;

/// Proof of ownership returned by [`DistributedLock::try_acquire`].
///
/// The token is the value stored under the lock key; release only deletes
/// the key while it still holds this token.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a held lock must be released"]
pub struct LockToken {
    key: String,
    token: String,
}

impl LockToken {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

/// Mutual exclusion for a named resource across every process sharing the
/// backend.
///
/// The lock is advisory: nothing stops a caller from touching the resource
/// without holding it. The TTL bounds how long a crashed holder can block
/// others; a holder that outlives its TTL loses ownership silently and its
/// later release is a no-op.
#[derive(Clone)]
pub struct DistributedLock<B: CacheBackend> {
    backend: B,
}

impl<B: CacheBackend> DistributedLock<B> {
    pub fn new(backend: B) -> Self {
        DistributedLock { backend }
    }

    /// Try to take the lock without waiting.
    ///
    /// Returns `Some(token)` when the caller now owns `resource_key`.
    ///
    /// # Errors
    /// `Error::StoreUnavailable` when the backend cannot be reached.
    pub async fn try_acquire(&self, resource_key: &str, ttl: Duration) -> Result<Option<LockToken>> {
        let token = Uuid::now_v7().to_string();

        if self
            .backend
            .set_if_absent(resource_key, token.clone().into_bytes(), ttl)
            .await?
        {
            debug!("🔒 Acquired {} (TTL: {:?})", resource_key, ttl);
            Ok(Some(LockToken {
                key: resource_key.to_string(),
                token,
            }))
        } else {
            debug!("Lock {} is held by another owner", resource_key);
            Ok(None)
        }
    }

    /// Release a lock held through `token`.
    ///
    /// Returns `false` when the lock was no longer ours (expired, possibly
    /// re-acquired by someone else); the current owner's lock is left alone.
    pub async fn release(&self, token: LockToken) -> Result<bool> {
        let released = self
            .backend
            .delete_if_equals(&token.key, token.token.as_bytes())
            .await?;

        if released {
            debug!("🔓 Released {}", token.key);
        } else {
            warn!(
                "Lock {} expired before release; leaving the current owner's lock in place",
                token.key
            );
        }
        Ok(released)
    }

    /// Release and log failures instead of returning them.
    ///
    /// Used in cleanup paths where the outcome of the protected work has
    /// already been decided.
    pub(crate) async fn release_quietly(&self, token: LockToken) {
        let key = token.key.clone();
        if let Err(e) = self.release(token).await {
            warn!("Failed to release lock {}: {}", key, e);
        }
    }
}
