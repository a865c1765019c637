use std::time::Duration;

use async_trait::async_trait;

use crate::error::LockError;

/// Proof of ownership for one acquired lock instance.
///
/// The guard carries the owner token handed out by the backend. Every
/// operation is conditional on that token still matching the current holder.
#[async_trait]
pub trait LockGuard: Send + Sync {
    /// The lock key this guard was acquired for.
    fn key(&self) -> &str;

    /// The opaque owner token stored by the backend.
    fn token(&self) -> &str;

    /// Extend the lock's expiry to `ttl` from now.
    ///
    /// Returns `Ok(false)` when the token no longer matches the holder, either
    /// because the key expired or because another owner has claimed it.
    async fn renew(&self, ttl: Duration) -> Result<bool, LockError>;

    /// Delete the lock if it is still held by this token.
    ///
    /// Releasing a key that already expired or belongs to someone else is not
    /// an error.
    async fn release(self: Box<Self>) -> Result<(), LockError>;

    /// Check if the lock is still held by this guard.
    ///
    /// Diagnostic only: the refresh loop never calls it, relying on the
    /// result of [`renew`](Self::renew) instead. The default reports `false`;
    /// backends that can query the current owner should override it.
    async fn is_held(&self) -> Result<bool, LockError> {
        Ok(false)
    }
}

/// Atomic acquire-if-absent with expiry.
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Try once to acquire `key` with the given TTL.
    /// Returns `None` if the lock is already held by another owner.
    async fn try_acquire(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<Option<Box<dyn LockGuard>>, LockError>;
}
