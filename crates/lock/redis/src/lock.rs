//! Redis-backed lock primitive.
//!
//! Locks are acquired using the Redis `SET key value NX PX milliseconds`
//! pattern:
//!
//! - **NX** (Not eXists): the key is only set if it doesn't already exist.
//! - **PX** (expiration): the key expires after the TTL, so a crashed holder
//!   cannot block the lock forever.
//! - **Owner token**: a UUID stored as the value; only the holder of the token
//!   can renew or release the lock.
//!
//! All three operations are Lua scripts so each is atomic on the Redis side.
//! Keys are namespaced as `{prefix}:lock:{key}`.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::{AsyncCommands, Script};
use tracing::debug;

use autolock::error::LockError;
use autolock::lock::{DistributedLock, LockGuard};

use crate::config::RedisConfig;
use crate::scripts;

/// Redis-backed implementation of [`DistributedLock`].
///
/// The connection pool is shared by every guard handed out, so one instance
/// can serve any number of keys.
pub struct RedisDistributedLock {
    pool: Pool,
    prefix: String,
}

impl RedisDistributedLock {
    /// Create a new `RedisDistributedLock` from the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Connection`] if the pool cannot be created.
    pub fn new(config: &RedisConfig) -> Result<Self, LockError> {
        let cfg = Config::from_url(&config.url);
        let pool = cfg
            .builder()
            .map(|b| {
                b.max_size(config.pool_size)
                    .wait_timeout(Some(config.connection_timeout))
                    .runtime(Runtime::Tokio1)
                    .build()
            })
            .map_err(|e| LockError::Connection(e.to_string()))?
            .map_err(|e| LockError::Connection(e.to_string()))?;

        Ok(Self {
            pool,
            prefix: config.prefix.clone(),
        })
    }

    /// Build the full Redis key for a lock.
    fn lock_key(&self, key: &str) -> String {
        lock_key(&self.prefix, key)
    }
}

fn lock_key(prefix: &str, key: &str) -> String {
    format!("{prefix}:lock:{key}")
}

fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX).max(1)
}

/// Obtain a connection from the pool.
async fn conn(pool: &Pool) -> Result<deadpool_redis::Connection, LockError> {
    pool.get()
        .await
        .map_err(|e| LockError::Connection(e.to_string()))
}

#[async_trait]
impl DistributedLock for RedisDistributedLock {
    async fn try_acquire(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<Option<Box<dyn LockGuard>>, LockError> {
        let redis_key = self.lock_key(key);
        let owner = uuid::Uuid::new_v4().to_string();

        let mut conn = conn(&self.pool).await?;
        let result: i64 = Script::new(scripts::LOCK_ACQUIRE)
            .key(&redis_key)
            .arg(&owner)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| LockError::Backend(e.to_string()))?;

        if result == 1 {
            Ok(Some(Box::new(RedisLockGuard {
                pool: self.pool.clone(),
                key: key.to_owned(),
                redis_key,
                owner,
            })))
        } else {
            Ok(None)
        }
    }
}

/// A lock held in Redis.
///
/// Dropping the guard without calling [`release`](LockGuard::release) is
/// safe; the key expires after its TTL.
pub struct RedisLockGuard {
    pool: Pool,
    key: String,
    redis_key: String,
    owner: String,
}

#[async_trait]
impl LockGuard for RedisLockGuard {
    fn key(&self) -> &str {
        &self.key
    }

    fn token(&self) -> &str {
        &self.owner
    }

    async fn renew(&self, ttl: Duration) -> Result<bool, LockError> {
        let mut conn = conn(&self.pool).await?;
        let result: i64 = Script::new(scripts::LOCK_RENEW)
            .key(&self.redis_key)
            .arg(&self.owner)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| LockError::Backend(e.to_string()))?;

        Ok(result == 1)
    }

    async fn release(self: Box<Self>) -> Result<(), LockError> {
        let mut conn = conn(&self.pool).await?;
        let result: i64 = Script::new(scripts::LOCK_RELEASE)
            .key(&self.redis_key)
            .arg(&self.owner)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| LockError::Backend(e.to_string()))?;

        if result != 1 {
            debug!(key = %self.redis_key, "lock was no longer held by this owner at release time");
        }
        Ok(())
    }

    async fn is_held(&self) -> Result<bool, LockError> {
        let mut conn = conn(&self.pool).await?;
        let current_owner: Option<String> = conn
            .get(&self.redis_key)
            .await
            .map_err(|e| LockError::Backend(e.to_string()))?;

        Ok(current_owner.as_deref() == Some(self.owner.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_key_is_namespaced() {
        assert_eq!(lock_key("autolock", "jobs:nightly"), "autolock:lock:jobs:nightly");
    }

    #[test]
    fn ttl_is_at_least_one_millisecond() {
        assert_eq!(ttl_millis(Duration::from_micros(10)), 1);
        assert_eq!(ttl_millis(Duration::from_secs(5)), 5000);
    }

    #[tokio::test]
    async fn pool_creation_is_lazy() {
        // No server is contacted until the first command.
        let lock = RedisDistributedLock::new(&RedisConfig::new("redis://127.0.0.1:1"));
        assert!(lock.is_ok());
    }

    #[tokio::test]
    async fn unreachable_server_is_a_connection_error() {
        let config = RedisConfig {
            connection_timeout: Duration::from_millis(200),
            ..RedisConfig::new("redis://127.0.0.1:1")
        };
        let lock = RedisDistributedLock::new(&config).unwrap();

        let result = lock.try_acquire("k", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(LockError::Connection(_))));
    }
}
