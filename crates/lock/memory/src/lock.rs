use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;
use uuid::Uuid;

use autolock::error::LockError;
use autolock::lock::{DistributedLock, LockGuard};

/// Internal entry representing a held lock.
#[derive(Debug, Clone)]
struct LockEntry {
    owner: String,
    expires_at: Instant,
}

/// Deadline used when `now + ttl` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

fn expiry_after(ttl: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(ttl).unwrap_or_else(|| now + FAR_FUTURE)
}

impl LockEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-memory [`DistributedLock`] backed by a [`DashMap`].
///
/// Lock expiry is lazy: expired entries are evicted on the next acquire
/// attempt for the same key. Clones share the same lock table.
#[derive(Debug, Clone, Default)]
pub struct MemoryDistributedLock {
    locks: Arc<DashMap<String, LockEntry>>,
}

impl MemoryDistributedLock {
    /// Create a new, empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently present and unexpired.
    pub fn held_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .locks
            .iter()
            .filter(|entry| !entry.value().is_expired())
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl DistributedLock for MemoryDistributedLock {
    async fn try_acquire(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<Option<Box<dyn LockGuard>>, LockError> {
        let key = key.to_owned();

        // Remove expired entries lazily.
        self.locks.remove_if(&key, |_, entry| entry.is_expired());

        let owner = Uuid::new_v4().to_string();
        match self.locks.entry(key.clone()) {
            Entry::Occupied(_) => Ok(None),
            Entry::Vacant(vacant) => {
                vacant.insert(LockEntry {
                    owner: owner.clone(),
                    expires_at: expiry_after(ttl),
                });
                Ok(Some(Box::new(MemoryLockGuard {
                    locks: Arc::clone(&self.locks),
                    key,
                    owner,
                })))
            }
        }
    }
}

/// Guard for a lock acquired via [`MemoryDistributedLock`].
///
/// Holds an `Arc` reference to the backing map so the lock can be renewed
/// or released without going through the parent [`MemoryDistributedLock`].
#[derive(Debug)]
pub struct MemoryLockGuard {
    locks: Arc<DashMap<String, LockEntry>>,
    key: String,
    owner: String,
}

#[async_trait]
impl LockGuard for MemoryLockGuard {
    fn key(&self) -> &str {
        &self.key
    }

    fn token(&self) -> &str {
        &self.owner
    }

    async fn renew(&self, ttl: Duration) -> Result<bool, LockError> {
        let Some(mut entry) = self.locks.get_mut(&self.key) else {
            return Ok(false);
        };

        if entry.owner != self.owner || entry.is_expired() {
            return Ok(false);
        }

        entry.expires_at = expiry_after(ttl);
        Ok(true)
    }

    async fn release(self: Box<Self>) -> Result<(), LockError> {
        // Only remove if we are still the owner.
        self.locks
            .remove_if(&self.key, |_, entry| entry.owner == self.owner);
        Ok(())
    }

    async fn is_held(&self) -> Result<bool, LockError> {
        match self.locks.get(&self.key) {
            Some(entry) => Ok(entry.owner == self.owner && !entry.is_expired()),
            None => Ok(false),
        }
    }
}
