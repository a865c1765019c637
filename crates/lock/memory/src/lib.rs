//! In-process lock backend for autolock.
//!
//! Useful for tests and single-node deployments. Expiry follows the Tokio
//! clock, so paused-time tests can drive it deterministically.

mod lock;

pub use lock::{MemoryDistributedLock, MemoryLockGuard};
