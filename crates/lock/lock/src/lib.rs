//! Self-refreshing distributed locks.
//!
//! [`acquire`] obtains a lock through a pluggable [`DistributedLock`] backend
//! and hands back a [`ManagedLock`] whose background task keeps renewing the
//! lock until it is released or lost. Callers learn about a lost lock through
//! [`ManagedLock::abandoned`] or [`ManagedLock::status`]; renewal failures are
//! never raised synchronously.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use autolock::{AcquireOptions, acquire};
//! use autolock_memory::MemoryDistributedLock;
//!
//! let backend = Arc::new(MemoryDistributedLock::new());
//! let opts = AcquireOptions::new().with_lock_timeout(Duration::from_secs(10));
//!
//! if let Some(lock) = acquire(backend, "reports:nightly", opts).await? {
//!     tokio::select! {
//!         () = run_job() => {}
//!         () = lock.abandoned() => eprintln!("lost the lock: {:?}", lock.status()),
//!     }
//!     lock.release().await?;
//! }
//! ```

pub mod acquire;
pub mod error;
pub mod lock;
pub mod managed;
pub mod options;
pub mod testing;

pub use acquire::{acquire, acquire_with};
pub use error::LockError;
pub use lock::{DistributedLock, LockGuard};
pub use managed::ManagedLock;
pub use options::{AcquireOptions, LockConfig};
