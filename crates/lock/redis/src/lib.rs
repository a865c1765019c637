//! Redis lock backend for autolock.
//!
//! Provides a Redis-backed implementation of the [`DistributedLock`] trait.
//! Locks are plain string keys set with `SET NX PX`; renewal and release are
//! Lua scripts that only act while the stored owner token still matches.
//!
//! # Lock Consistency
//!
//! | Deployment | Mutual Exclusion | Notes |
//! |------------|------------------|-------|
//! | Single instance | Strong | Full mutual exclusion guaranteed |
//! | Sentinel | Weak | Lock may be lost during failover |
//! | Cluster | Weak | Lock may be lost during failover |
//!
//! A lock lost during failover is reported by the managed lock like any
//! other refused renewal.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use autolock::{AcquireOptions, acquire};
//! use autolock_redis::{RedisConfig, RedisDistributedLock};
//!
//! let backend = Arc::new(RedisDistributedLock::new(&RedisConfig::new("redis://localhost:6379"))?);
//! let lock = acquire(backend, "reports:nightly", AcquireOptions::default()).await?;
//! ```
//!
//! [`DistributedLock`]: autolock::DistributedLock

mod config;
pub mod lock;
mod scripts;

pub use config::RedisConfig;
pub use lock::{RedisDistributedLock, RedisLockGuard};
