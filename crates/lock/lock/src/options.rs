//! Acquisition, refresh and retry settings.
//!
//! [`AcquireOptions`] is the runtime form handed to [`acquire`](crate::acquire).
//! [`LockConfig`] is its deserializable counterpart for embedding in TOML
//! configuration files, with every duration expressed in milliseconds.

use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

/// Default time after which an unrefreshed lock expires.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Default pause between acquisition attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Options used to acquire, refresh and release a lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquireOptions {
    /// How long the backend holds the lock before it expires on its own
    /// (default: 5 seconds).
    pub lock_timeout: Duration,
    /// Number of additional acquisition attempts (default: 0).
    pub retry_count: u32,
    /// Pause between acquisition attempts (default: 100 milliseconds).
    pub retry_delay: Duration,
    /// Period of the refresh loop (default: half of `lock_timeout`).
    ///
    /// Must be considerably smaller than `lock_timeout`, otherwise the lock
    /// expires between two refreshes and is reported as lost.
    pub refresh_interval: Option<Duration>,
}

impl Default for AcquireOptions {
    fn default() -> Self {
        Self {
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            retry_count: 0,
            retry_delay: DEFAULT_RETRY_DELAY,
            refresh_interval: None,
        }
    }
}

impl AcquireOptions {
    /// Create options with all defaults.
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    #[must_use]
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    #[must_use]
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    #[must_use]
    pub fn with_refresh_interval(mut self, refresh_interval: Duration) -> Self {
        self.refresh_interval = Some(refresh_interval);
        self
    }

    /// Replace zero durations with their defaults and resolve the refresh
    /// interval.
    ///
    /// A refresh interval that is not shorter than the lock timeout is kept
    /// as configured but logged, since it guarantees the lock will be lost.
    #[must_use]
    pub fn normalized(self) -> Self {
        let lock_timeout = if self.lock_timeout.is_zero() {
            DEFAULT_LOCK_TIMEOUT
        } else {
            self.lock_timeout
        };

        let retry_delay = if self.retry_delay.is_zero() {
            DEFAULT_RETRY_DELAY
        } else {
            self.retry_delay
        };

        let refresh_interval = resolve_refresh_interval(self.refresh_interval, lock_timeout);

        if refresh_interval >= lock_timeout {
            warn!(
                refresh_interval_ms = duration_ms(refresh_interval),
                lock_timeout_ms = duration_ms(lock_timeout),
                "refresh interval is not shorter than the lock timeout; the lock will expire between refreshes"
            );
        }

        Self {
            lock_timeout,
            retry_count: self.retry_count,
            retry_delay,
            refresh_interval: Some(refresh_interval),
        }
    }

    /// The configured refresh interval, or half the lock timeout when unset
    /// or zero. On normalized options this is the stored interval.
    pub fn effective_refresh_interval(&self) -> Duration {
        resolve_refresh_interval(self.refresh_interval, self.lock_timeout)
    }
}

fn resolve_refresh_interval(refresh_interval: Option<Duration>, lock_timeout: Duration) -> Duration {
    match refresh_interval {
        Some(interval) if !interval.is_zero() => interval,
        _ => lock_timeout / 2,
    }
}

/// Deserializable lock settings.
///
/// Omitted or zero values fall back to the same defaults as
/// [`AcquireOptions`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LockConfig {
    /// Lock expiry (milliseconds).
    #[serde(default)]
    pub lock_timeout_ms: u64,
    /// Additional acquisition attempts.
    #[serde(default)]
    pub retry_count: u32,
    /// Pause between acquisition attempts (milliseconds).
    #[serde(default)]
    pub retry_delay_ms: u64,
    /// Period of the refresh loop (milliseconds).
    #[serde(default)]
    pub refresh_interval_ms: Option<u64>,
}

impl From<&LockConfig> for AcquireOptions {
    fn from(config: &LockConfig) -> Self {
        Self {
            lock_timeout: Duration::from_millis(config.lock_timeout_ms),
            retry_count: config.retry_count,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            refresh_interval: config.refresh_interval_ms.map(Duration::from_millis),
        }
        .normalized()
    }
}

pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let opts = AcquireOptions::default();
        assert_eq!(opts.lock_timeout, Duration::from_secs(5));
        assert_eq!(opts.retry_count, 0);
        assert_eq!(opts.retry_delay, Duration::from_millis(100));
        assert_eq!(opts.refresh_interval, None);
        assert_eq!(
            opts.effective_refresh_interval(),
            Duration::from_millis(2500)
        );
    }

    #[test]
    fn normalized_fills_zero_values() {
        let opts = AcquireOptions::new()
            .with_lock_timeout(Duration::ZERO)
            .with_retry_delay(Duration::ZERO)
            .with_refresh_interval(Duration::ZERO)
            .normalized();

        assert_eq!(opts.lock_timeout, DEFAULT_LOCK_TIMEOUT);
        assert_eq!(opts.retry_delay, DEFAULT_RETRY_DELAY);
        assert_eq!(opts.refresh_interval, Some(Duration::from_millis(2500)));
    }

    #[test]
    fn refresh_interval_follows_lock_timeout() {
        let opts = AcquireOptions::new()
            .with_lock_timeout(Duration::from_secs(1))
            .normalized();
        assert_eq!(opts.refresh_interval, Some(Duration::from_millis(500)));
    }

    #[test]
    fn oversized_refresh_interval_is_kept() {
        let opts = AcquireOptions::new()
            .with_lock_timeout(Duration::from_millis(1))
            .with_refresh_interval(Duration::from_millis(10))
            .normalized();
        assert_eq!(opts.lock_timeout, Duration::from_millis(1));
        assert_eq!(opts.refresh_interval, Some(Duration::from_millis(10)));
    }

    #[test]
    fn normalized_interval_is_resolved_once() {
        let opts = AcquireOptions::new()
            .with_lock_timeout(Duration::from_secs(3))
            .normalized();
        assert_eq!(opts.refresh_interval, Some(Duration::from_millis(1500)));
        assert_eq!(opts.effective_refresh_interval(), Duration::from_millis(1500));
        assert_eq!(opts.clone().normalized(), opts);
    }

    #[test]
    fn config_defaults() {
        let config: LockConfig = toml::from_str("").unwrap();
        let opts = AcquireOptions::from(&config);
        assert_eq!(opts, AcquireOptions::default().normalized());
    }

    #[test]
    fn config_custom_values() {
        let toml = r"
            lock_timeout_ms = 1000
            retry_count = 3
            retry_delay_ms = 20
            refresh_interval_ms = 10
        ";
        let config: LockConfig = toml::from_str(toml).unwrap();
        let opts = AcquireOptions::from(&config);
        assert_eq!(opts.lock_timeout, Duration::from_secs(1));
        assert_eq!(opts.retry_count, 3);
        assert_eq!(opts.retry_delay, Duration::from_millis(20));
        assert_eq!(opts.refresh_interval, Some(Duration::from_millis(10)));
    }
}
