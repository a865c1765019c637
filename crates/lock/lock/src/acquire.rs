use std::sync::Arc;

use tracing::{debug, info};

use crate::error::LockError;
use crate::lock::DistributedLock;
use crate::managed::ManagedLock;
use crate::options::{AcquireOptions, duration_ms};

/// Acquire `key` and keep it alive until it is released.
///
/// Tries the backend up to `retry_count + 1` times, pausing `retry_delay`
/// between attempts. The call does not return before the retry window is
/// over or the lock is obtained.
///
/// Returns `Ok(None)` when every attempt found the lock held by someone else.
/// Backend failures are returned as errors and end the retry loop. On
/// success the returned [`ManagedLock`] already has its refresh task running.
pub async fn acquire(
    lock: Arc<dyn DistributedLock>,
    key: &str,
    options: AcquireOptions,
) -> Result<Option<ManagedLock>, LockError> {
    let options = options.normalized();
    let refresh_interval = options.effective_refresh_interval();
    let attempts = options.retry_count.saturating_add(1);

    for attempt in 1..=attempts {
        debug!(key, attempt, attempts, "attempting to acquire lock");

        if let Some(guard) = lock.try_acquire(key, options.lock_timeout).await? {
            info!(
                key,
                attempt,
                lock_timeout_ms = duration_ms(options.lock_timeout),
                interval_ms = duration_ms(refresh_interval),
                "lock acquired"
            );
            return Ok(Some(ManagedLock::start(
                guard,
                options.lock_timeout,
                refresh_interval,
            )));
        }

        if attempt < attempts {
            tokio::time::sleep(options.retry_delay).await;
        }
    }

    debug!(key, attempts, "lock not obtained");
    Ok(None)
}

/// Like [`acquire`], for callers holding a concrete backend.
pub async fn acquire_with<L>(
    lock: L,
    key: &str,
    options: AcquireOptions,
) -> Result<Option<ManagedLock>, LockError>
where
    L: DistributedLock + 'static,
{
    acquire(Arc::new(lock), key, options).await
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::time::Instant;

    use super::*;
    use crate::lock::LockGuard;

    /// Backend that answers acquisition attempts from a fixed script.
    struct ScriptedBackend {
        answers: Mutex<Vec<Result<bool, LockError>>>,
        attempts: AtomicUsize,
        attempt_times: Mutex<Vec<Instant>>,
    }

    impl ScriptedBackend {
        fn new(mut answers: Vec<Result<bool, LockError>>) -> Arc<Self> {
            answers.reverse();
            Arc::new(Self {
                answers: Mutex::new(answers),
                attempts: AtomicUsize::new(0),
                attempt_times: Mutex::new(Vec::new()),
            })
        }
    }

    struct NoopGuard;

    #[async_trait]
    impl LockGuard for NoopGuard {
        fn key(&self) -> &str {
            "k"
        }

        fn token(&self) -> &str {
            "t"
        }

        async fn renew(&self, _ttl: Duration) -> Result<bool, LockError> {
            Ok(true)
        }

        async fn release(self: Box<Self>) -> Result<(), LockError> {
            Ok(())
        }

        async fn is_held(&self) -> Result<bool, LockError> {
            Ok(true)
        }
    }

    #[async_trait]
    impl DistributedLock for ScriptedBackend {
        async fn try_acquire(
            &self,
            _key: &str,
            _ttl: Duration,
        ) -> Result<Option<Box<dyn LockGuard>>, LockError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            self.attempt_times.lock().unwrap().push(Instant::now());
            match self.answers.lock().unwrap().pop().unwrap_or(Ok(false)) {
                Ok(true) => Ok(Some(Box::new(NoopGuard))),
                Ok(false) => Ok(None),
                Err(e) => Err(e),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn single_attempt_by_default() {
        let backend = ScriptedBackend::new(vec![Ok(false), Ok(true)]);
        let result = acquire(backend.clone(), "k", AcquireOptions::default())
            .await
            .unwrap();

        assert!(result.is_none(), "contended lock should not be obtained");
        assert_eq!(backend.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_with_fixed_delay() {
        let backend = ScriptedBackend::new(vec![Ok(false), Ok(false), Ok(true)]);
        let opts = AcquireOptions::new()
            .with_retry_count(3)
            .with_retry_delay(Duration::from_millis(40));

        let lock = acquire(backend.clone(), "k", opts)
            .await
            .unwrap()
            .expect("third attempt should succeed");

        assert_eq!(backend.attempts.load(Ordering::SeqCst), 3);
        let times = backend.attempt_times.lock().unwrap().clone();
        assert_eq!(times[1] - times[0], Duration::from_millis(40));
        assert_eq!(times[2] - times[1], Duration::from_millis(40));
        assert_eq!(lock.status(), (true, None));
        lock.release().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_return_none_without_trailing_sleep() {
        let backend = ScriptedBackend::new(vec![]);
        let opts = AcquireOptions::new()
            .with_retry_count(2)
            .with_retry_delay(Duration::from_millis(100));

        let start = Instant::now();
        let result = acquire(backend.clone(), "k", opts).await.unwrap();

        assert!(result.is_none());
        assert_eq!(backend.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn backend_error_stops_retrying() {
        let backend = ScriptedBackend::new(vec![
            Ok(false),
            Err(LockError::Connection("refused".into())),
            Ok(true),
        ]);
        let opts = AcquireOptions::new().with_retry_count(5);

        let result = acquire(backend.clone(), "k", opts).await;

        assert_eq!(result.err(), Some(LockError::Connection("refused".into())));
        assert_eq!(backend.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn acquired_lock_uses_resolved_refresh_interval() {
        let backend = ScriptedBackend::new(vec![Ok(true)]);
        let opts = AcquireOptions::new().with_lock_timeout(Duration::from_secs(2));

        let lock = acquire(backend, "k", opts).await.unwrap().unwrap();

        assert_eq!(lock.refresh_interval(), Duration::from_secs(1));
        lock.release().await.unwrap();
    }
}
