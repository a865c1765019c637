use std::sync::Arc;
use std::time::Duration;

use crate::acquire::acquire;
use crate::error::LockError;
use crate::lock::DistributedLock;
use crate::options::AcquireOptions;

/// Run the distributed lock conformance test suite.
///
/// Call this from your backend's test module with a fresh lock instance.
/// Each check uses its own key, so a shared backend is fine as long as no
/// other test touches the `conformance-*` keys.
///
/// # Errors
///
/// Returns an error if the backend reports a failure.
pub async fn run_lock_conformance_tests(lock: &dyn DistributedLock) -> Result<(), LockError> {
    test_try_acquire_and_release(lock).await?;
    test_try_acquire_contention(lock).await?;
    test_renew(lock).await?;
    test_renew_after_release(lock).await?;
    test_release_after_takeover(lock).await?;
    test_tokens_are_unique(lock).await?;
    Ok(())
}

async fn test_try_acquire_and_release(lock: &dyn DistributedLock) -> Result<(), LockError> {
    let guard = lock
        .try_acquire("conformance-1", Duration::from_secs(10))
        .await?
        .expect("should acquire uncontested lock");
    assert_eq!(guard.key(), "conformance-1");
    assert!(guard.is_held().await?, "lock should be held");
    guard.release().await?;

    let again = lock
        .try_acquire("conformance-1", Duration::from_secs(10))
        .await?
        .expect("released lock should be free again");
    again.release().await?;
    Ok(())
}

async fn test_try_acquire_contention(lock: &dyn DistributedLock) -> Result<(), LockError> {
    let held = lock
        .try_acquire("conformance-2", Duration::from_secs(10))
        .await?
        .expect("should acquire lock");

    let second = lock
        .try_acquire("conformance-2", Duration::from_secs(10))
        .await?;
    assert!(
        second.is_none(),
        "second acquire should fail while lock is held"
    );

    held.release().await?;
    Ok(())
}

async fn test_renew(lock: &dyn DistributedLock) -> Result<(), LockError> {
    let guard = lock
        .try_acquire("conformance-3", Duration::from_secs(5))
        .await?
        .expect("should acquire lock");

    assert!(
        guard.renew(Duration::from_secs(10)).await?,
        "holder should be able to renew"
    );
    assert!(guard.is_held().await?, "lock should still be held after renew");

    guard.release().await?;
    Ok(())
}

async fn test_renew_after_release(lock: &dyn DistributedLock) -> Result<(), LockError> {
    let first = lock
        .try_acquire("conformance-4", Duration::from_secs(10))
        .await?
        .expect("should acquire lock");
    let token = first.token().to_owned();
    first.release().await?;

    let second = lock
        .try_acquire("conformance-4", Duration::from_secs(10))
        .await?
        .expect("should reacquire released lock");
    assert_ne!(second.token(), token, "a new acquisition gets a new token");
    assert!(second.renew(Duration::from_secs(10)).await?);
    second.release().await?;
    Ok(())
}

async fn test_release_after_takeover(lock: &dyn DistributedLock) -> Result<(), LockError> {
    let stale = lock
        .try_acquire("conformance-5", Duration::from_millis(50))
        .await?
        .expect("should acquire lock");

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(!stale.is_held().await?, "expired lock should not be held");
    assert!(
        !stale.renew(Duration::from_secs(10)).await?,
        "expired lock should not renew"
    );

    let current = lock
        .try_acquire("conformance-5", Duration::from_secs(10))
        .await?
        .expect("expired lock should be free");

    // Releasing a lock that now belongs to someone else is not an error and
    // must not free the new holder's key.
    stale.release().await?;
    assert!(current.is_held().await?, "new holder must keep the lock");

    current.release().await?;
    Ok(())
}

async fn test_tokens_are_unique(lock: &dyn DistributedLock) -> Result<(), LockError> {
    let a = lock
        .try_acquire("conformance-6a", Duration::from_secs(10))
        .await?
        .expect("should acquire lock");
    let b = lock
        .try_acquire("conformance-6b", Duration::from_secs(10))
        .await?
        .expect("independent keys do not contend");
    assert_ne!(a.token(), b.token());
    a.release().await?;
    b.release().await?;
    Ok(())
}

/// Run the managed lock lifecycle suite against a backend.
///
/// Uses real sleeps of a few hundred milliseconds, so it also works against
/// remote backends.
///
/// # Errors
///
/// Returns an error if the backend reports a failure.
pub async fn run_managed_lock_tests(lock: Arc<dyn DistributedLock>) -> Result<(), LockError> {
    test_managed_exclusion(&lock).await?;
    test_managed_refresh_outlives_timeout(&lock).await?;
    test_managed_expiry_is_detected(&lock).await?;
    Ok(())
}

async fn test_managed_exclusion(lock: &Arc<dyn DistributedLock>) -> Result<(), LockError> {
    let opts = AcquireOptions::new()
        .with_lock_timeout(Duration::from_secs(1))
        .with_refresh_interval(Duration::from_millis(10));

    let first = acquire(Arc::clone(lock), "managed-1", opts.clone())
        .await?
        .expect("should acquire lock");
    let second = acquire(Arc::clone(lock), "managed-1", opts.clone()).await?;
    assert!(second.is_none(), "held lock should not be obtained twice");

    first.release().await?;
    first.release().await?;

    let third = acquire(Arc::clone(lock), "managed-1", opts)
        .await?
        .expect("released lock should be free again");
    third.release().await?;
    Ok(())
}

async fn test_managed_refresh_outlives_timeout(
    lock: &Arc<dyn DistributedLock>,
) -> Result<(), LockError> {
    let opts = AcquireOptions::new()
        .with_lock_timeout(Duration::from_millis(200))
        .with_refresh_interval(Duration::from_millis(20));

    let held = acquire(Arc::clone(lock), "managed-2", opts.clone())
        .await?
        .expect("should acquire lock");

    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(held.status(), (true, None), "refreshed lock stays live");
    let rival = acquire(Arc::clone(lock), "managed-2", opts).await?;
    assert!(rival.is_none(), "refreshed lock must not expire");

    held.release().await?;
    assert_eq!(held.status(), (false, None));
    Ok(())
}

async fn test_managed_expiry_is_detected(lock: &Arc<dyn DistributedLock>) -> Result<(), LockError> {
    let short = AcquireOptions::new()
        .with_lock_timeout(Duration::from_millis(1))
        .with_refresh_interval(Duration::from_millis(10));

    let expiring = acquire(Arc::clone(lock), "managed-3", short)
        .await?
        .expect("should acquire lock");

    tokio::time::sleep(Duration::from_millis(5)).await;

    let successor = acquire(
        Arc::clone(lock),
        "managed-3",
        AcquireOptions::new().with_lock_timeout(Duration::from_secs(1)),
    )
    .await?
    .expect("expired lock should be free");

    expiring.abandoned().await;
    let (live, err) = expiring.status();
    assert!(!live);
    assert!(err.is_some_and(|e| e.is_lost()), "expiry surfaces as lost lock");

    successor.release().await?;
    Ok(())
}
