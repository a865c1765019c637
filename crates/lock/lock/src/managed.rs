//! Self-refreshing lock handles.
//!
//! A [`ManagedLock`] owns exactly one acquired lock instance and one
//! background refresh task. The task renews the lock every refresh interval
//! until it is told to stop, at which point it releases the lock, or until a
//! renewal fails, at which point the lock is considered lost.
//!
//! Renewal and release both run inside that single task, so at most one
//! backend operation per handle is in flight at any time. The caller-facing
//! [`ManagedLock::release`] only signals the task and waits for its outcome.
//!
//! ```text
//!            renew refused / renew error
//!   Live ─────────────────────────────────► Lost
//!     │
//!     │ release()
//!     └───────────────────────────────────► Released (Ok or release error)
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::LockError;
use crate::lock::LockGuard;
use crate::options::duration_ms;

/// Terminal outcome published by the refresh task. `None` while running.
type Outcome = Option<Result<(), LockError>>;

/// A lock that is kept alive by a background refresh task.
///
/// Obtain one through [`acquire`](crate::acquire). The handle is not
/// reentrant and refers to a single acquisition; once it has left the live
/// state it never becomes live again.
///
/// Dropping a live handle stops the refresh task, which then releases the
/// lock in the background. Call [`release`](Self::release) to wait for the
/// release and observe its result.
#[derive(Debug)]
pub struct ManagedLock {
    key: String,
    token: String,
    refresh_interval: Duration,
    /// Cancelled as soon as the handle leaves the live state, for any reason.
    abandoned: CancellationToken,
    outcome: watch::Receiver<Outcome>,
}

impl ManagedLock {
    /// Wrap a freshly acquired guard and start its refresh task.
    ///
    /// Must be called from within a Tokio runtime.
    pub(crate) fn start(
        guard: Box<dyn LockGuard>,
        lock_timeout: Duration,
        refresh_interval: Duration,
    ) -> Self {
        let key = guard.key().to_owned();
        let token = guard.token().to_owned();
        let abandoned = CancellationToken::new();
        let (outcome_tx, outcome_rx) = watch::channel(None);

        let keeper = Keeper {
            guard,
            lock_timeout,
            refresh_interval,
            stop: abandoned.clone(),
            outcome: outcome_tx,
        };
        tokio::spawn(keeper.run());

        Self {
            key,
            token,
            refresh_interval,
            abandoned,
            outcome: outcome_rx,
        }
    }

    /// The lock key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The owner token proving this handle's ownership.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// The period of the refresh loop.
    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Report whether the lock is still live.
    ///
    /// Returns `(true, None)` while live. Once the handle has been abandoned
    /// it returns `false` together with the recorded terminal error, which is
    /// `None` for a clean release or a release that is still in progress.
    pub fn status(&self) -> (bool, Option<LockError>) {
        match self.recorded() {
            Some(Ok(())) => (false, None),
            Some(Err(e)) => (false, Some(e)),
            None if self.abandoned.is_cancelled() => (false, None),
            None => (true, None),
        }
    }

    /// Whether the handle has left the live state.
    pub fn is_abandoned(&self) -> bool {
        self.abandoned.is_cancelled()
    }

    /// Resolves once the handle has left the live state.
    ///
    /// Completion does not mean the lock was released successfully; check
    /// [`status`](Self::status) or the result of [`release`](Self::release)
    /// for that.
    pub fn abandoned(&self) -> impl Future<Output = ()> + Send + use<> {
        let token = self.abandoned.clone();
        async move { token.cancelled().await }
    }

    /// Release the lock and wait for the refresh task to finish.
    ///
    /// If the handle is still live, the refresh task is told to stop and
    /// performs the release. Otherwise nothing new is sent to the backend.
    /// Every call, from any number of callers, returns the same terminal
    /// result.
    pub async fn release(&self) -> Result<(), LockError> {
        if !self.abandoned.is_cancelled() {
            debug!(key = %self.key, "release requested");
            self.abandoned.cancel();
        }

        let mut outcome = self.outcome.clone();
        match outcome.wait_for(Option::is_some).await {
            Ok(recorded) => (*recorded).clone().unwrap_or(Ok(())),
            Err(_) => Err(self.aborted()),
        }
    }

    /// The published outcome, or an abort error if the task died silently.
    fn recorded(&self) -> Outcome {
        let current = self.outcome.borrow().clone();
        if current.is_none() && self.outcome.has_changed().is_err() {
            return Some(Err(self.aborted()));
        }
        current
    }

    fn aborted(&self) -> LockError {
        LockError::TaskAborted(format!(
            "refresh task for {} exited without an outcome",
            self.key
        ))
    }
}

impl Drop for ManagedLock {
    fn drop(&mut self) {
        if !self.abandoned.is_cancelled() {
            debug!(key = %self.key, "live lock dropped, releasing in background");
            self.abandoned.cancel();
        }
    }
}

/// What woke the refresh loop.
enum Wake {
    Stop,
    Refresh,
}

/// The background refresh task of one [`ManagedLock`].
struct Keeper {
    guard: Box<dyn LockGuard>,
    lock_timeout: Duration,
    refresh_interval: Duration,
    stop: CancellationToken,
    outcome: watch::Sender<Outcome>,
}

impl Keeper {
    async fn run(self) {
        // Fires the abandonment signal on every exit path, including panics.
        // Declared first so it drops last: the outcome is published, or the
        // sender closed, before abandonment becomes observable.
        let _abandon = self.stop.clone().drop_guard();

        let Self {
            guard,
            lock_timeout,
            refresh_interval,
            stop,
            outcome,
        } = self;
        let key = guard.key().to_owned();

        debug!(
            key = %key,
            interval_ms = duration_ms(refresh_interval),
            "refresh task started"
        );

        let result = loop {
            let wake = tokio::select! {
                biased;
                () = stop.cancelled() => Wake::Stop,
                () = tokio::time::sleep(refresh_interval) => Wake::Refresh,
            };

            match wake {
                Wake::Stop => break release(guard).await,
                Wake::Refresh => match guard.renew(lock_timeout).await {
                    Ok(true) => debug!(key = %key, "lock renewed"),
                    Ok(false) => {
                        warn!(key = %key, "lock renewal refused, lock lost");
                        break Err(LockError::LockLost(key.clone()));
                    }
                    Err(e) => {
                        warn!(key = %key, error = %e, "lock renewal failed, lock lost");
                        break Err(e);
                    }
                },
            }
        };

        outcome.send_replace(Some(result));
    }
}

async fn release(guard: Box<dyn LockGuard>) -> Result<(), LockError> {
    let key = guard.key().to_owned();
    match guard.release().await {
        Ok(()) => {
            info!(key = %key, "lock released");
            Ok(())
        }
        Err(e) => {
            error!(key = %key, error = %e, "lock release failed");
            Err(e)
        }
    }
}
