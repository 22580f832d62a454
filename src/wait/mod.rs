//! Bounded polling until a resource settles.
//!
//! Most Scaleway operations return before the resource reaches a terminal
//! state. Every mutating call is therefore followed by a wait before the
//! next call is issued, so dependent operations always observe a settled
//! resource. Waiters poll on a fixed interval, are bounded by the operation
//! deadline, and respond to cancellation between polls.

use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::sleep;

use crate::api::ApiError;

/// Default interval between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Deadline and cancellation signal supplied by the engine for one
/// controller invocation.
#[derive(Clone, Debug)]
pub struct OperationContext {
    deadline: Instant,
    cancel: Option<watch::Receiver<bool>>,
}

impl OperationContext {
    /// Builds a context expiring after `timeout`.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            cancel: None,
        }
    }

    /// Builds a context expiring at `deadline`.
    #[must_use]
    pub const fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline,
            cancel: None,
        }
    }

    /// Builds a cancellable context; sending `true` on the returned channel
    /// cancels the operation.
    #[must_use]
    pub fn cancellable(timeout: Duration) -> (Self, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let ctx = Self {
            deadline: Instant::now() + timeout,
            cancel: Some(rx),
        };
        (ctx, tx)
    }

    /// Returns the absolute deadline for this operation.
    #[must_use]
    pub const fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Returns true when the deadline has passed.
    #[must_use]
    pub fn expired(&self) -> bool {
        Instant::now() > self.deadline
    }

    /// Returns true when the engine has cancelled the operation.
    #[must_use]
    pub fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Sleeps for `interval` or until cancellation, whichever comes first.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::Canceled`] when the cancel signal fires during
    /// the sleep.
    pub async fn pause(&self, interval: Duration) -> Result<(), WaitError> {
        if self.cancelled() {
            return Err(WaitError::Canceled);
        }
        let Some(rx) = &self.cancel else {
            sleep(interval).await;
            return Ok(());
        };
        let mut rx = rx.clone();
        tokio::select! {
            () = sleep(interval) => Ok(()),
            changed = rx.changed() => {
                if changed.is_ok() && *rx.borrow() {
                    Err(WaitError::Canceled)
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// What one poll observed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Observation<T> {
    /// The resource exists and reported a snapshot.
    Present(T),
    /// The status endpoint returned 404, or 403 on the endpoints that encode
    /// deletion as a permission error.
    Gone,
}

/// Snapshot types that expose a status string the waiter can match on.
pub trait HasStatus {
    /// Returns the current status as reported by the API.
    fn status(&self) -> &str;
}

/// Errors raised while waiting for convergence.
#[derive(Debug, Error)]
pub enum WaitError {
    /// Raised when the deadline expired before a target state was observed.
    #[error("timed out waiting for convergence; last observed status: {last}")]
    Timeout {
        /// Status reported by the final poll, or `unknown` when no poll
        /// completed.
        last: String,
    },
    /// Raised when the resource settled in a non-target terminal state.
    #[error("resource reached terminal state {state}")]
    Terminal {
        /// The terminal state observed.
        state: String,
    },
    /// Raised when the resource disappeared while waiting for a non-delete
    /// target.
    #[error("resource vanished while waiting for convergence")]
    Vanished,
    /// Raised when the engine cancelled the operation.
    #[error("operation canceled")]
    Canceled,
    /// Raised when a status poll failed outright.
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Polls `fetch` until the observed status is in `target`.
///
/// `failure` lists terminal states that can never progress to a target (for
/// example `error` or `locked`); observing one aborts the wait immediately.
///
/// # Errors
///
/// Returns [`WaitError::Timeout`] when the context deadline expires,
/// [`WaitError::Terminal`] on a failure state, [`WaitError::Vanished`] when
/// the resource disappears, [`WaitError::Canceled`] on cancellation, and
/// [`WaitError::Api`] when a poll fails.
pub async fn wait_for_status<T, F, Fut>(
    ctx: &OperationContext,
    interval: Duration,
    target: &[&str],
    failure: &[&str],
    mut fetch: F,
) -> Result<T, WaitError>
where
    T: HasStatus,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Observation<T>, ApiError>>,
{
    let mut last = String::from("unknown");
    loop {
        if ctx.cancelled() {
            return Err(WaitError::Canceled);
        }
        if ctx.expired() {
            return Err(WaitError::Timeout { last });
        }
        match fetch().await? {
            Observation::Gone => return Err(WaitError::Vanished),
            Observation::Present(snapshot) => {
                let status = snapshot.status();
                if target.contains(&status) {
                    return Ok(snapshot);
                }
                if failure.contains(&status) {
                    return Err(WaitError::Terminal {
                        state: status.to_owned(),
                    });
                }
                last = status.to_owned();
            }
        }
        ctx.pause(interval).await?;
    }
}

/// Polls `fetch` until the resource is gone.
///
/// Used after a delete: 404 and 403 both count as success because some
/// endpoints report deleted resources as forbidden.
///
/// # Errors
///
/// Returns [`WaitError::Timeout`] when the deadline expires while the
/// resource is still visible, [`WaitError::Canceled`] on cancellation, and
/// [`WaitError::Api`] when a poll fails.
pub async fn wait_for_gone<T, F, Fut>(
    ctx: &OperationContext,
    interval: Duration,
    mut fetch: F,
) -> Result<(), WaitError>
where
    T: HasStatus,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Observation<T>, ApiError>>,
{
    let mut last = String::from("unknown");
    loop {
        if ctx.cancelled() {
            return Err(WaitError::Canceled);
        }
        if ctx.expired() {
            return Err(WaitError::Timeout { last });
        }
        match fetch().await? {
            Observation::Gone => return Ok(()),
            Observation::Present(snapshot) => last = snapshot.status().to_owned(),
        }
        ctx.pause(interval).await?;
    }
}

#[cfg(test)]
mod tests;
