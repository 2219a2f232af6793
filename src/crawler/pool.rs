//! Bounded worker pool
//!
//! Runs units of work on tokio tasks with at most `N` running at once.
//! `submit` waits for a free slot, giving the control loop back-pressure.
//! With `N == 1` work runs inline in the caller, which keeps single-worker
//! crawls deterministic.

use crate::policy::panic_message;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;

/// Smallest and largest supported concurrency
pub const MIN_CONCURRENCY: usize = 1;
pub const MAX_CONCURRENCY: usize = 100;

/// Worker pool errors
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Worker pool concurrency must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}, got {0}")]
    InvalidConcurrency(usize),

    #[error("Worker pool has been aborted")]
    Aborted,

    #[error("Worker pool is closed")]
    Closed,
}

/// Outcome of a unit of work that did not complete
#[derive(Debug, Error)]
pub enum WorkError {
    /// Stopped at a cancellation point
    #[error("work cancelled")]
    Cancelled,

    #[error("{0}")]
    Failed(String),
}

/// Bounded concurrent executor
pub struct WorkerPool {
    max: usize,
    permits: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
    aborted: AtomicBool,
    closed: AtomicBool,
    cancel: CancellationToken,
    progress: Arc<Notify>,
}

impl WorkerPool {
    /// Creates a pool
    ///
    /// # Arguments
    ///
    /// * `max` - Maximum number of concurrently running units (1..=100)
    /// * `parent` - Cancelling this token cancels all work in the pool
    ///
    /// # Returns
    ///
    /// * `Ok(WorkerPool)` - The pool
    /// * `Err(PoolError::InvalidConcurrency)` - `max` is out of range
    pub fn new(max: usize, parent: &CancellationToken) -> Result<Self, PoolError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&max) {
            return Err(PoolError::InvalidConcurrency(max));
        }

        Ok(Self {
            max,
            permits: Arc::new(Semaphore::new(max)),
            active: Arc::new(AtomicUsize::new(0)),
            aborted: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            cancel: parent.child_token(),
            progress: Arc::new(Notify::new()),
        })
    }

    /// Returns the concurrency ceiling
    pub fn max_concurrency(&self) -> usize {
        self.max
    }

    /// Runs `work` once a slot is free
    ///
    /// `work` receives the pool's cancellation token and should stop at its
    /// next cancellation point once it fires. Failures and panics inside the
    /// work are logged and never reach the caller.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The work was dispatched (or, with one slot, has run)
    /// * `Err(PoolError)` - The pool was aborted or closed before a slot was free
    pub async fn submit<F, Fut>(&self, work: F) -> Result<(), PoolError>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), WorkError>> + Send + 'static,
    {
        self.check_open()?;

        let permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(PoolError::Aborted),
            permit = self.permits.clone().acquire_owned() => {
                permit.map_err(|_| PoolError::Aborted)?
            }
        };
        self.check_open()?;

        self.active.fetch_add(1, Ordering::SeqCst);
        let active = self.active.clone();
        let progress = self.progress.clone();
        let token = self.cancel.clone();

        let unit = async move {
            let outcome = AssertUnwindSafe(work(token)).catch_unwind().await;
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(WorkError::Cancelled)) => {
                    tracing::debug!("Worker cancelled");
                }
                Ok(Err(WorkError::Failed(message))) => {
                    tracing::error!("Worker failed: {}", message);
                }
                Err(panic) => {
                    tracing::error!("Worker panicked: {}", panic_message(panic.as_ref()));
                }
            }
            drop(permit);
            active.fetch_sub(1, Ordering::SeqCst);
            progress.notify_one();
        };

        if self.max == 1 {
            unit.await;
        } else {
            tokio::spawn(unit);
        }
        Ok(())
    }

    fn check_open(&self) -> Result<(), PoolError> {
        if self.aborted.load(Ordering::SeqCst) {
            return Err(PoolError::Aborted);
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(PoolError::Closed);
        }
        Ok(())
    }

    /// Returns true if any unit of work is running
    pub fn has_active_work(&self) -> bool {
        self.active.load(Ordering::SeqCst) > 0
    }

    /// Returns the number of running units
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Waits until a unit finishes, the pool is cancelled, or `max` elapses
    ///
    /// Once the pool has been cancelled only unit completion or `max` end the
    /// wait, so callers polling an aborted pool still yield to its workers.
    pub async fn wait_for_progress(&self, max: Duration) {
        let cancelled = self.cancel.is_cancelled();
        tokio::select! {
            _ = self.progress.notified() => {}
            _ = self.cancel.cancelled(), if !cancelled => {}
            _ = tokio::time::sleep(max) => {}
        }
    }

    /// Returns a handle that wakes [`WorkerPool::wait_for_progress`]
    pub fn waker(&self) -> Arc<Notify> {
        self.progress.clone()
    }

    /// Rejects further work and cancels running work cooperatively
    ///
    /// Safe to call more than once.
    pub fn abort_all(&self) {
        if !self.aborted.swap(true, Ordering::SeqCst) {
            tracing::debug!("Aborting worker pool with {} active workers", self.active_count());
            self.cancel.cancel();
        }
    }

    /// Rejects further work; running work is left to finish
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
