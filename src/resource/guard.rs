use crate::resource::{MemoryError, MemoryMonitor};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

const UNKNOWN: u64 = u64::MAX;

/// Memory ceiling and headroom checks for a crawl
///
/// With a non-zero cache interval the usage figure is refreshed by a
/// background task and reads never touch the monitor. The guard must be
/// created inside a tokio runtime in that case.
pub struct ResourceGuard {
    monitor: Arc<dyn MemoryMonitor>,
    cached_usage_mb: Arc<AtomicU64>,
    cache_interval: Duration,
    refresher: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl ResourceGuard {
    /// Creates a guard around `monitor`
    ///
    /// # Arguments
    ///
    /// * `monitor` - The memory sampler
    /// * `cache_interval` - How often the cached usage is refreshed (zero samples on every read)
    pub fn new(monitor: Arc<dyn MemoryMonitor>, cache_interval: Duration) -> Self {
        let cached_usage_mb = Arc::new(AtomicU64::new(UNKNOWN));

        let refresher = if cache_interval.is_zero() {
            None
        } else {
            if let Ok(mb) = monitor.current_usage_mb() {
                cached_usage_mb.store(mb, Ordering::SeqCst);
            }

            let monitor = monitor.clone();
            let cached = cached_usage_mb.clone();
            Some(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(cache_interval);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    match monitor.current_usage_mb() {
                        Ok(mb) => cached.store(mb, Ordering::SeqCst),
                        Err(e) => tracing::debug!("Memory sample failed: {}", e),
                    }
                }
            }))
        };

        Self {
            monitor,
            cached_usage_mb,
            cache_interval,
            refresher: Mutex::new(refresher),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the process memory usage in MB
    pub fn current_usage_mb(&self) -> Result<u64, MemoryError> {
        if !self.cache_interval.is_zero() {
            let cached = self.cached_usage_mb.load(Ordering::SeqCst);
            if cached != UNKNOWN {
                return Ok(cached);
            }
        }
        self.monitor.current_usage_mb()
    }

    /// Returns true if `required_mb` of memory is available
    ///
    /// Always true when `required_mb` is below 1 or memory cannot be sampled.
    pub fn has_headroom(&self, required_mb: u64) -> bool {
        if required_mb < 1 {
            return true;
        }

        match self.monitor.available_mb() {
            Ok(available) => available >= required_mb,
            Err(e) => {
                tracing::debug!("Unable to sample available memory, assuming available: {}", e);
                true
            }
        }
    }

    /// Returns the current usage if it is above `max_mb`
    ///
    /// Always None when `max_mb` is 0, the guard is closed, or memory cannot be sampled.
    pub fn usage_above(&self, max_mb: u64) -> Option<u64> {
        if max_mb == 0 || self.is_closed() {
            return None;
        }

        match self.current_usage_mb() {
            Ok(usage) if usage > max_mb => Some(usage),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!("Unable to sample memory usage: {}", e);
                None
            }
        }
    }

    /// Stops the background refresh; later ceiling checks always pass
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            if let Some(handle) = self
                .refresher
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
            {
                handle.abort();
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        self.close();
    }
}
