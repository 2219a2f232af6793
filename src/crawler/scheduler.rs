//! Crawl frontier
//!
//! This module handles:
//! - FIFO queue management for pages waiting to be fetched
//! - The known-URI set used to avoid scheduling a page twice
//! - Re-queueing retries regardless of the known set

use crate::state::PageToCrawl;
use dashmap::DashSet;
use std::collections::VecDeque;
use std::sync::Mutex;
use thiserror::Error;
use url::Url;

/// Frontier failures
#[derive(Debug, Error)]
pub enum FrontierError {
    #[error("Frontier backend error: {0}")]
    Backend(String),

    #[error("Frontier lock poisoned")]
    Poisoned,
}

/// The crawl frontier
///
/// Implementations must support concurrent `add` from workers while the
/// control loop pops pages.
pub trait Scheduler: Send + Sync {
    /// Adds a page to the frontier
    ///
    /// Pages whose URI is already known are dropped unless the page is a
    /// retry or URI recrawling is enabled.
    fn add(&self, page: PageToCrawl) -> Result<(), FrontierError>;

    /// Removes and returns the next page to fetch
    fn next(&self) -> Result<Option<PageToCrawl>, FrontierError>;

    /// Returns the number of pages waiting
    fn count(&self) -> Result<u64, FrontierError>;

    /// Returns true if the URI was already scheduled
    fn is_known(&self, uri: &Url) -> Result<bool, FrontierError>;

    /// Records a URI as scheduled without queueing it
    fn mark_known(&self, uri: &Url) -> Result<(), FrontierError>;

    /// Drops every waiting page; the known set is kept
    fn clear(&self) -> Result<(), FrontierError>;
}

/// In-memory FIFO frontier
pub struct InMemoryScheduler {
    /// Pages waiting to be fetched, in discovery order
    queue: Mutex<VecDeque<PageToCrawl>>,

    /// Every URI ever added
    known: DashSet<String>,

    /// Whether known URIs may be queued again
    allow_recrawl: bool,
}

impl InMemoryScheduler {
    /// Creates an empty frontier
    ///
    /// # Arguments
    ///
    /// * `allow_recrawl` - Queue pages even when their URI is already known
    pub fn new(allow_recrawl: bool) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            known: DashSet::new(),
            allow_recrawl,
        }
    }

    fn queue(&self) -> Result<std::sync::MutexGuard<'_, VecDeque<PageToCrawl>>, FrontierError> {
        self.queue.lock().map_err(|_| FrontierError::Poisoned)
    }
}

impl Default for InMemoryScheduler {
    fn default() -> Self {
        Self::new(false)
    }
}

impl Scheduler for InMemoryScheduler {
    fn add(&self, page: PageToCrawl) -> Result<(), FrontierError> {
        let newly_known = self.known.insert(page.uri.as_str().to_string());

        if page.is_retry || self.allow_recrawl || newly_known {
            tracing::trace!("Frontier add: {}", page.uri);
            self.queue()?.push_back(page);
        } else {
            tracing::trace!("Frontier skip (already known): {}", page.uri);
        }
        Ok(())
    }

    fn next(&self) -> Result<Option<PageToCrawl>, FrontierError> {
        Ok(self.queue()?.pop_front())
    }

    fn count(&self) -> Result<u64, FrontierError> {
        Ok(self.queue()?.len() as u64)
    }

    fn is_known(&self, uri: &Url) -> Result<bool, FrontierError> {
        Ok(self.known.contains(uri.as_str()))
    }

    fn mark_known(&self, uri: &Url) -> Result<(), FrontierError> {
        self.known.insert(uri.as_str().to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), FrontierError> {
        self.queue()?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn page(s: &str) -> PageToCrawl {
        PageToCrawl::new(Url::parse(s).unwrap())
    }

    #[test]
    fn test_fifo_order() {
        let scheduler = InMemoryScheduler::new(false);
        scheduler.add(page("http://a.com/1")).unwrap();
        scheduler.add(page("http://a.com/2")).unwrap();
        scheduler.add(page("http://a.com/3")).unwrap();

        assert_eq!(scheduler.count().unwrap(), 3);
        assert_eq!(scheduler.next().unwrap().unwrap().uri.path(), "/1");
        assert_eq!(scheduler.next().unwrap().unwrap().uri.path(), "/2");
        assert_eq!(scheduler.next().unwrap().unwrap().uri.path(), "/3");
        assert!(scheduler.next().unwrap().is_none());
    }

    #[test]
    fn test_duplicates_dropped() {
        let scheduler = InMemoryScheduler::new(false);
        scheduler.add(page("http://a.com/1")).unwrap();
        scheduler.add(page("http://a.com/1")).unwrap();

        assert_eq!(scheduler.count().unwrap(), 1);
        assert!(scheduler.is_known(&Url::parse("http://a.com/1").unwrap()).unwrap());
    }

    #[test]
    fn test_retry_requeued() {
        let scheduler = InMemoryScheduler::new(false);
        scheduler.add(page("http://a.com/1")).unwrap();
        scheduler.next().unwrap();

        let mut retry = page("http://a.com/1");
        retry.is_retry = true;
        scheduler.add(retry).unwrap();

        assert_eq!(scheduler.count().unwrap(), 1);
    }

    #[test]
    fn test_recrawl_enabled() {
        let scheduler = InMemoryScheduler::new(true);
        scheduler.add(page("http://a.com/1")).unwrap();
        scheduler.add(page("http://a.com/1")).unwrap();
        assert_eq!(scheduler.count().unwrap(), 2);
    }

    #[test]
    fn test_mark_known_prevents_add() {
        let scheduler = InMemoryScheduler::new(false);
        let uri = Url::parse("http://a.com/seen").unwrap();
        scheduler.mark_known(&uri).unwrap();
        scheduler.add(page("http://a.com/seen")).unwrap();
        assert_eq!(scheduler.count().unwrap(), 0);
    }

    #[test]
    fn test_clear_keeps_known() {
        let scheduler = InMemoryScheduler::new(false);
        scheduler.add(page("http://a.com/1")).unwrap();
        scheduler.clear().unwrap();

        assert_eq!(scheduler.count().unwrap(), 0);
        scheduler.add(page("http://a.com/1")).unwrap();
        assert_eq!(scheduler.count().unwrap(), 0);
    }

    #[test]
    fn test_concurrent_adds() {
        let scheduler = Arc::new(InMemoryScheduler::new(false));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let scheduler = scheduler.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        // Half the URIs collide across threads
                        let n = if i % 2 == 0 { i } else { t * 100 + i };
                        scheduler.add(page(&format!("http://a.com/{}", n))).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(scheduler.count().unwrap(), 25 + 8 * 25);
    }
}
