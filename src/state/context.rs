use crate::config::CrawlConfig;
use crate::crawler::{FrontierError, Scheduler};
use crate::state::{CrawlPhase, PageToCrawl};
use crate::CrawlError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Open, string-keyed map of host-owned values
///
/// Values are type-erased; hosts read them back with [`ExtensionBag::get`]
/// using the type they stored. Cloning the bag is cheap and shares the values.
#[derive(Clone, Default)]
pub struct ExtensionBag {
    values: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl ExtensionBag {
    /// Creates an empty bag
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value, replacing any previous value under the same key
    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Arc::new(value));
    }

    /// Returns the value stored under `key` if it has type `T`
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.values.get(key).cloned()?.downcast::<T>().ok()
    }

    /// Returns true if a value is stored under `key`
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Removes the value stored under `key`
    pub fn remove(&mut self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }

    /// Returns the stored keys
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for ExtensionBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.keys().collect();
        keys.sort_unstable();
        f.debug_struct("ExtensionBag").field("keys", &keys).finish()
    }
}

/// State of a single crawl invocation
///
/// Created when `crawl()` starts and shared (through `Arc`) with workers and
/// hook subscribers. Counters and stop flags are safe to touch concurrently.
pub struct CrawlContext {
    root_uri: RwLock<Url>,
    original_root_uri: Url,
    crawled_count: AtomicU64,
    count_by_domain: DashMap<String, u64>,
    stop_requested: AtomicBool,
    hard_stop_requested: AtomicBool,
    cancellation: CancellationToken,
    config: Arc<CrawlConfig>,
    scheduler: Arc<dyn Scheduler>,
    extension_bag: RwLock<ExtensionBag>,
    crawl_started: DateTime<Utc>,
    memory_usage_before_mb: OnceLock<u64>,
    memory_usage_after_mb: OnceLock<u64>,
}

impl CrawlContext {
    /// Creates the context for a crawl rooted at `root`
    ///
    /// # Arguments
    ///
    /// * `root` - The crawl's root URI
    /// * `config` - Configuration snapshot for this crawl
    /// * `scheduler` - The frontier backing this crawl
    /// * `cancellation` - Host cancellation handle
    /// * `extension_bag` - Host values pre-populated before the crawl
    pub fn new(
        root: Url,
        config: Arc<CrawlConfig>,
        scheduler: Arc<dyn Scheduler>,
        cancellation: CancellationToken,
        extension_bag: ExtensionBag,
    ) -> Self {
        Self {
            root_uri: RwLock::new(root.clone()),
            original_root_uri: root,
            crawled_count: AtomicU64::new(0),
            count_by_domain: DashMap::new(),
            stop_requested: AtomicBool::new(false),
            hard_stop_requested: AtomicBool::new(false),
            cancellation,
            config,
            scheduler,
            extension_bag: RwLock::new(extension_bag),
            crawl_started: Utc::now(),
            memory_usage_before_mb: OnceLock::new(),
            memory_usage_after_mb: OnceLock::new(),
        }
    }

    /// Returns the current root URI (updated if the root page redirected)
    pub fn root_uri(&self) -> Url {
        self.root_uri
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the current root URI
    pub fn set_root_uri(&self, uri: Url) {
        *self.root_uri.write().unwrap_or_else(PoisonError::into_inner) = uri;
    }

    /// Returns the root URI the crawl was started with
    pub fn original_root_uri(&self) -> &Url {
        &self.original_root_uri
    }

    /// Returns the number of distinct pages dispatched so far
    pub fn crawled_count(&self) -> u64 {
        self.crawled_count.load(Ordering::SeqCst)
    }

    /// Returns the number of pages dispatched for `domain`
    pub fn count_for_domain(&self, domain: &str) -> u64 {
        self.count_by_domain.get(domain).map(|c| *c).unwrap_or(0)
    }

    /// Returns a snapshot of per-domain page counts
    pub fn count_by_domain(&self) -> HashMap<String, u64> {
        self.count_by_domain
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    /// Counts a page that is about to be fetched
    ///
    /// Retries are not counted again.
    pub fn register_page(&self, page: &PageToCrawl) {
        if page.is_retry {
            return;
        }
        self.crawled_count.fetch_add(1, Ordering::SeqCst);
        if let Some(domain) = page.domain() {
            *self.count_by_domain.entry(domain).or_insert(0) += 1;
        }
    }

    /// Returns true if a soft stop was requested
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Requests a soft stop: the frontier is drained, dispatched work finishes
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    /// Returns true if a hard stop was requested
    pub fn is_hard_stop_requested(&self) -> bool {
        self.hard_stop_requested.load(Ordering::SeqCst)
    }

    /// Requests a hard stop
    ///
    /// # Returns
    ///
    /// * `true` - This call set the flag
    /// * `false` - A hard stop was already requested
    pub fn request_hard_stop(&self) -> bool {
        !self.hard_stop_requested.swap(true, Ordering::SeqCst)
    }

    /// Returns the host cancellation handle
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Returns true if the host cancelled the crawl
    pub fn is_cancellation_requested(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Returns the configuration snapshot for this crawl
    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// Returns the frontier backing this crawl
    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    /// Returns the number of pages waiting in the frontier
    pub fn pending_count(&self) -> Result<u64, FrontierError> {
        self.scheduler.count()
    }

    /// Returns a snapshot of the extension bag
    pub fn extension_bag(&self) -> ExtensionBag {
        self.extension_bag
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stores a value in the extension bag
    pub fn insert_extension<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.extension_bag
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value);
    }

    /// Returns when the crawl started
    pub fn crawl_started(&self) -> DateTime<Utc> {
        self.crawl_started
    }

    /// Records process memory usage sampled before the crawl
    pub fn set_memory_usage_before(&self, mb: u64) {
        let _ = self.memory_usage_before_mb.set(mb);
    }

    /// Records process memory usage sampled after the crawl
    pub fn set_memory_usage_after(&self, mb: u64) {
        let _ = self.memory_usage_after_mb.set(mb);
    }

    pub fn memory_usage_before_mb(&self) -> Option<u64> {
        self.memory_usage_before_mb.get().copied()
    }

    pub fn memory_usage_after_mb(&self) -> Option<u64> {
        self.memory_usage_after_mb.get().copied()
    }
}

impl fmt::Debug for CrawlContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrawlContext")
            .field("root_uri", &self.root_uri().as_str())
            .field("original_root_uri", &self.original_root_uri.as_str())
            .field("crawled_count", &self.crawled_count())
            .field("stop_requested", &self.is_stop_requested())
            .field("hard_stop_requested", &self.is_hard_stop_requested())
            .field("cancelled", &self.is_cancellation_requested())
            .finish_non_exhaustive()
    }
}

/// Outcome of a single `crawl()` invocation
#[derive(Debug)]
pub struct CrawlResult {
    /// The root URI the crawl was started with
    pub root_uri: Url,

    /// Final crawl state
    pub context: Arc<CrawlContext>,

    /// Wall-clock duration of the crawl
    pub elapsed: Duration,

    /// Terminal error, if the crawl ended because of one
    pub error: Option<CrawlError>,

    /// Last phase the crawl reached before finishing
    pub exit_phase: CrawlPhase,
}

impl CrawlResult {
    /// Returns true if the crawl recorded a terminal error
    pub fn error_occurred(&self) -> bool {
        self.error.is_some()
    }

    /// Returns the number of distinct pages dispatched
    pub fn crawled_count(&self) -> u64 {
        self.context.crawled_count()
    }
}
