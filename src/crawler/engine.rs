//! Crawl engine - main crawl orchestration logic
//!
//! The engine owns the control loop of a crawl: it seeds the frontier with
//! the root page, dispatches pages to a bounded worker pool, and checks the
//! memory ceiling, host cancellation and stop requests before every
//! iteration. Each worker runs the page pipeline:
//!
//! 1. Fire the page-starting hook and wait for politeness / retry delays
//! 2. Fetch the page, consulting the download decision once headers arrive
//! 3. Follow manual redirects, skip oversized pages
//! 4. Extract and schedule links that pass the scheduling gate
//! 5. Fire the page-completed hook and schedule a retry if warranted

use crate::config::CrawlConfig;
use crate::crawler::fetcher::{FetchError, Fetcher, HttpFetcher};
use crate::crawler::hooks::CrawlHooks;
use crate::crawler::parser::{ExtractError, HtmlLinkExtractor, LinkExtractor};
use crate::crawler::pool::{WorkError, WorkerPool};
use crate::crawler::redirect::{parse_retry_after, RedirectRetryTracker, MAX_REDIRECT_CHAIN};
use crate::crawler::scheduler::{FrontierError, InMemoryScheduler, Scheduler};
use crate::policy::{
    panic_message, CrawlDecision, DecisionOverrides, DefaultPolicyEngine, PolicyEngine,
};
use crate::politeness::RateLimiter;
use crate::resource::{MemoryMonitor, ProcessMemoryMonitor, ResourceGuard};
use crate::robots::RobotsFinder;
use crate::state::{CrawlContext, CrawlPhase, CrawlResult, CrawledPage, ExtensionBag, PageToCrawl};
use crate::{CrawlError, EngineError};
use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Extension points the polite engine layers over the standard pipeline
#[async_trait]
pub(crate) trait CrawlStrategy: Send + Sync {
    /// Runs once per crawl, before the root page is scheduled
    async fn before_crawl(&self, _run: &CrawlRun) {}

    /// Page-level check consulted ahead of the policy engine
    fn allow_page(&self, _page: &PageToCrawl, _run: &CrawlRun) -> bool {
        true
    }

    /// Runs after the page-starting hook, before the request is sent
    async fn before_fetch(&self, _page: &PageToCrawl, _run: &CrawlRun) {}

    /// Runs when the root page redirected and the crawl root changed
    fn on_root_redirect(&self, _run: &CrawlRun, _new_root: &Url) {}
}

/// Pipeline with no extra checks
pub(crate) struct StandardStrategy;

impl CrawlStrategy for StandardStrategy {}

/// Collaborators shared by every crawl of an engine
pub(crate) struct EngineCore {
    config: Arc<CrawlConfig>,
    scheduler: Option<Arc<dyn Scheduler>>,
    policy: Arc<dyn PolicyEngine>,
    fetcher: Arc<dyn Fetcher>,
    extractor: Arc<dyn LinkExtractor>,
    memory_monitor: Arc<dyn MemoryMonitor>,
    hooks: CrawlHooks,
    overrides: DecisionOverrides,
    tracker: RedirectRetryTracker,
    crawl_bag: ExtensionBag,
    strategy: Arc<dyn CrawlStrategy>,
}

/// Builds a [`CrawlEngine`] or [`PoliteCrawlEngine`](crate::crawler::PoliteCrawlEngine)
///
/// Every collaborator has a default: an in-memory frontier, the built-in
/// policy engine, an HTTP fetcher and HTML link extractor built from the
/// configuration, and a procfs memory monitor.
///
/// # Example
///
/// ```no_run
/// use sumi_engine::{CrawlConfig, CrawlEngine};
///
/// # async fn run() -> Result<(), sumi_engine::EngineError> {
/// let engine = CrawlEngine::builder(CrawlConfig::default()).build()?;
/// let result = engine.crawl("https://example.com/").await?;
/// println!("Crawled {} pages", result.crawled_count());
/// # Ok(())
/// # }
/// ```
pub struct CrawlEngineBuilder {
    pub(super) config: CrawlConfig,
    pub(super) scheduler: Option<Arc<dyn Scheduler>>,
    pub(super) policy: Option<Arc<dyn PolicyEngine>>,
    pub(super) fetcher: Option<Arc<dyn Fetcher>>,
    pub(super) extractor: Option<Arc<dyn LinkExtractor>>,
    pub(super) memory_monitor: Option<Arc<dyn MemoryMonitor>>,
    pub(super) hooks: CrawlHooks,
    pub(super) overrides: DecisionOverrides,
    pub(super) crawl_bag: ExtensionBag,
    pub(super) rate_limiter: Option<Arc<dyn RateLimiter>>,
    pub(super) robots_finder: Option<Arc<dyn RobotsFinder>>,
}

impl CrawlEngineBuilder {
    pub fn new(config: CrawlConfig) -> Self {
        Self {
            config,
            scheduler: None,
            policy: None,
            fetcher: None,
            extractor: None,
            memory_monitor: None,
            hooks: CrawlHooks::new(),
            overrides: DecisionOverrides::new(),
            crawl_bag: ExtensionBag::new(),
            rate_limiter: None,
            robots_finder: None,
        }
    }

    /// Uses `scheduler` as the frontier of every crawl
    ///
    /// Without one, each crawl gets a fresh in-memory frontier.
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn policy(mut self, policy: Arc<dyn PolicyEngine>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn link_extractor(mut self, extractor: Arc<dyn LinkExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn memory_monitor(mut self, monitor: Arc<dyn MemoryMonitor>) -> Self {
        self.memory_monitor = Some(monitor);
        self
    }

    pub fn hooks(mut self, hooks: CrawlHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn overrides(mut self, overrides: DecisionOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Values copied into every crawl's extension bag
    pub fn crawl_bag(mut self, bag: ExtensionBag) -> Self {
        self.crawl_bag = bag;
        self
    }

    /// Rate limiter used by the polite engine
    pub fn rate_limiter(mut self, rate_limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = Some(rate_limiter);
        self
    }

    /// robots.txt source used by the polite engine
    pub fn robots_finder(mut self, finder: Arc<dyn RobotsFinder>) -> Self {
        self.robots_finder = Some(finder);
        self
    }

    /// Builds an engine without politeness
    pub fn build(self) -> Result<CrawlEngine, EngineError> {
        let core = self.into_core(Arc::new(StandardStrategy))?;
        Ok(CrawlEngine::from_core(core))
    }

    pub(super) fn into_core(
        self,
        strategy: Arc<dyn CrawlStrategy>,
    ) -> Result<EngineCore, EngineError> {
        crate::config::validate(&self.config)?;

        let fetcher: Arc<dyn Fetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpFetcher::new(&self.config)?),
        };
        let extractor = self
            .extractor
            .unwrap_or_else(|| Arc::new(HtmlLinkExtractor::from_config(&self.config)));

        Ok(EngineCore {
            tracker: RedirectRetryTracker::from_config(&self.config),
            config: Arc::new(self.config),
            scheduler: self.scheduler,
            policy: self.policy.unwrap_or_else(|| Arc::new(DefaultPolicyEngine::new())),
            fetcher,
            extractor,
            memory_monitor: self
                .memory_monitor
                .unwrap_or_else(|| Arc::new(ProcessMemoryMonitor::new())),
            hooks: self.hooks,
            overrides: self.overrides,
            crawl_bag: self.crawl_bag,
            strategy,
        })
    }
}

/// Crawls a site starting from a root URL
///
/// An engine runs one crawl at a time; it can be reused once a crawl returns.
pub struct CrawlEngine {
    core: Arc<EngineCore>,
    running: AtomicBool,
}

impl CrawlEngine {
    /// Creates an engine with default collaborators
    pub fn new(config: CrawlConfig) -> Result<Self, EngineError> {
        CrawlEngineBuilder::new(config).build()
    }

    pub fn builder(config: CrawlConfig) -> CrawlEngineBuilder {
        CrawlEngineBuilder::new(config)
    }

    pub(crate) fn from_core(core: EngineCore) -> Self {
        Self {
            core: Arc::new(core),
            running: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.core.config
    }

    /// Crawls `root` until the frontier is exhausted or the crawl is stopped
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlResult)` - The crawl ran; failures during it are on `CrawlResult::error`
    /// * `Err(EngineError)` - The crawl could not be started
    pub async fn crawl(&self, root: &str) -> Result<CrawlResult, EngineError> {
        self.crawl_with_cancellation(root, CancellationToken::new())
            .await
    }

    /// Crawls `root`, hard-stopping once `cancellation` fires
    pub async fn crawl_with_cancellation(
        &self,
        root: &str,
        cancellation: CancellationToken,
    ) -> Result<CrawlResult, EngineError> {
        let root = parse_root(root)?;
        let _running = RunningGuard::acquire(&self.running)?;
        let core = &self.core;
        let config = core.config.clone();

        let scheduler = core
            .scheduler
            .clone()
            .unwrap_or_else(|| Arc::new(InMemoryScheduler::new(config.uri_recrawling)));
        let context = Arc::new(CrawlContext::new(
            root.clone(),
            config.clone(),
            scheduler,
            cancellation.clone(),
            core.crawl_bag.clone(),
        ));
        let pool = WorkerPool::new(config.max_concurrent_pages, &cancellation)?;
        let guard = ResourceGuard::new(core.memory_monitor.clone(), config.memory_cache_interval());
        let run = Arc::new(CrawlRun::new(core.clone(), context.clone(), guard));

        tracing::info!("About to crawl site [{}]", root);
        config.log_values();

        if config.is_memory_guard_enabled() {
            if let Ok(mb) = run.guard.current_usage_mb() {
                context.set_memory_usage_before(mb);
                tracing::info!("Starting memory usage for site [{}] is [{}mb]", root, mb);
            }
        }

        run.advance_phase(CrawlPhase::Running);
        let started = tokio::time::Instant::now();
        let timeout = config
            .crawl_timeout()
            .map(|timeout| spawn_crawl_timeout(context.clone(), timeout, pool.waker()));

        if let Err(e) = run.execute(&pool).await {
            tracing::error!("An error occurred while crawling site [{}]: {}", root, e);
            run.record_error(e);
        }

        pool.close();
        if let Some(handle) = timeout {
            handle.abort();
        }
        run.guard.close();

        if config.is_memory_guard_enabled() {
            if let Ok(mb) = core.memory_monitor.current_usage_mb() {
                context.set_memory_usage_after(mb);
                tracing::info!("Ending memory usage for site [{}] is [{}mb]", root, mb);
            }
        }

        let elapsed = started.elapsed();
        let exit_phase = run.phase();
        run.advance_phase(CrawlPhase::Done);
        tracing::info!(
            "Crawl complete for site [{}]: Crawled [{}] pages in [{:?}]",
            root,
            context.crawled_count(),
            elapsed
        );

        Ok(CrawlResult {
            root_uri: root,
            context,
            elapsed,
            error: run.take_error(),
            exit_phase,
        })
    }
}

fn parse_root(root: &str) -> Result<Url, EngineError> {
    let uri = Url::parse(root).map_err(|source| EngineError::InvalidRoot {
        url: root.to_string(),
        source,
    })?;
    if !crate::url::is_http_scheme(&uri) {
        return Err(EngineError::UnsupportedScheme(root.to_string()));
    }
    Ok(uri)
}

fn spawn_crawl_timeout(
    context: Arc<CrawlContext>,
    timeout: Duration,
    waker: Arc<Notify>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        tracing::info!(
            "Crawl timeout of [{}] seconds has been reached for [{}]",
            timeout.as_secs(),
            context.root_uri()
        );
        context.request_hard_stop();
        waker.notify_one();
    })
}

struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, EngineError> {
        if flag.swap(true, Ordering::SeqCst) {
            return Err(EngineError::AlreadyRunning);
        }
        Ok(Self(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Why a page pipeline ended early
enum PageError {
    Cancelled,
    Failed(CrawlError),
}

impl From<CrawlError> for PageError {
    fn from(e: CrawlError) -> Self {
        Self::Failed(e)
    }
}

impl From<FrontierError> for PageError {
    fn from(e: FrontierError) -> Self {
        Self::Failed(e.into())
    }
}

impl From<FetchError> for PageError {
    fn from(e: FetchError) -> Self {
        Self::Failed(e.into())
    }
}

impl From<ExtractError> for PageError {
    fn from(e: ExtractError) -> Self {
        Self::Failed(e.into())
    }
}

/// Current time on tokio's clock, which tests may pause
fn now_std() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}

/// Work stops once its token fires or a hard stop has been requested
///
/// The hard-stop flag is read too because the control loop aborts the pool
/// only on its next pass.
fn check_cancelled(cancel: &CancellationToken, context: &CrawlContext) -> Result<(), PageError> {
    if cancel.is_cancelled() || context.is_hard_stop_requested() {
        return Err(PageError::Cancelled);
    }
    Ok(())
}

/// State of a single crawl invocation
pub(crate) struct CrawlRun {
    core: Arc<EngineCore>,
    context: Arc<CrawlContext>,
    guard: ResourceGuard,
    phase: Mutex<CrawlPhase>,
    error: Mutex<Option<CrawlError>>,
    page_limit_reached: AtomicBool,
    stop_reported: AtomicBool,
    hard_stop_reported: AtomicBool,
    cancellation_reported: AtomicBool,
}

impl CrawlRun {
    fn new(core: Arc<EngineCore>, context: Arc<CrawlContext>, guard: ResourceGuard) -> Self {
        Self {
            core,
            context,
            guard,
            phase: Mutex::new(CrawlPhase::Idle),
            error: Mutex::new(None),
            page_limit_reached: AtomicBool::new(false),
            stop_reported: AtomicBool::new(false),
            hard_stop_reported: AtomicBool::new(false),
            cancellation_reported: AtomicBool::new(false),
        }
    }

    pub(crate) fn context(&self) -> &Arc<CrawlContext> {
        &self.context
    }

    pub(crate) fn config(&self) -> &CrawlConfig {
        &self.core.config
    }

    pub(crate) fn hooks(&self) -> &CrawlHooks {
        &self.core.hooks
    }

    fn phase(&self) -> CrawlPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn advance_phase(&self, next: CrawlPhase) {
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = *phase;
        if phase.advance(next) {
            tracing::debug!("Crawl phase changed from [{}] to [{}]", previous, next);
        }
    }

    /// Keeps the first terminal error of the crawl
    fn record_error(&self, error: CrawlError) {
        let mut slot = self.error.lock().unwrap_or_else(PoisonError::into_inner);
        match *slot {
            None => *slot = Some(error),
            Some(_) => tracing::debug!("Additional crawl error not recorded: {}", error),
        }
    }

    fn take_error(&self) -> Option<CrawlError> {
        self.error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn fail(&self, error: CrawlError) {
        self.record_error(error);
        self.context.request_hard_stop();
    }

    async fn execute(self: &Arc<Self>, pool: &WorkerPool) -> Result<(), CrawlError> {
        self.core.strategy.before_crawl(self).await;

        let root_page = PageToCrawl::root(self.context.original_root_uri().clone());
        if self.should_schedule(&root_page) {
            self.context.scheduler().add(root_page)?;
        }

        self.verify_required_memory()?;
        self.crawl_site(pool).await
    }

    fn verify_required_memory(&self) -> Result<(), CrawlError> {
        let required_mb = self.config().min_available_memory_mb;
        if required_mb < 1 || self.guard.has_headroom(required_mb) {
            return Ok(());
        }
        Err(CrawlError::InsufficientMemory {
            required_mb,
            url: self.context.original_root_uri().to_string(),
        })
    }

    async fn crawl_site(self: &Arc<Self>, pool: &WorkerPool) -> Result<(), CrawlError> {
        let scheduler = self.context.scheduler().clone();

        loop {
            self.run_pre_work_checks(pool)?;

            if scheduler.count()? > 0 {
                if let Some(page) = scheduler.next()? {
                    self.dispatch(pool, page).await;
                }
            } else if !pool.has_active_work() {
                // Workers finish scheduling before leaving the active set,
                // so the frontier is read again after the active check.
                if scheduler.count()? == 0 {
                    tracing::debug!("Done crawling site [{}]", self.context.root_uri());
                    return Ok(());
                }
            } else {
                tracing::trace!("Waiting for links to be scheduled...");
                pool.wait_for_progress(self.config().poll_interval()).await;
            }
        }
    }

    async fn dispatch(self: &Arc<Self>, pool: &WorkerPool, page: PageToCrawl) {
        let uri = page.uri.clone();
        let run = Arc::clone(self);
        let submitted = pool
            .submit(move |cancel| run.process_page(page, cancel))
            .await;
        if let Err(e) = submitted {
            tracing::debug!("Page [{}] was not dispatched: {}", uri, e);
        }
    }

    fn run_pre_work_checks(&self, pool: &WorkerPool) -> Result<(), CrawlError> {
        self.check_memory_usage();
        self.check_for_cancellation();
        self.check_for_hard_stop(pool)?;
        self.check_for_stop()
    }

    fn check_memory_usage(&self) {
        let max_mb = self.config().max_memory_usage_mb;
        if max_mb < 1 || self.context.is_hard_stop_requested() {
            return;
        }

        if let Some(usage_mb) = self.guard.usage_above(max_mb) {
            self.guard.close();
            let error = CrawlError::MemoryLimitExceeded {
                usage_mb,
                max_mb,
                url: self.context.root_uri().to_string(),
            };
            tracing::error!("{}", error);
            self.fail(error);
        }
    }

    fn check_for_cancellation(&self) {
        if !self.context.is_cancellation_requested()
            || self.cancellation_reported.swap(true, Ordering::SeqCst)
        {
            return;
        }

        let error = CrawlError::Cancelled {
            url: self.context.root_uri().to_string(),
        };
        tracing::error!("{}", error);
        self.fail(error);
        self.advance_phase(CrawlPhase::Cancelled);
    }

    fn check_for_hard_stop(&self, pool: &WorkerPool) -> Result<(), CrawlError> {
        if !self.context.is_hard_stop_requested() {
            return Ok(());
        }

        if !self.hard_stop_reported.swap(true, Ordering::SeqCst) {
            tracing::info!("Hard crawl stop requested for site [{}]!", self.context.root_uri());
            self.advance_phase(CrawlPhase::HardStopping);
        }

        let scheduler = self.context.scheduler();
        scheduler.clear()?;
        pool.abort_all();
        // Workers may have scheduled pages since the first clear
        scheduler.clear()?;
        Ok(())
    }

    fn check_for_stop(&self) -> Result<(), CrawlError> {
        if !self.context.is_stop_requested() {
            return Ok(());
        }

        if !self.stop_reported.swap(true, Ordering::SeqCst) {
            tracing::info!("Crawl stop requested for site [{}]!", self.context.root_uri());
            self.advance_phase(CrawlPhase::SoftStopping);
        }
        self.context.scheduler().clear()?;
        Ok(())
    }

    async fn process_page(
        self: Arc<Self>,
        page: PageToCrawl,
        cancel: CancellationToken,
    ) -> Result<(), WorkError> {
        let uri = page.uri.clone();
        let outcome = AssertUnwindSafe(self.process_page_inner(page, &cancel))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(PageError::Cancelled)) => {
                tracing::debug!("Worker cancelled while crawling/processing page [{}]", uri);
                Err(WorkError::Cancelled)
            }
            Ok(Err(PageError::Failed(error))) => {
                let message = format!(
                    "Error occurred during processing of page [{}]: {}",
                    uri, error
                );
                self.fail(error);
                Err(WorkError::Failed(message))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                self.fail(CrawlError::WorkerPanic {
                    url: uri.to_string(),
                    message: message.clone(),
                });
                Err(WorkError::Failed(format!(
                    "Panic during processing of page [{}]: {}",
                    uri, message
                )))
            }
        }
    }

    async fn process_page_inner(
        &self,
        page: PageToCrawl,
        cancel: &CancellationToken,
    ) -> Result<(), PageError> {
        check_cancelled(cancel, &self.context)?;
        self.context.register_page(&page);

        let mut crawled = self.crawl_the_page(page, cancel).await?;

        if crawled.page.is_root {
            self.validate_root_for_redirection(&crawled);
        }

        if !self.config().auto_redirects && self.core.tracker.is_redirect(&crawled) {
            self.process_redirect(&crawled)?;
            return Ok(());
        }

        if self.page_size_is_above_max(&crawled) {
            return Ok(());
        }
        check_cancelled(cancel, &self.context)?;

        let crawl_links = self.should_crawl_page_links(&crawled);
        if crawl_links || self.config().forced_link_parsing {
            crawled.parsed_links = self.core.extractor.extract_links(&crawled)?;
        }
        check_cancelled(cancel, &self.context)?;

        if crawl_links {
            self.schedule_page_links(&crawled)?;
        }
        check_cancelled(cancel, &self.context)?;

        let frontier_empty = self.context.pending_count()? == 0;
        self.core
            .hooks
            .fire_page_crawl_completed(&self.context, &crawled, frontier_empty);

        if self.should_recrawl_page(&crawled) {
            self.schedule_retry(crawled)?;
        }
        Ok(())
    }

    async fn crawl_the_page(
        &self,
        mut page: PageToCrawl,
        cancel: &CancellationToken,
    ) -> Result<CrawledPage, PageError> {
        self.core.hooks.fire_page_crawl_starting(&self.context, &page);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PageError::Cancelled),
            _ = self.core.strategy.before_fetch(&page, self) => {}
        }

        if page.is_retry {
            if let Some(wait) = self.core.tracker.retry_delay(&page, now_std()) {
                tracing::debug!(
                    "Waiting [{}ms] before retrying page [{}]",
                    wait.as_millis(),
                    page.uri
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(PageError::Cancelled),
                    _ = tokio::time::sleep(wait) => {}
                }
            }
        }

        page.last_request = Some(now_std());
        let gate = |crawled: &CrawledPage| self.should_download_page_content(crawled);
        let crawled = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PageError::Cancelled),
            crawled = self.core.fetcher.fetch(page, &gate) => crawled?,
        };

        let parent = crawled
            .page
            .parent_uri
            .as_ref()
            .map(Url::as_str)
            .unwrap_or("");
        match crawled.status {
            Some(status) => tracing::info!(
                "Page crawl complete, Status:[{}] Url:[{}] Elapsed:[{}ms] Parent:[{}] Retry:[{}]",
                status.as_u16(),
                crawled.page.uri,
                crawled.elapsed.as_millis(),
                parent,
                crawled.page.retry_count
            ),
            None => tracing::info!(
                "Page crawl complete, Status:[NA] Url:[{}] Elapsed:[{}ms] Parent:[{}] Retry:[{}]",
                crawled.page.uri,
                crawled.elapsed.as_millis(),
                parent,
                crawled.page.retry_count
            ),
        }

        Ok(crawled)
    }

    fn validate_root_for_redirection(&self, crawled: &CrawledPage) {
        if !self.core.tracker.is_redirect(crawled) {
            return;
        }
        let Some(target) = self.core.tracker.extract_redirect_target(crawled) else {
            return;
        };

        let current = self.context.root_uri();
        if target != current {
            tracing::info!("Root uri redirected from [{}] to [{}]", current, target);
            self.context.set_root_uri(target.clone());
            self.core.strategy.on_root_redirect(self, &target);
        }
    }

    fn process_redirect(&self, crawled: &CrawledPage) -> Result<(), CrawlError> {
        let Some(target) = self.core.tracker.extract_redirect_target(crawled) else {
            tracing::warn!(
                "Page [{}] returned a redirect without a usable Location header",
                crawled.page.uri
            );
            return Ok(());
        };

        let mut successor = self.core.tracker.build_successor(crawled, target);
        if successor.redirect_position > MAX_REDIRECT_CHAIN {
            return Ok(());
        }
        successor.is_internal = self.core.overrides.is_internal(&successor.uri, &self.context);

        if self.should_schedule(&successor) {
            self.context.scheduler().add(successor)?;
        }
        Ok(())
    }

    fn page_size_is_above_max(&self, crawled: &CrawledPage) -> bool {
        let max = self.config().max_page_size_bytes;
        let size = crawled.content.bytes.len() as u64;
        if max > 0 && size > max {
            tracing::info!(
                "Page [{}] has a page size of [{}] bytes which is above the [{}] byte max, no further processing will occur for this page",
                crawled.page.uri,
                size,
                max
            );
            return true;
        }
        false
    }

    /// Returns true if `page` passes the scheduling gate
    pub(crate) fn should_schedule(&self, page: &PageToCrawl) -> bool {
        (page.is_internal || self.config().external_page_crawling) && self.should_crawl_page(page)
    }

    fn should_crawl_page(&self, page: &PageToCrawl) -> bool {
        if self.page_limit_reached.load(Ordering::SeqCst) {
            return false;
        }

        if !self.core.strategy.allow_page(page, self) {
            return false;
        }

        let decision = self.core.policy.should_crawl_page(page, &self.context);
        if decision.page_limit_reached {
            if !self.page_limit_reached.swap(true, Ordering::SeqCst) {
                tracing::info!(
                    "MaxPagesToCrawlLimit has been reached or scheduled. No more pages will be scheduled."
                );
            }
            return false;
        }

        let decision = self
            .core
            .overrides
            .apply_crawl_page(decision, page, &self.context);
        if !decision.allow {
            tracing::debug!("Page [{}] not crawled, [{}]", page.uri, decision.reason);
            self.disallow_page(page, &decision.reason);
        }

        self.signal_crawl_stop_if_needed(&decision);
        decision.allow
    }

    /// Reports a page refused by the scheduling gate
    pub(crate) fn disallow_page(&self, page: &PageToCrawl, reason: &str) {
        self.core
            .hooks
            .fire_page_crawl_disallowed(&self.context, page, reason);
    }

    fn should_download_page_content(&self, crawled: &CrawledPage) -> CrawlDecision {
        let decision = self.core.policy.should_download_content(crawled, &self.context);
        let decision = self
            .core
            .overrides
            .apply_download_content(decision, crawled, &self.context);
        self.signal_crawl_stop_if_needed(&decision);
        decision
    }

    fn should_crawl_page_links(&self, crawled: &CrawledPage) -> bool {
        let decision = self.core.policy.should_crawl_page_links(crawled, &self.context);
        let decision = self
            .core
            .overrides
            .apply_crawl_page_links(decision, crawled, &self.context);

        if !decision.allow {
            tracing::info!(
                "Links on page [{}] not crawled, [{}]",
                crawled.page.uri,
                decision.reason
            );
            self.core
                .hooks
                .fire_page_links_crawl_disallowed(&self.context, crawled, &decision.reason);
        }

        self.signal_crawl_stop_if_needed(&decision);
        decision.allow
    }

    fn should_recrawl_page(&self, crawled: &CrawledPage) -> bool {
        let decision = self.core.policy.should_recrawl_page(crawled, &self.context);
        let decision = self
            .core
            .overrides
            .apply_recrawl_page(decision, crawled, &self.context);

        if !decision.allow {
            tracing::debug!(
                "Page [{}] not recrawled, [{}]",
                crawled.page.uri,
                decision.reason
            );
        }

        self.signal_crawl_stop_if_needed(&decision);
        decision.allow
    }

    fn signal_crawl_stop_if_needed(&self, decision: &CrawlDecision) {
        if decision.should_hard_stop_crawl {
            tracing::info!(
                "Decision marked crawl [Hard Stop] for site [{}], [{}]",
                self.context.root_uri(),
                decision.reason
            );
            self.context.request_hard_stop();
        } else if decision.should_stop_crawl {
            tracing::info!(
                "Decision marked crawl [Stop] for site [{}], [{}]",
                self.context.root_uri(),
                decision.reason
            );
            self.context.request_stop();
        }
    }

    fn schedule_page_links(&self, crawled: &CrawledPage) -> Result<(), CrawlError> {
        let scheduler = self.context.scheduler();
        let max_links = self.config().max_links_per_page;
        let mut scheduled = 0usize;

        for link in &crawled.parsed_links {
            // Known links were already validated; skip them to avoid
            // duplicate decisions and events.
            if scheduler.is_known(link)? {
                continue;
            }

            if self
                .core
                .overrides
                .allow_link(link, crawled, &self.context)
            {
                let is_internal = self.core.overrides.is_internal(link, &self.context);
                let page = PageToCrawl::discovered(link.clone(), &crawled.page, is_internal);
                if self.should_schedule(&page) {
                    scheduler.add(page)?;
                    scheduled += 1;
                }
            }
            scheduler.mark_known(link)?;

            if max_links > 0 && scheduled >= max_links {
                tracing::info!(
                    "MaxLinksPerPage has been reached. No more links will be scheduled for current page [{}].",
                    crawled.page.uri
                );
                break;
            }
        }
        Ok(())
    }

    fn schedule_retry(&self, crawled: CrawledPage) -> Result<(), CrawlError> {
        let retry_after = crawled
            .header_str("retry-after")
            .and_then(|value| parse_retry_after(value, Utc::now()));

        let mut page = crawled.page;
        page.is_retry = true;
        page.retry_count += 1;
        page.retry_after_seconds = retry_after;

        tracing::info!(
            "Page [{}] scheduled for retry [{}]",
            page.uri,
            page.retry_count
        );
        self.context.scheduler().add(page)?;
        Ok(())
    }
}
