//! Polite crawl engine
//!
//! Layers politeness over the standard engine: robots.txt for the root is
//! fetched before the crawl starts, its directives gate every scheduling
//! decision, and every fetch waits for the per-domain rate limiter. A
//! robots.txt crawl delay raises the configured per-domain delay, clamped to
//! the configured maximum.

use crate::config::CrawlConfig;
use crate::crawler::engine::{CrawlEngine, CrawlEngineBuilder, CrawlRun, CrawlStrategy};
use crate::crawler::fetcher::build_http_client;
use crate::politeness::{DomainRateLimiter, EffectiveDelay, PolitenessCoordinator, RateLimiter};
use crate::robots::{HttpRobotsFinder, RobotsFinder, RobotsTxt};
use crate::state::{CrawlResult, PageToCrawl};
use crate::EngineError;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Path probed to tell whether robots.txt disallows everything below the root
const ROOT_PROBE_PATH: &str = "aaaaa";

pub(crate) struct PoliteStrategy {
    coordinator: PolitenessCoordinator,
    finder: Arc<dyn RobotsFinder>,
    robots: RwLock<Option<RobotsTxt>>,
    delay: Mutex<Option<EffectiveDelay>>,
}

impl PoliteStrategy {
    pub(crate) fn new(rate_limiter: Arc<dyn RateLimiter>, finder: Arc<dyn RobotsFinder>) -> Self {
        Self {
            coordinator: PolitenessCoordinator::new(rate_limiter),
            finder,
            robots: RwLock::new(None),
            delay: Mutex::new(None),
        }
    }

    fn set_robots(&self, robots: Option<RobotsTxt>) {
        *self.robots.write().unwrap_or_else(PoisonError::into_inner) = robots;
    }

    /// Evaluates robots.txt for `page`
    ///
    /// # Returns
    ///
    /// * `(allowed, ignore_robots)` - `ignore_robots` is set when the root is
    ///   disallowed and the configuration asks to ignore robots.txt then
    fn robots_verdict(&self, page: &PageToCrawl, run: &CrawlRun) -> (bool, bool) {
        let guard = self.robots.read().unwrap_or_else(PoisonError::into_inner);
        let Some(robots) = guard.as_ref() else {
            return (true, false);
        };

        let config = run.config();
        let agent = config.robots_user_agent.as_str();
        if robots.is_url_allowed(&page.uri, agent) {
            return (true, false);
        }
        if !config.ignore_robots_if_root_disallowed {
            return (false, false);
        }

        let root_disallowed = page.is_root
            || run
                .context()
                .root_uri()
                .join(ROOT_PROBE_PATH)
                .map_or(false, |probe| !robots.is_url_allowed(&probe, agent));
        (root_disallowed, root_disallowed)
    }
}

#[async_trait]
impl CrawlStrategy for PoliteStrategy {
    async fn before_crawl(&self, run: &CrawlRun) {
        self.set_robots(None);
        let config = run.config();
        let root = run.context().root_uri();

        let mut robots_delay = None;
        if config.respect_robots_txt {
            if let Some(robots) = self.finder.find(&root).await {
                run.hooks().fire_robots_txt_parsed(run.context(), &robots);
                robots_delay = robots.crawl_delay(&config.robots_user_agent);
                self.set_robots(Some(robots));
            }
        }

        let delay = PolitenessCoordinator::reconcile(
            robots_delay,
            config.min_crawl_delay_per_domain_ms,
            config.max_robots_crawl_delay_seconds,
        );
        if let Err(e) = self.coordinator.apply_robots_delay(&root, delay) {
            tracing::warn!("Unable to apply crawl delay for site [{}]: {}", root, e);
        }
        *self.delay.lock().unwrap_or_else(PoisonError::into_inner) = Some(delay);
    }

    fn allow_page(&self, page: &PageToCrawl, run: &CrawlRun) -> bool {
        let (allowed, ignore_robots) = self.robots_verdict(page, run);

        if ignore_robots {
            tracing::warn!(
                "robots.txt disallows the root of site [{}]; ignore-robots-if-root-disallowed is set, so robots.txt is ignored for the rest of this crawl",
                run.context().root_uri()
            );
            self.set_robots(None);
            return true;
        }

        if !allowed {
            let reason = format!(
                "Page [{}] not crawled, [Disallowed by robots.txt file], set respect-robots-txt = false in the configuration if you would like to ignore robots.txt files.",
                page.uri
            );
            tracing::debug!("{}", reason);
            run.disallow_page(page, &reason);
        }
        allowed
    }

    async fn before_fetch(&self, page: &PageToCrawl, _run: &CrawlRun) {
        self.coordinator.before_fetch(&page.uri).await;
    }

    fn on_root_redirect(&self, _run: &CrawlRun, new_root: &Url) {
        let delay = *self.delay.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            if let Err(e) = self.coordinator.apply_robots_delay(new_root, delay) {
                tracing::warn!("Unable to apply crawl delay for site [{}]: {}", new_root, e);
            }
        }
    }
}

impl CrawlEngineBuilder {
    /// Builds an engine that honours robots.txt and per-domain delays
    ///
    /// Without an explicit rate limiter, a [`DomainRateLimiter`] using
    /// `min-crawl-delay-per-domain-ms` is created; without a robots.txt
    /// source, one fetching over HTTP with the crawl's client settings.
    pub fn build_polite(mut self) -> Result<PoliteCrawlEngine, EngineError> {
        let rate_limiter = match self.rate_limiter.take() {
            Some(rate_limiter) => rate_limiter,
            None => Arc::new(DomainRateLimiter::new(
                self.config.min_crawl_delay_per_domain(),
            )),
        };
        let finder = match self.robots_finder.take() {
            Some(finder) => finder,
            None => Arc::new(HttpRobotsFinder::new(build_http_client(&self.config)?)),
        };

        let strategy = Arc::new(PoliteStrategy::new(rate_limiter, finder));
        let core = self.into_core(strategy)?;
        Ok(PoliteCrawlEngine {
            engine: CrawlEngine::from_core(core),
        })
    }
}

/// Crawl engine that honours robots.txt and per-domain rate limits
///
/// # Example
///
/// ```no_run
/// use sumi_engine::{CrawlConfig, PoliteCrawlEngine};
///
/// # async fn run() -> Result<(), sumi_engine::EngineError> {
/// let config = CrawlConfig {
///     respect_robots_txt: true,
///     min_crawl_delay_per_domain_ms: 1000,
///     ..CrawlConfig::default()
/// };
/// let engine = PoliteCrawlEngine::new(config)?;
/// let result = engine.crawl("https://example.com/").await?;
/// println!("Crawled {} pages", result.crawled_count());
/// # Ok(())
/// # }
/// ```
pub struct PoliteCrawlEngine {
    engine: CrawlEngine,
}

impl PoliteCrawlEngine {
    pub fn new(config: CrawlConfig) -> Result<Self, EngineError> {
        CrawlEngineBuilder::new(config).build_polite()
    }

    /// Returns a builder; finish it with [`CrawlEngineBuilder::build_polite`]
    pub fn builder(config: CrawlConfig) -> CrawlEngineBuilder {
        CrawlEngineBuilder::new(config)
    }

    pub fn config(&self) -> &CrawlConfig {
        self.engine.config()
    }

    pub async fn crawl(&self, root: &str) -> Result<CrawlResult, EngineError> {
        self.engine.crawl(root).await
    }

    pub async fn crawl_with_cancellation(
        &self,
        root: &str,
        cancellation: CancellationToken,
    ) -> Result<CrawlResult, EngineError> {
        self.engine.crawl_with_cancellation(root, cancellation).await
    }
}
