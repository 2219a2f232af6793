//! In-memory collaborators for engine tests

use crate::crawler::fetcher::{ContentGate, FetchError, Fetcher};
use crate::policy::{CrawlDecision, DefaultPolicyEngine, PolicyEngine};
use crate::politeness::{RateLimitError, RateLimiter};
use crate::resource::{MemoryError, MemoryMonitor};
use crate::robots::{RobotsFinder, RobotsTxt};
use crate::state::{CrawlContext, CrawledPage, PageContent, PageToCrawl};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use reqwest::StatusCode;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

struct FakeResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
}

/// Scripted site served through the [`Fetcher`] trait
///
/// Unknown paths answer 404. Every request is logged with the tokio clock,
/// so paused-time tests can assert on pacing.
pub(crate) struct FakeSite {
    responses: HashMap<String, FakeResponse>,
    panics: HashSet<String>,
    latency: Duration,
    content_length: bool,
    base: String,
    fetches: Mutex<Vec<(String, Instant)>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

pub(crate) struct FakeSiteBuilder {
    site: FakeSite,
}

impl FakeSite {
    #[allow(clippy::new_ret_no_self)]
    pub(crate) fn new(base: &str) -> FakeSiteBuilder {
        FakeSiteBuilder {
            site: FakeSite {
                responses: HashMap::new(),
                panics: HashSet::new(),
                latency: Duration::ZERO,
                content_length: true,
                base: base.trim_end_matches('/').to_string(),
                fetches: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            },
        }
    }

    fn key(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub(crate) fn fetch_count(&self, path: &str) -> usize {
        self.fetch_count_uri(&self.key(path))
    }

    pub(crate) fn fetch_count_uri(&self, uri: &str) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .iter()
            .filter(|(fetched, _)| fetched == uri)
            .count()
    }

    /// Start times of every request for `path`
    pub(crate) fn fetch_times(&self, path: &str) -> Vec<Instant> {
        let key = self.key(path);
        self.fetches
            .lock()
            .unwrap()
            .iter()
            .filter(|(fetched, _)| *fetched == key)
            .map(|(_, at)| *at)
            .collect()
    }

    /// Start times of every request, in order
    pub(crate) fn all_fetch_times(&self) -> Vec<Instant> {
        self.fetches.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }

    pub(crate) fn total_fetches(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }

    pub(crate) fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl FakeSiteBuilder {
    /// Serves an HTML page at `path` linking to `links`
    pub(crate) fn page(mut self, path: &str, links: &[&str]) -> Self {
        let anchors: String = links
            .iter()
            .map(|link| format!("<a href=\"{}\">{}</a>", link, link))
            .collect();
        let body = format!("<html><body><h1>{}</h1>{}</body></html>", path, anchors);
        let key = self.site.key(path);
        self.site.responses.insert(
            key,
            FakeResponse {
                status: 200,
                headers: vec![("content-type".into(), "text/html; charset=utf-8".into())],
                body,
            },
        );
        self
    }

    /// Answers `path` with a redirect to `location`
    pub(crate) fn redirect(mut self, path: &str, status: u16, location: &str) -> Self {
        let key = self.site.key(path);
        self.site.responses.insert(
            key,
            FakeResponse {
                status,
                headers: vec![
                    ("content-type".into(), "text/html".into()),
                    (LOCATION.as_str().into(), location.into()),
                ],
                body: String::new(),
            },
        );
        self
    }

    /// Answers `path` with an empty response
    pub(crate) fn status(mut self, path: &str, status: u16, headers: &[(&str, &str)]) -> Self {
        let key = self.site.key(path);
        let mut all = vec![("content-type".to_string(), "text/html".to_string())];
        all.extend(headers.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        self.site.responses.insert(
            key,
            FakeResponse {
                status,
                headers: all,
                body: String::new(),
            },
        );
        self
    }

    /// Makes the fetcher panic when `path` is requested
    pub(crate) fn panic_on(mut self, path: &str) -> Self {
        let key = self.site.key(path);
        self.site.panics.insert(key);
        self
    }

    pub(crate) fn latency(mut self, latency: Duration) -> Self {
        self.site.latency = latency;
        self
    }

    /// Omits Content-Length so size checks happen after download
    pub(crate) fn without_content_length(mut self) -> Self {
        self.site.content_length = false;
        self
    }

    pub(crate) fn build(self) -> Arc<FakeSite> {
        Arc::new(self.site)
    }
}

#[async_trait]
impl Fetcher for FakeSite {
    async fn fetch(
        &self,
        page: PageToCrawl,
        should_download: &ContentGate<'_>,
    ) -> Result<CrawledPage, FetchError> {
        let key = page.uri.to_string();
        self.fetches.lock().unwrap().push((key.clone(), Instant::now()));
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panics.contains(&key) {
            panic!("scripted fetcher failure for {}", key);
        }

        let mut crawled = CrawledPage::new(page);
        crawled.request_started = Utc::now();
        crawled.final_uri = Some(crawled.page.uri.clone());

        let (status, headers, body) = match self.responses.get(&key) {
            Some(response) => (response.status, response.headers.as_slice(), response.body.as_str()),
            None => (404, &[][..], ""),
        };

        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            header_map.insert(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        if self.content_length {
            header_map.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        }
        crawled.status = Some(StatusCode::from_u16(status).unwrap());
        crawled.headers = header_map;

        if should_download(&crawled).allow {
            let content_type = crawled
                .headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            crawled.content =
                PageContent::from_bytes(body.as_bytes().to_vec(), content_type.as_deref());
        }

        crawled.request_completed = Some(Utc::now());
        Ok(crawled)
    }
}

/// Memory monitor reporting fixed figures
pub(crate) struct FakeMemoryMonitor {
    usage_mb: AtomicU64,
    available_mb: Option<u64>,
}

impl FakeMemoryMonitor {
    pub(crate) fn new(usage_mb: u64, available_mb: Option<u64>) -> Arc<Self> {
        Arc::new(Self {
            usage_mb: AtomicU64::new(usage_mb),
            available_mb,
        })
    }
}

impl MemoryMonitor for FakeMemoryMonitor {
    fn current_usage_mb(&self) -> Result<u64, MemoryError> {
        Ok(self.usage_mb.load(Ordering::SeqCst))
    }

    fn available_mb(&self) -> Result<u64, MemoryError> {
        self.available_mb.ok_or(MemoryError::Unsupported)
    }
}

/// robots.txt source serving fixed content
pub(crate) struct FakeRobotsFinder {
    content: Option<String>,
    lookups: Mutex<Vec<Url>>,
}

impl FakeRobotsFinder {
    pub(crate) fn new(content: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            content: content.map(str::to_string),
            lookups: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn lookups(&self) -> Vec<Url> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl RobotsFinder for FakeRobotsFinder {
    async fn find(&self, root: &Url) -> Option<RobotsTxt> {
        self.lookups.lock().unwrap().push(root.clone());
        self.content.as_deref().map(RobotsTxt::from_content)
    }
}

/// Rate limiter that never waits and records every call
pub(crate) struct CountingRateLimiter {
    throttled: Mutex<Vec<Url>>,
    registered: Mutex<Vec<(Url, Duration)>>,
}

impl CountingRateLimiter {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            throttled: Mutex::new(Vec::new()),
            registered: Mutex::new(Vec::new()),
        })
    }

    /// URIs passed to `throttle`, in call order
    pub(crate) fn throttled(&self) -> Vec<Url> {
        self.throttled.lock().unwrap().clone()
    }

    pub(crate) fn registered(&self) -> Vec<(Url, Duration)> {
        self.registered.lock().unwrap().clone()
    }
}

#[async_trait]
impl RateLimiter for CountingRateLimiter {
    fn register_domain_delay(&self, uri: &Url, delay: Duration) -> Result<(), RateLimitError> {
        self.registered.lock().unwrap().push((uri.clone(), delay));
        Ok(())
    }

    async fn throttle(&self, uri: &Url) {
        self.throttled.lock().unwrap().push(uri.clone());
    }
}

/// Default policy that counts recrawl decisions
#[derive(Default)]
pub(crate) struct CountingPolicy {
    inner: DefaultPolicyEngine,
    recrawl_calls: AtomicUsize,
}

impl CountingPolicy {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn recrawl_calls(&self) -> usize {
        self.recrawl_calls.load(Ordering::SeqCst)
    }
}

impl PolicyEngine for CountingPolicy {
    fn should_crawl_page(&self, page: &PageToCrawl, ctx: &CrawlContext) -> CrawlDecision {
        self.inner.should_crawl_page(page, ctx)
    }

    fn should_crawl_page_links(&self, page: &CrawledPage, ctx: &CrawlContext) -> CrawlDecision {
        self.inner.should_crawl_page_links(page, ctx)
    }

    fn should_download_content(&self, page: &CrawledPage, ctx: &CrawlContext) -> CrawlDecision {
        self.inner.should_download_content(page, ctx)
    }

    fn should_recrawl_page(&self, page: &CrawledPage, ctx: &CrawlContext) -> CrawlDecision {
        self.recrawl_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.should_recrawl_page(page, ctx)
    }
}
