use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Immutable crawl configuration snapshot
///
/// Every field has a default so an empty TOML document is a valid
/// configuration. Zero means "disabled" or "unlimited" for the numeric limits
/// documented that way.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlConfig {
    /// Maximum number of pages processed concurrently (1..=100)
    pub max_concurrent_pages: usize,

    /// Maximum number of pages crawled in total (0 = unlimited)
    pub max_pages_to_crawl: u64,

    /// Maximum number of pages crawled per domain (0 = unlimited)
    pub max_pages_per_domain: u64,

    /// Pages with a body larger than this are not processed further (0 = unlimited)
    pub max_page_size_bytes: u64,

    /// Maximum link depth from the root page
    pub max_crawl_depth: u32,

    /// Maximum number of links scheduled from a single page (0 = unlimited)
    pub max_links_per_page: usize,

    /// Crawl-wide timeout in seconds (0 = none)
    pub crawl_timeout_seconds: u64,

    /// Whether pages on other domains may be crawled
    pub external_page_crawling: bool,

    /// Whether links found on external pages may be crawled
    pub external_page_links_crawling: bool,

    /// Whether an already known URL may be scheduled again
    pub uri_recrawling: bool,

    /// Extract links even when the links policy denies scheduling them
    pub forced_link_parsing: bool,

    /// Let the HTTP client follow redirects; otherwise the engine follows them
    pub auto_redirects: bool,

    /// Maximum redirect hops (client limit in auto mode, policy limit in manual mode)
    pub max_auto_redirects: u32,

    /// Maximum number of times a single page is retried (0 = no retries)
    pub max_retry_count: u32,

    /// Minimum delay before a retry when no Retry-After header was sent
    pub min_retry_delay_ms: u64,

    /// Memory headroom required before a crawl starts (0 = disabled)
    pub min_available_memory_mb: u64,

    /// Memory ceiling that hard stops the crawl when exceeded (0 = disabled)
    pub max_memory_usage_mb: u64,

    /// How long a sampled memory value is cached (0 = sample on every check)
    pub memory_cache_seconds: u64,

    /// Whether robots.txt is fetched and respected
    pub respect_robots_txt: bool,

    /// Ignore robots.txt for the whole crawl when it disallows the root
    pub ignore_robots_if_root_disallowed: bool,

    /// User agent matched against robots.txt groups
    pub robots_user_agent: String,

    /// Upper bound applied to a robots.txt Crawl-delay
    pub max_robots_crawl_delay_seconds: u64,

    /// Minimum delay between two requests to the same domain
    pub min_crawl_delay_per_domain_ms: u64,

    /// User-Agent header sent with every request
    pub user_agent: String,

    /// Per-request timeout
    pub http_request_timeout_seconds: u64,

    /// Comma separated list of content types whose bodies are downloaded
    pub downloadable_content_types: String,

    /// Skip link extraction when `<meta name="robots" content="nofollow">` is present
    pub respect_meta_robots_nofollow: bool,

    /// Skip link extraction when the `X-Robots-Tag` header contains nofollow
    pub respect_x_robots_tag_nofollow: bool,

    /// Skip anchors carrying `rel="nofollow"`
    pub respect_anchor_rel_nofollow: bool,

    /// Treat URLs differing only by fragment as distinct links
    pub respect_url_named_anchor: bool,

    /// Upper bound of the control loop's wait while workers are busy
    pub poll_interval_ms: u64,

    /// Free-form host values
    pub extensions: HashMap<String, String>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self {
            max_concurrent_pages: parallelism.clamp(1, 100),
            max_pages_to_crawl: 1000,
            max_pages_per_domain: 0,
            max_page_size_bytes: 0,
            max_crawl_depth: 100,
            max_links_per_page: 0,
            crawl_timeout_seconds: 0,
            external_page_crawling: false,
            external_page_links_crawling: false,
            uri_recrawling: false,
            forced_link_parsing: false,
            auto_redirects: true,
            max_auto_redirects: 7,
            max_retry_count: 0,
            min_retry_delay_ms: 0,
            min_available_memory_mb: 0,
            max_memory_usage_mb: 0,
            memory_cache_seconds: 0,
            respect_robots_txt: false,
            ignore_robots_if_root_disallowed: false,
            robots_user_agent: "sumi".to_string(),
            max_robots_crawl_delay_seconds: 5,
            min_crawl_delay_per_domain_ms: 0,
            user_agent: format!("Mozilla/5.0 (compatible; sumi-engine/{})", env!("CARGO_PKG_VERSION")),
            http_request_timeout_seconds: 15,
            downloadable_content_types: "text/html, text/plain".to_string(),
            respect_meta_robots_nofollow: false,
            respect_x_robots_tag_nofollow: false,
            respect_anchor_rel_nofollow: false,
            respect_url_named_anchor: false,
            poll_interval_ms: 2500,
            extensions: HashMap::new(),
        }
    }
}

impl CrawlConfig {
    /// Returns the crawl timeout, or None when no timeout is configured
    pub fn crawl_timeout(&self) -> Option<Duration> {
        (self.crawl_timeout_seconds > 0).then(|| Duration::from_secs(self.crawl_timeout_seconds))
    }

    /// Returns the minimum delay before a retry
    pub fn min_retry_delay(&self) -> Duration {
        Duration::from_millis(self.min_retry_delay_ms)
    }

    /// Returns the default per-domain delay
    pub fn min_crawl_delay_per_domain(&self) -> Duration {
        Duration::from_millis(self.min_crawl_delay_per_domain_ms)
    }

    /// Returns the memory sample cache interval (zero disables caching)
    pub fn memory_cache_interval(&self) -> Duration {
        Duration::from_secs(self.memory_cache_seconds)
    }

    /// Returns the control loop's maximum wait between polls
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Returns the HTTP request timeout
    pub fn http_request_timeout(&self) -> Duration {
        Duration::from_secs(self.http_request_timeout_seconds)
    }

    /// Returns true if memory sampling is needed for this configuration
    pub fn is_memory_guard_enabled(&self) -> bool {
        self.min_available_memory_mb > 0 || self.max_memory_usage_mb > 0
    }

    /// Returns the configured downloadable content types, lowercased and trimmed
    pub fn downloadable_content_types(&self) -> Vec<String> {
        self.downloadable_content_types
            .split(',')
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect()
    }

    /// Logs every configuration value, one line per field
    pub fn log_values(&self) {
        tracing::info!("Configuration Values:");
        tracing::info!("  max-concurrent-pages: {}", self.max_concurrent_pages);
        tracing::info!("  max-pages-to-crawl: {}", self.max_pages_to_crawl);
        tracing::info!("  max-pages-per-domain: {}", self.max_pages_per_domain);
        tracing::info!("  max-page-size-bytes: {}", self.max_page_size_bytes);
        tracing::info!("  max-crawl-depth: {}", self.max_crawl_depth);
        tracing::info!("  max-links-per-page: {}", self.max_links_per_page);
        tracing::info!("  crawl-timeout-seconds: {}", self.crawl_timeout_seconds);
        tracing::info!("  external-page-crawling: {}", self.external_page_crawling);
        tracing::info!(
            "  external-page-links-crawling: {}",
            self.external_page_links_crawling
        );
        tracing::info!("  uri-recrawling: {}", self.uri_recrawling);
        tracing::info!("  forced-link-parsing: {}", self.forced_link_parsing);
        tracing::info!("  auto-redirects: {}", self.auto_redirects);
        tracing::info!("  max-auto-redirects: {}", self.max_auto_redirects);
        tracing::info!("  max-retry-count: {}", self.max_retry_count);
        tracing::info!("  min-retry-delay-ms: {}", self.min_retry_delay_ms);
        tracing::info!("  min-available-memory-mb: {}", self.min_available_memory_mb);
        tracing::info!("  max-memory-usage-mb: {}", self.max_memory_usage_mb);
        tracing::info!("  memory-cache-seconds: {}", self.memory_cache_seconds);
        tracing::info!("  respect-robots-txt: {}", self.respect_robots_txt);
        tracing::info!(
            "  ignore-robots-if-root-disallowed: {}",
            self.ignore_robots_if_root_disallowed
        );
        tracing::info!("  robots-user-agent: {}", self.robots_user_agent);
        tracing::info!(
            "  max-robots-crawl-delay-seconds: {}",
            self.max_robots_crawl_delay_seconds
        );
        tracing::info!(
            "  min-crawl-delay-per-domain-ms: {}",
            self.min_crawl_delay_per_domain_ms
        );
        tracing::info!("  user-agent: {}", self.user_agent);
        tracing::info!(
            "  http-request-timeout-seconds: {}",
            self.http_request_timeout_seconds
        );
        tracing::info!(
            "  downloadable-content-types: {}",
            self.downloadable_content_types
        );
        tracing::info!(
            "  respect-meta-robots-nofollow: {}",
            self.respect_meta_robots_nofollow
        );
        tracing::info!(
            "  respect-x-robots-tag-nofollow: {}",
            self.respect_x_robots_tag_nofollow
        );
        tracing::info!(
            "  respect-anchor-rel-nofollow: {}",
            self.respect_anchor_rel_nofollow
        );
        tracing::info!("  respect-url-named-anchor: {}", self.respect_url_named_anchor);
        tracing::info!("  poll-interval-ms: {}", self.poll_interval_ms);
        for (key, value) in &self.extensions {
            tracing::info!("  extensions.{}: {}", key, value);
        }
    }
}
