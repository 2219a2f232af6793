use crate::policy::{CrawlDecision, PolicyEngine};
use crate::state::{CrawlContext, CrawledPage, PageToCrawl};
use reqwest::StatusCode;

/// Built-in crawl policy driven entirely by [`crate::CrawlConfig`]
///
/// # Rules
///
/// | Check | Denied when |
/// |-------|-------------|
/// | crawl page | redirect chain too long, too deep, not http(s), page cap hit, domain cap hit, external |
/// | crawl links | no content, external page, depth at the limit |
/// | download content | no response, status not 200, content type not allowed, body too large |
/// | recrawl | retries disabled or exhausted, failure not retryable |
#[derive(Debug, Clone, Default)]
pub struct DefaultPolicyEngine;

impl DefaultPolicyEngine {
    pub fn new() -> Self {
        Self
    }
}

/// Statuses worth retrying without a transport error
fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE
}

impl PolicyEngine for DefaultPolicyEngine {
    fn should_crawl_page(&self, page: &PageToCrawl, ctx: &CrawlContext) -> CrawlDecision {
        let config = ctx.config();

        if !config.auto_redirects && page.redirect_position > config.max_auto_redirects {
            return CrawlDecision::denied(format!(
                "HttpRequestMaxAutoRedirects limit of [{}] has been reached",
                config.max_auto_redirects
            ));
        }

        if page.crawl_depth > config.max_crawl_depth {
            return CrawlDecision::denied("Crawl depth is above max");
        }

        if !crate::url::is_http_scheme(&page.uri) {
            return CrawlDecision::denied("Scheme does not begin with http");
        }

        if config.max_pages_to_crawl > 0 {
            // A failing frontier count is reported by the engine's own loop.
            let pending = ctx.pending_count().unwrap_or(0);
            if ctx.crawled_count() + pending + 1 > config.max_pages_to_crawl {
                return CrawlDecision::page_limit(config.max_pages_to_crawl);
            }
        }

        if config.max_pages_per_domain > 0 {
            if let Some(domain) = page.domain() {
                if ctx.count_for_domain(&domain) >= config.max_pages_per_domain {
                    return CrawlDecision::denied(format!(
                        "MaxPagesToCrawlPerDomain limit of [{}] has been reached for domain [{}]",
                        config.max_pages_per_domain, domain
                    ));
                }
            }
        }

        if !config.external_page_crawling && !page.is_internal {
            return CrawlDecision::denied("Link is external");
        }

        CrawlDecision::allowed()
    }

    fn should_crawl_page_links(&self, page: &CrawledPage, ctx: &CrawlContext) -> CrawlDecision {
        let config = ctx.config();

        if page.content.text.trim().is_empty() {
            return CrawlDecision::denied("Page has no content");
        }

        if !config.external_page_links_crawling && !page.page.is_internal {
            return CrawlDecision::denied("Link is external");
        }

        if page.page.crawl_depth >= config.max_crawl_depth {
            return CrawlDecision::denied("Crawl depth is above max");
        }

        CrawlDecision::allowed()
    }

    fn should_download_content(&self, page: &CrawledPage, ctx: &CrawlContext) -> CrawlDecision {
        let config = ctx.config();

        let Some(status) = page.status else {
            return CrawlDecision::denied("No response was received");
        };

        if status != StatusCode::OK {
            return CrawlDecision::denied("HttpStatusCode is not 200");
        }

        let allowed = config.downloadable_content_types();
        match page.content_type() {
            Some(content_type) if allowed.iter().any(|t| *t == content_type) => {}
            _ => {
                return CrawlDecision::denied(format!(
                    "Content type is not any of the following: {}",
                    config.downloadable_content_types
                ));
            }
        }

        if config.max_page_size_bytes > 0 {
            if let Some(length) = page.content_length() {
                if length > config.max_page_size_bytes {
                    return CrawlDecision::denied(format!(
                        "Page size of [{}] bytes is above the max allowable of [{}] bytes",
                        length, config.max_page_size_bytes
                    ));
                }
            }
        }

        CrawlDecision::allowed()
    }

    fn should_recrawl_page(&self, page: &CrawledPage, ctx: &CrawlContext) -> CrawlDecision {
        let config = ctx.config();

        if config.max_retry_count < 1 {
            return CrawlDecision::denied("MaxRetryCount is less than 1");
        }

        if page.page.retry_count >= config.max_retry_count {
            return CrawlDecision::denied("MaxRetryCount has been reached");
        }

        let retryable = page.http_error.is_some() || page.status.map_or(false, is_retryable_status);
        if !retryable {
            return CrawlDecision::denied("Page did not fail with a retryable error");
        }

        CrawlDecision::allowed()
    }
}
