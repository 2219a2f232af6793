//! Redirect successors and retry timing
//!
//! In manual-redirect mode a 3xx response is turned into a successor page
//! that the engine schedules like any other link. Retries are delayed until
//! the server's Retry-After (or the configured minimum) has elapsed since
//! the previous attempt.

use crate::config::CrawlConfig;
use crate::state::{CrawledPage, PageToCrawl};
use chrono::{DateTime, Utc};
use reqwest::header::LOCATION;
use std::time::{Duration, Instant};
use url::Url;

/// Longest redirect chain the engine will follow
pub const MAX_REDIRECT_CHAIN: u32 = 20;

/// Recognises redirects, builds their successors, and computes retry waits
#[derive(Debug, Clone)]
pub struct RedirectRetryTracker {
    auto_redirects: bool,
    min_retry_delay: Duration,
}

impl RedirectRetryTracker {
    pub fn new(auto_redirects: bool, min_retry_delay: Duration) -> Self {
        Self {
            auto_redirects,
            min_retry_delay,
        }
    }

    pub fn from_config(config: &CrawlConfig) -> Self {
        Self::new(config.auto_redirects, config.min_retry_delay())
    }

    /// Returns true if `page` was redirected
    ///
    /// With automatic redirects the final URI differs from the requested
    /// one; otherwise the response carries a 3xx status.
    pub fn is_redirect(&self, page: &CrawledPage) -> bool {
        if self.auto_redirects {
            page.final_uri
                .as_ref()
                .map_or(false, |final_uri| final_uri != &page.page.uri)
        } else {
            page.status.map_or(false, |status| status.is_redirection())
        }
    }

    /// Returns the URI the redirect points at
    ///
    /// A relative `Location` is resolved against the requested URI.
    pub fn extract_redirect_target(&self, page: &CrawledPage) -> Option<Url> {
        if self.auto_redirects {
            return page.final_uri.clone();
        }

        let location = page.headers.get(LOCATION)?.to_str().ok()?.trim();
        if location.is_empty() {
            return None;
        }
        page.page.uri.join(location).ok()
    }

    /// Builds the page that continues the redirect chain of `page`
    ///
    /// The successor keeps the parent and depth of the redirecting page and
    /// sits one position further along the chain.
    pub fn build_successor(&self, page: &CrawledPage, target: Url) -> PageToCrawl {
        let source = &page.page;
        if source.redirect_position >= MAX_REDIRECT_CHAIN {
            tracing::warn!(
                "Page [{}] is part of a chain of {} or more consecutive redirects, redirects for this chain will now be aborted.",
                source.uri,
                MAX_REDIRECT_CHAIN
            );
        }

        let mut successor = PageToCrawl::new(target);
        successor.parent_uri = source.parent_uri.clone();
        successor.crawl_depth = source.crawl_depth;
        successor.is_internal = source.is_internal;
        successor.redirected_from = Some(source.uri.clone());
        successor.redirect_position = source.redirect_position + 1;
        successor.bag = source.bag.clone();
        successor
    }

    /// Milliseconds still to wait before retrying `page`
    ///
    /// Negative or zero means the retry may go out immediately.
    pub fn retry_wait_ms(&self, page: &PageToCrawl, now: Instant) -> i64 {
        let since_last_ms = page
            .last_request
            .map(|last| now.saturating_duration_since(last).as_millis() as i64)
            .unwrap_or(0);

        let required_ms = match page.retry_after_seconds {
            Some(seconds) => (seconds * 1000.0).round() as i64,
            None => self.min_retry_delay.as_millis() as i64,
        };

        required_ms - since_last_ms
    }

    /// Returns how long to sleep before retrying `page`, if at all
    pub fn retry_delay(&self, page: &PageToCrawl, now: Instant) -> Option<Duration> {
        let wait_ms = self.retry_wait_ms(page, now);
        (wait_ms > 0).then(|| Duration::from_millis(wait_ms as u64))
    }
}

/// Parses a Retry-After header value into seconds
///
/// Accepts delta-seconds or an HTTP date; a date in the past yields zero.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<f64> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(seconds as f64);
    }

    let date = DateTime::parse_from_rfc2822(value).ok()?;
    let millis = (date.with_timezone(&Utc) - now).num_milliseconds();
    Some(millis.max(0) as f64 / 1000.0)
}
