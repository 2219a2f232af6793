//! HTML link extraction
//!
//! This module handles parsing fetched pages to extract the links to follow:
//! - `<a href>` and `<area href>` elements, plus `<link rel="canonical">`
//! - `<base href>` for resolving relative links
//! - nofollow signals from meta robots, `X-Robots-Tag` and `rel` attributes

use crate::config::CrawlConfig;
use crate::state::CrawledPage;
use scraper::{Html, Selector};
use std::collections::HashSet;
use thiserror::Error;
use url::Url;

/// Link extraction failures
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Invalid selector '{0}'")]
    Selector(String),

    #[error("Extractor failure for [{url}]: {message}")]
    Other { url: String, message: String },
}

/// Extracts the links of a fetched page
pub trait LinkExtractor: Send + Sync {
    /// Returns the absolute URIs linked from `page`, without duplicates
    fn extract_links(&self, page: &CrawledPage) -> Result<Vec<Url>, ExtractError>;
}

/// `scraper` based extractor
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` and `<area href="...">`
/// - `<link rel="canonical" href="...">`
///
/// **Exclude:**
/// - `javascript:`, `mailto:`, `tel:` links and data URIs
/// - Fragment-only links
/// - Anything that does not resolve to an http(s) URL
#[derive(Debug, Clone, Default)]
pub struct HtmlLinkExtractor {
    respect_meta_robots_nofollow: bool,
    respect_x_robots_tag_nofollow: bool,
    respect_anchor_rel_nofollow: bool,
    respect_url_named_anchor: bool,
}

impl HtmlLinkExtractor {
    /// Creates an extractor honouring the nofollow and fragment settings of `config`
    pub fn from_config(config: &CrawlConfig) -> Self {
        Self {
            respect_meta_robots_nofollow: config.respect_meta_robots_nofollow,
            respect_x_robots_tag_nofollow: config.respect_x_robots_tag_nofollow,
            respect_anchor_rel_nofollow: config.respect_anchor_rel_nofollow,
            respect_url_named_anchor: config.respect_url_named_anchor,
        }
    }
}

fn selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|_| ExtractError::Selector(css.to_string()))
}

fn contains_nofollow(value: &str) -> bool {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .any(|token| token.eq_ignore_ascii_case("nofollow") || token.eq_ignore_ascii_case("none"))
}

impl LinkExtractor for HtmlLinkExtractor {
    fn extract_links(&self, page: &CrawledPage) -> Result<Vec<Url>, ExtractError> {
        if self.respect_x_robots_tag_nofollow {
            if let Some(tag) = page.header_str("x-robots-tag") {
                if contains_nofollow(tag) {
                    tracing::debug!("Links on page [{}] not extracted, X-Robots-Tag nofollow", page.page.uri);
                    return Ok(Vec::new());
                }
            }
        }

        let document = Html::parse_document(&page.content.text);

        if self.respect_meta_robots_nofollow {
            let meta = selector("meta[name][content]")?;
            let nofollow = document.select(&meta).any(|element| {
                let name = element.value().attr("name").unwrap_or("");
                let content = element.value().attr("content").unwrap_or("");
                name.eq_ignore_ascii_case("robots") && contains_nofollow(content)
            });
            if nofollow {
                tracing::debug!("Links on page [{}] not extracted, meta robots nofollow", page.page.uri);
                return Ok(Vec::new());
            }
        }

        let page_uri = page.final_uri.as_ref().unwrap_or(&page.page.uri);
        let base_selector = selector("base[href]")?;
        let base_url = document
            .select(&base_selector)
            .next()
            .and_then(|element| element.value().attr("href"))
            .and_then(|href| page_uri.join(href.trim()).ok())
            .unwrap_or_else(|| page_uri.clone());

        let mut seen = HashSet::new();
        let mut links = Vec::new();

        let anchors = selector("a[href], area[href]")?;
        for element in document.select(&anchors) {
            if self.respect_anchor_rel_nofollow
                && element.value().attr("rel").map_or(false, contains_nofollow)
            {
                continue;
            }
            if let Some(href) = element.value().attr("href") {
                if let Some(url) = self.resolve_link(href, &base_url) {
                    if seen.insert(url.as_str().to_string()) {
                        links.push(url);
                    }
                }
            }
        }

        let canonical = selector("link[rel='canonical'][href]")?;
        for element in document.select(&canonical) {
            if let Some(href) = element.value().attr("href") {
                if let Some(url) = self.resolve_link(href, &base_url) {
                    if seen.insert(url.as_str().to_string()) {
                        links.push(url);
                    }
                }
            }
        }

        Ok(links)
    }
}

impl HtmlLinkExtractor {
    /// Resolves a link href to an absolute URL and validates it
    ///
    /// Returns None if the link should be excluded:
    /// - javascript:, mailto:, tel: schemes
    /// - data: URIs
    /// - Fragment-only links
    /// - Invalid URLs
    /// - Non-HTTP(S) URLs after resolution
    fn resolve_link(&self, href: &str, base_url: &Url) -> Option<Url> {
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') {
            return None;
        }

        let lower = href.to_ascii_lowercase();
        if ["javascript:", "mailto:", "tel:", "data:"]
            .iter()
            .any(|scheme| lower.starts_with(scheme))
        {
            return None;
        }

        let absolute = base_url.join(href).ok()?;
        if !crate::url::is_http_scheme(&absolute) {
            return None;
        }
        Some(crate::url::normalize_link(
            absolute,
            self.respect_url_named_anchor,
        ))
    }
}
