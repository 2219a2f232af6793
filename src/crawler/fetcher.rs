//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the engine, including:
//! - Building the HTTP client from the crawl configuration
//! - Recording request/response timing, status and headers
//! - Asking the content gate before downloading a body
//! - Recording transport failures on the page instead of failing the crawl

use crate::config::CrawlConfig;
use crate::policy::CrawlDecision;
use crate::state::{CrawledPage, PageContent, PageToCrawl};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use reqwest::{redirect::Policy, Client};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Fetch failures that make the fetcher unusable for the rest of the crawl
///
/// Ordinary transport failures (timeouts, refused connections) are not
/// errors; they are recorded on [`CrawledPage::http_error`].
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to build request for [{url}]: {source}")]
    Request {
        url: String,
        source: reqwest::Error,
    },

    #[error("Fetcher failure for [{url}]: {message}")]
    Other { url: String, message: String },
}

/// Content decision consulted once response headers are available
pub type ContentGate<'a> = dyn Fn(&CrawledPage) -> CrawlDecision + Send + Sync + 'a;

/// Fetches a single page
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches `page`
    ///
    /// # Arguments
    ///
    /// * `page` - The page to request
    /// * `should_download` - Decides whether the body is downloaded
    ///
    /// # Returns
    ///
    /// * `Ok(CrawledPage)` - The response, or the transport failure recorded on it
    /// * `Err(FetchError)` - The request could not be attempted
    async fn fetch(
        &self,
        page: PageToCrawl,
        should_download: &ContentGate<'_>,
    ) -> Result<CrawledPage, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// Redirects are followed by the client (up to `max-auto-redirects` hops)
/// when `auto-redirects` is enabled; otherwise they are returned to the
/// engine, which schedules the target itself.
///
/// # Arguments
///
/// * `config` - The crawl configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use sumi_engine::config::CrawlConfig;
/// use sumi_engine::crawler::build_http_client;
///
/// let client = build_http_client(&CrawlConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &CrawlConfig) -> Result<Client, reqwest::Error> {
    let redirect = if config.auto_redirects {
        Policy::limited(config.max_auto_redirects as usize)
    } else {
        Policy::none()
    };

    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(config.http_request_timeout())
        .connect_timeout(Duration::from_secs(10))
        .redirect(redirect)
        .gzip(true)
        .brotli(true)
        .build()
}

/// `reqwest` based fetcher
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Creates a fetcher with a client built from `config`
    pub fn new(config: &CrawlConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
        })
    }
}

/// Classifies a transport error for the page record
fn describe_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        format!("Request timeout: {}", error)
    } else if error.is_connect() {
        format!("Connection failed: {}", error)
    } else if error.is_redirect() {
        format!("Redirect error: {}", error)
    } else {
        error.to_string()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        page: PageToCrawl,
        should_download: &ContentGate<'_>,
    ) -> Result<CrawledPage, FetchError> {
        let request = self
            .client
            .get(page.uri.clone())
            .build()
            .map_err(|source| FetchError::Request {
                url: page.uri.to_string(),
                source,
            })?;

        let mut crawled = CrawledPage::new(page);
        let started = Instant::now();
        crawled.request_started = Utc::now();

        match self.client.execute(request).await {
            Ok(response) => {
                crawled.status = Some(response.status());
                crawled.headers = response.headers().clone();
                crawled.final_uri = Some(response.url().clone());

                let decision = should_download(&crawled);
                if decision.allow {
                    let content_type = crawled
                        .headers
                        .get(CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    match response.bytes().await {
                        Ok(body) => {
                            crawled.content =
                                PageContent::from_bytes(body.to_vec(), content_type.as_deref());
                        }
                        Err(e) => {
                            tracing::warn!(
                                "Failed to read body of [{}]: {}",
                                crawled.page.uri,
                                e
                            );
                            crawled.http_error = Some(describe_error(&e));
                        }
                    }
                } else {
                    tracing::debug!(
                        "Page [{}] content not downloaded, [{}]",
                        crawled.page.uri,
                        decision.reason
                    );
                }
            }
            Err(e) => {
                tracing::warn!("Request to [{}] failed: {}", crawled.page.uri, e);
                crawled.http_error = Some(describe_error(&e));
            }
        }

        crawled.request_completed = Some(Utc::now());
        crawled.elapsed = started.elapsed();
        Ok(crawled)
    }
}
