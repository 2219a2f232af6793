//! Robots.txt handling module
//!
//! This module provides functionality for fetching and parsing robots.txt
//! files for a crawl root.

mod parser;

pub use parser::RobotsTxt;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

/// Locates the robots.txt directives for a crawl root
#[async_trait]
pub trait RobotsFinder: Send + Sync {
    /// Fetches robots.txt for the authority of `root`
    ///
    /// # Returns
    ///
    /// * `Some(RobotsTxt)` - robots.txt was found and parsed
    /// * `None` - No usable robots.txt
    async fn find(&self, root: &Url) -> Option<RobotsTxt>;
}

/// Returns the robots.txt location for the authority of `root`
pub fn robots_url(root: &Url) -> Option<Url> {
    root.join("/robots.txt").ok()
}

/// Fetches robots.txt over HTTP
#[derive(Debug, Clone)]
pub struct HttpRobotsFinder {
    client: Client,
}

impl HttpRobotsFinder {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RobotsFinder for HttpRobotsFinder {
    async fn find(&self, root: &Url) -> Option<RobotsTxt> {
        let url = robots_url(root)?;

        let response = match self.client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("Failed to fetch robots.txt from [{}]: {}", url, e);
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::debug!(
                "Did not find robots.txt file at [{}], status {}",
                url,
                response.status()
            );
            return None;
        }

        match response.text().await {
            Ok(body) => {
                tracing::debug!("Found robots.txt file at [{}]", url);
                Some(RobotsTxt::from_content(&body))
            }
            Err(e) => {
                tracing::debug!("Failed to read robots.txt from [{}]: {}", url, e);
                None
            }
        }
    }
}
