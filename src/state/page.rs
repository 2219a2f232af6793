use crate::state::ExtensionBag;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::StatusCode;
use std::time::{Duration, Instant};
use url::Url;

/// A URI scheduled for fetching
#[derive(Debug, Clone)]
pub struct PageToCrawl {
    /// The URI to fetch
    pub uri: Url,

    /// The page this URI was discovered on (None for the root)
    pub parent_uri: Option<Url>,

    /// Link distance from the root page (root = 0)
    pub crawl_depth: u32,

    /// Whether this is the crawl's root page
    pub is_root: bool,

    /// Whether this URI shares its authority with the crawl root
    pub is_internal: bool,

    /// Whether this page is being fetched again after a previous attempt
    pub is_retry: bool,

    /// Number of retries performed so far
    pub retry_count: u32,

    /// When the previous attempt was sent
    pub last_request: Option<Instant>,

    /// Retry-After value from the previous response, in seconds
    pub retry_after_seconds: Option<f64>,

    /// The page whose redirect produced this one (informational)
    pub redirected_from: Option<Url>,

    /// Position of this page in its redirect chain (0 = not a redirect target)
    pub redirect_position: u32,

    /// Host values copied onto the resulting crawled page
    pub bag: ExtensionBag,
}

impl PageToCrawl {
    /// Creates a page for a discovered URI
    pub fn new(uri: Url) -> Self {
        Self {
            uri,
            parent_uri: None,
            crawl_depth: 0,
            is_root: false,
            is_internal: false,
            is_retry: false,
            retry_count: 0,
            last_request: None,
            retry_after_seconds: None,
            redirected_from: None,
            redirect_position: 0,
            bag: ExtensionBag::default(),
        }
    }

    /// Creates the root page of a crawl
    pub fn root(uri: Url) -> Self {
        Self {
            is_root: true,
            is_internal: true,
            ..Self::new(uri)
        }
    }

    /// Creates a page for a link found on `parent`
    pub fn discovered(uri: Url, parent: &PageToCrawl, is_internal: bool) -> Self {
        Self {
            parent_uri: Some(parent.uri.clone()),
            crawl_depth: parent.crawl_depth + 1,
            is_internal,
            ..Self::new(uri)
        }
    }

    /// Returns the page's authority key, if it has a host
    pub fn domain(&self) -> Option<String> {
        crate::url::domain_key(&self.uri)
    }
}

/// Raw and decoded body of a response
#[derive(Debug, Clone, Default)]
pub struct PageContent {
    /// Raw body bytes
    pub bytes: Vec<u8>,

    /// Body decoded as text (lossy UTF-8)
    pub text: String,

    /// Charset declared in the Content-Type header
    pub charset: Option<String>,
}

impl PageContent {
    /// Builds content from a body and its Content-Type header value
    pub fn from_bytes(bytes: Vec<u8>, content_type: Option<&str>) -> Self {
        let charset = content_type.and_then(|ct| {
            ct.split(';')
                .map(str::trim)
                .find_map(|part| {
                    let (key, value) = part.split_once('=')?;
                    key.trim()
                        .eq_ignore_ascii_case("charset")
                        .then(|| value.trim().trim_matches('"').to_lowercase())
                })
        });
        let text = String::from_utf8_lossy(&bytes).into_owned();

        Self {
            bytes,
            text,
            charset,
        }
    }

    /// Returns true if no body was downloaded
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Result of fetching a [`PageToCrawl`]
#[derive(Debug, Clone)]
pub struct CrawledPage {
    /// The request this page answers
    pub page: PageToCrawl,

    /// URI of the final response (differs from `page.uri` after client redirects)
    pub final_uri: Option<Url>,

    /// Response status, None on transport failure
    pub status: Option<StatusCode>,

    /// Response headers
    pub headers: HeaderMap,

    /// Downloaded body (empty when the content decision denied the download)
    pub content: PageContent,

    /// Transport error description, if the request failed
    pub http_error: Option<String>,

    /// When the request was sent
    pub request_started: DateTime<Utc>,

    /// When the response (or failure) was received
    pub request_completed: Option<DateTime<Utc>>,

    /// Request duration
    pub elapsed: Duration,

    /// Links extracted from the body
    pub parsed_links: Vec<Url>,
}

impl CrawledPage {
    /// Creates an empty result for `page`, stamped with the current time
    pub fn new(page: PageToCrawl) -> Self {
        Self {
            page,
            final_uri: None,
            status: None,
            headers: HeaderMap::new(),
            content: PageContent::default(),
            http_error: None,
            request_started: Utc::now(),
            request_completed: None,
            elapsed: Duration::ZERO,
            parsed_links: Vec::new(),
        }
    }

    /// Returns the URI that was requested
    pub fn request_uri(&self) -> &Url {
        &self.page.uri
    }

    /// Returns true if a response was received
    pub fn has_response(&self) -> bool {
        self.status.is_some()
    }

    /// Returns a header value as a string
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the media type of the response, lowercased and without parameters
    pub fn content_type(&self) -> Option<String> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_lowercase())
            .filter(|v| !v.is_empty())
    }

    /// Returns the declared Content-Length
    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    }

    /// Returns the body size: downloaded bytes, or the declared length if nothing was downloaded
    pub fn content_size(&self) -> u64 {
        if self.content.is_empty() {
            self.content_length().unwrap_or(0)
        } else {
            self.content.bytes.len() as u64
        }
    }
}
