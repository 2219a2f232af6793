//! Sumi-Engine: a polite, concurrent crawl engine
//!
//! This crate implements an embeddable crawl orchestrator. Given a root URL it
//! discovers, fetches and expands a frontier of pages while respecting
//! per-domain rate limits, robots.txt directives, memory ceilings, timeouts and
//! cooperative stop/cancel requests. Hosts observe the crawl through lifecycle
//! hooks and steer it through pluggable policy decisions.

pub mod config;
pub mod crawler;
pub mod policy;
pub mod politeness;
pub mod resource;
pub mod robots;
pub mod state;
pub mod url;

use thiserror::Error;

/// Top-level error type for engine construction and invocation
///
/// Failures that happen *during* a crawl are never returned through this type;
/// they are recorded on [`CrawlResult`] as a [`CrawlError`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid root URL '{url}': {source}")]
    InvalidRoot {
        url: String,
        source: ::url::ParseError,
    },

    #[error("Unsupported scheme for root URL '{0}', expected http or https")]
    UnsupportedScheme(String),

    #[error("A crawl is already running on this engine")]
    AlreadyRunning,

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Worker pool error: {0}")]
    Pool(#[from] crawler::PoolError),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Terminal error of a single crawl, reported through [`CrawlResult::error`]
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Process does not have the configured [{required_mb}mb] of available memory to crawl site [{url}]")]
    InsufficientMemory { required_mb: u64, url: String },

    #[error("Process is using [{usage_mb}mb] of memory which is above the max configured of [{max_mb}mb] for site [{url}]")]
    MemoryLimitExceeded {
        usage_mb: u64,
        max_mb: u64,
        url: String,
    },

    #[error("Crawl cancellation requested for site [{url}]!")]
    Cancelled { url: String },

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("Link extraction error: {0}")]
    LinkExtraction(#[from] crawler::ExtractError),

    #[error("Frontier error: {0}")]
    Frontier(#[from] crawler::FrontierError),

    #[error("Worker panicked while processing page [{url}]: {message}")]
    WorkerPanic { url: String, message: String },
}

impl CrawlError {
    /// Returns true if this error was caused by the host's cancellation handle
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::CrawlConfig;
pub use crawler::{CrawlEngine, CrawlEngineBuilder, CrawlHooks, HookMode, PoliteCrawlEngine};
pub use policy::{CrawlDecision, PolicyEngine};
pub use state::{CrawlContext, CrawlPhase, CrawlResult, CrawledPage, ExtensionBag, PageToCrawl};
pub use tokio_util::sync::CancellationToken;
