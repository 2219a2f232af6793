//! Crawler module for web page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - The frontier of pages waiting to be fetched
//! - HTTP fetching and HTML link extraction
//! - The bounded worker pool pages are dispatched to
//! - Lifecycle hooks, redirect following and retries
//! - The crawl engines that coordinate all of the above

mod engine;
mod fetcher;
mod hooks;
mod parser;
mod polite;
mod pool;
mod redirect;
mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{CrawlEngine, CrawlEngineBuilder};
pub use fetcher::{build_http_client, ContentGate, FetchError, Fetcher, HttpFetcher};
pub use hooks::{
    CrawlHooks, HookMode, PageCrawlCompletedArgs, PageCrawlDisallowedArgs, PageCrawlStartingArgs,
    PageLinksCrawlDisallowedArgs, RobotsTxtParsedArgs,
};
pub use parser::{ExtractError, HtmlLinkExtractor, LinkExtractor};
pub use polite::PoliteCrawlEngine;
pub use pool::{PoolError, WorkError, WorkerPool, MAX_CONCURRENCY, MIN_CONCURRENCY};
pub use redirect::{parse_retry_after, RedirectRetryTracker, MAX_REDIRECT_CHAIN};
pub use scheduler::{FrontierError, InMemoryScheduler, Scheduler};
