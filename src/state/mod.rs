//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlContext`: Per-crawl counters, stop flags and host extension values
//! - `PageToCrawl` / `CrawledPage`: A scheduled request and its fetched result
//! - `CrawlPhase`: Lifecycle phases of a crawl invocation
//! - `CrawlResult`: Snapshot returned to the host when a crawl ends

mod context;
mod page;
mod phase;

// Re-export main types
pub use context::{CrawlContext, CrawlResult, ExtensionBag};
pub use page::{CrawledPage, PageContent, PageToCrawl};
pub use phase::CrawlPhase;
