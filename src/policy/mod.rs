//! Crawl policy decisions
//!
//! The engine asks a [`PolicyEngine`] four questions while processing a page:
//! may this page be crawled, may its links be crawled, may its body be
//! downloaded, and should it be fetched again. Hosts can add their own
//! decision on top of each built-in check through [`DecisionOverrides`]; an
//! override is only consulted once the built-in check has allowed the page.

mod default;

pub use default::DefaultPolicyEngine;

use crate::state::{CrawlContext, CrawledPage, PageToCrawl};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use url::Url;

/// Verdict of a single policy check
///
/// Any decision may also ask the engine to stop the whole crawl.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlDecision {
    /// Whether the checked action may proceed
    pub allow: bool,

    /// Why the action was denied (empty when allowed)
    pub reason: String,

    /// Request a soft stop of the crawl
    pub should_stop_crawl: bool,

    /// Request a hard stop of the crawl
    pub should_hard_stop_crawl: bool,

    /// The denial was caused by the crawl-wide page cap
    pub page_limit_reached: bool,
}

impl CrawlDecision {
    /// An allowing decision
    pub fn allowed() -> Self {
        Self {
            allow: true,
            ..Self::default()
        }
    }

    /// A denying decision with a reason
    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            allow: false,
            reason: reason.into(),
            ..Self::default()
        }
    }

    /// The denial produced when the crawl-wide page cap is hit
    pub fn page_limit(limit: u64) -> Self {
        Self {
            page_limit_reached: true,
            ..Self::denied(format!(
                "MaxPagesToCrawl limit of [{}] has been reached",
                limit
            ))
        }
    }

    /// Marks this decision as requesting a soft stop
    pub fn with_stop(mut self) -> Self {
        self.should_stop_crawl = true;
        self
    }

    /// Marks this decision as requesting a hard stop
    pub fn with_hard_stop(mut self) -> Self {
        self.should_hard_stop_crawl = true;
        self
    }
}

/// Pluggable crawl policy
pub trait PolicyEngine: Send + Sync {
    /// Decides whether a page may be scheduled and fetched
    fn should_crawl_page(&self, page: &PageToCrawl, ctx: &CrawlContext) -> CrawlDecision;

    /// Decides whether the links of a fetched page may be scheduled
    fn should_crawl_page_links(&self, page: &CrawledPage, ctx: &CrawlContext) -> CrawlDecision;

    /// Decides whether the body of a response should be downloaded
    ///
    /// Called by the fetcher once headers are available.
    fn should_download_content(&self, page: &CrawledPage, ctx: &CrawlContext) -> CrawlDecision;

    /// Decides whether a fetched page should be fetched again
    fn should_recrawl_page(&self, page: &CrawledPage, ctx: &CrawlContext) -> CrawlDecision;
}

/// Host decision about a page that has not been fetched yet
pub trait PageDecisionMaker: Send + Sync {
    fn decide(&self, page: &PageToCrawl, ctx: &CrawlContext) -> CrawlDecision;
}

impl<F> PageDecisionMaker for F
where
    F: Fn(&PageToCrawl, &CrawlContext) -> CrawlDecision + Send + Sync,
{
    fn decide(&self, page: &PageToCrawl, ctx: &CrawlContext) -> CrawlDecision {
        self(page, ctx)
    }
}

/// Host decision about a fetched page
pub trait CrawledPageDecisionMaker: Send + Sync {
    fn decide(&self, page: &CrawledPage, ctx: &CrawlContext) -> CrawlDecision;
}

impl<F> CrawledPageDecisionMaker for F
where
    F: Fn(&CrawledPage, &CrawlContext) -> CrawlDecision + Send + Sync,
{
    fn decide(&self, page: &CrawledPage, ctx: &CrawlContext) -> CrawlDecision {
        self(page, ctx)
    }
}

/// Host gate applied to every link before it is scheduled
pub trait LinkDecisionMaker: Send + Sync {
    fn should_schedule(&self, link: &Url, source: &CrawledPage, ctx: &CrawlContext) -> bool;
}

impl<F> LinkDecisionMaker for F
where
    F: Fn(&Url, &CrawledPage, &CrawlContext) -> bool + Send + Sync,
{
    fn should_schedule(&self, link: &Url, source: &CrawledPage, ctx: &CrawlContext) -> bool {
        self(link, source, ctx)
    }
}

/// Host classification of a link as internal or external to the crawl root
pub trait InternalUriDecisionMaker: Send + Sync {
    fn is_internal(&self, uri: &Url, root: &Url) -> bool;
}

impl<F> InternalUriDecisionMaker for F
where
    F: Fn(&Url, &Url) -> bool + Send + Sync,
{
    fn is_internal(&self, uri: &Url, root: &Url) -> bool {
        self(uri, root)
    }
}

/// Host decisions applied after the built-in policy engine
///
/// Panics raised by an override are caught and logged; the built-in decision
/// is used in that case.
#[derive(Clone, Default)]
pub struct DecisionOverrides {
    should_crawl_page: Option<Arc<dyn PageDecisionMaker>>,
    should_crawl_page_links: Option<Arc<dyn CrawledPageDecisionMaker>>,
    should_download_content: Option<Arc<dyn CrawledPageDecisionMaker>>,
    should_recrawl_page: Option<Arc<dyn CrawledPageDecisionMaker>>,
    should_schedule_link: Option<Arc<dyn LinkDecisionMaker>>,
    is_internal_uri: Option<Arc<dyn InternalUriDecisionMaker>>,
}

impl DecisionOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn should_crawl_page(mut self, f: impl PageDecisionMaker + 'static) -> Self {
        self.should_crawl_page = Some(Arc::new(f));
        self
    }

    pub fn should_crawl_page_links(mut self, f: impl CrawledPageDecisionMaker + 'static) -> Self {
        self.should_crawl_page_links = Some(Arc::new(f));
        self
    }

    pub fn should_download_content(mut self, f: impl CrawledPageDecisionMaker + 'static) -> Self {
        self.should_download_content = Some(Arc::new(f));
        self
    }

    pub fn should_recrawl_page(mut self, f: impl CrawledPageDecisionMaker + 'static) -> Self {
        self.should_recrawl_page = Some(Arc::new(f));
        self
    }

    pub fn should_schedule_link(mut self, f: impl LinkDecisionMaker + 'static) -> Self {
        self.should_schedule_link = Some(Arc::new(f));
        self
    }

    pub fn is_internal_uri(mut self, f: impl InternalUriDecisionMaker + 'static) -> Self {
        self.is_internal_uri = Some(Arc::new(f));
        self
    }

    /// Applies the page override on top of a built-in decision
    pub fn apply_crawl_page(
        &self,
        builtin: CrawlDecision,
        page: &PageToCrawl,
        ctx: &CrawlContext,
    ) -> CrawlDecision {
        match &self.should_crawl_page {
            Some(f) if builtin.allow => guarded("ShouldCrawlPage", builtin, || f.decide(page, ctx)),
            _ => builtin,
        }
    }

    /// Applies the links override on top of a built-in decision
    pub fn apply_crawl_page_links(
        &self,
        builtin: CrawlDecision,
        page: &CrawledPage,
        ctx: &CrawlContext,
    ) -> CrawlDecision {
        apply_crawled(&self.should_crawl_page_links, "ShouldCrawlPageLinks", builtin, page, ctx)
    }

    /// Applies the download override on top of a built-in decision
    pub fn apply_download_content(
        &self,
        builtin: CrawlDecision,
        page: &CrawledPage,
        ctx: &CrawlContext,
    ) -> CrawlDecision {
        apply_crawled(&self.should_download_content, "ShouldDownloadPageContent", builtin, page, ctx)
    }

    /// Applies the recrawl override on top of a built-in decision
    pub fn apply_recrawl_page(
        &self,
        builtin: CrawlDecision,
        page: &CrawledPage,
        ctx: &CrawlContext,
    ) -> CrawlDecision {
        apply_crawled(&self.should_recrawl_page, "ShouldRecrawlPage", builtin, page, ctx)
    }

    /// Returns the host's verdict on scheduling `link`, true when no gate is installed
    pub fn allow_link(&self, link: &Url, source: &CrawledPage, ctx: &CrawlContext) -> bool {
        match &self.should_schedule_link {
            Some(f) => catch_unwind(AssertUnwindSafe(|| f.should_schedule(link, source, ctx)))
                .unwrap_or_else(|panic| {
                    tracing::error!(
                        "ShouldScheduleLink override panicked for [{}]: {}",
                        link,
                        panic_message(panic.as_ref())
                    );
                    true
                }),
            None => true,
        }
    }

    /// Classifies `uri` against the crawl root
    pub fn is_internal(&self, uri: &Url, ctx: &CrawlContext) -> bool {
        let root = ctx.root_uri();
        let default = || crate::url::is_internal(uri, &root, ctx.original_root_uri());
        match &self.is_internal_uri {
            Some(f) => catch_unwind(AssertUnwindSafe(|| {
                f.is_internal(uri, &root) || f.is_internal(uri, ctx.original_root_uri())
            }))
            .unwrap_or_else(|panic| {
                tracing::error!(
                    "IsInternalUri override panicked for [{}]: {}",
                    uri,
                    panic_message(panic.as_ref())
                );
                default()
            }),
            None => default(),
        }
    }
}

fn apply_crawled(
    maker: &Option<Arc<dyn CrawledPageDecisionMaker>>,
    name: &str,
    builtin: CrawlDecision,
    page: &CrawledPage,
    ctx: &CrawlContext,
) -> CrawlDecision {
    match maker {
        Some(f) if builtin.allow => guarded(name, builtin, || f.decide(page, ctx)),
        _ => builtin,
    }
}

fn guarded(
    name: &str,
    fallback: CrawlDecision,
    call: impl FnOnce() -> CrawlDecision,
) -> CrawlDecision {
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(decision) => decision,
        Err(panic) => {
            tracing::error!(
                "{} override panicked, using built-in decision: {}",
                name,
                panic_message(panic.as_ref())
            );
            fallback
        }
    }
}

/// Renders a caught panic payload for logging
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
