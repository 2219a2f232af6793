//! Lifecycle hooks
//!
//! Hosts subscribe to crawl events either inline (the subscriber runs on the
//! worker before the pipeline continues) or detached (the subscriber runs on
//! tokio's blocking pool). Panicking subscribers are logged and ignored.
//! Once a hard stop is requested no further events are delivered.

use crate::policy::panic_message;
use crate::robots::RobotsTxt;
use crate::state::{CrawlContext, CrawledPage, ExtensionBag, PageToCrawl};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// How a subscriber is invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookMode {
    /// Runs on the worker; the pipeline waits for it
    Inline,

    /// Runs on the blocking pool; the pipeline does not wait
    Detached,
}

/// A page is about to be fetched
#[derive(Debug)]
pub struct PageCrawlStartingArgs {
    pub context: Arc<CrawlContext>,
    pub page: PageToCrawl,
}

/// A page finished processing
#[derive(Debug)]
pub struct PageCrawlCompletedArgs {
    pub context: Arc<CrawlContext>,
    pub page: CrawledPage,

    /// Snapshot of the crawl's extension bag when the event fired
    pub extension_bag: ExtensionBag,
}

/// A page was refused by the scheduling gate
#[derive(Debug)]
pub struct PageCrawlDisallowedArgs {
    pub context: Arc<CrawlContext>,
    pub page: PageToCrawl,
    pub reason: String,
}

/// Links of a crawled page will not be followed
#[derive(Debug)]
pub struct PageLinksCrawlDisallowedArgs {
    pub context: Arc<CrawlContext>,
    pub page: CrawledPage,
    pub reason: String,
}

/// robots.txt for the root was fetched and parsed
#[derive(Debug)]
pub struct RobotsTxtParsedArgs {
    pub context: Arc<CrawlContext>,
    pub robots: RobotsTxt,
}

type Subscriber<A> = Arc<dyn Fn(&A) + Send + Sync>;

struct HookPoint<A> {
    name: &'static str,
    subscribers: Vec<(HookMode, Subscriber<A>)>,
}

impl<A> HookPoint<A> {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            subscribers: Vec::new(),
        }
    }
}

impl<A> Clone for HookPoint<A> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            subscribers: self.subscribers.clone(),
        }
    }
}

impl<A: Send + Sync + 'static> HookPoint<A> {
    fn subscribe(&mut self, mode: HookMode, subscriber: Subscriber<A>) {
        self.subscribers.push((mode, subscriber));
    }

    /// Delivers an event to every subscriber in registration order
    ///
    /// `make_args` is only called when someone is listening.
    fn fire(&self, ctx: &CrawlContext, make_args: impl FnOnce() -> A, force_inline: bool) {
        if self.subscribers.is_empty() || ctx.is_hard_stop_requested() {
            return;
        }

        let args = Arc::new(make_args());
        for (mode, subscriber) in &self.subscribers {
            if *mode == HookMode::Detached && !force_inline {
                let name = self.name;
                let subscriber = subscriber.clone();
                let args = args.clone();
                tokio::task::spawn_blocking(move || invoke(name, &subscriber, &args));
            } else {
                invoke(self.name, subscriber, &args);
            }
        }
    }
}

fn invoke<A>(name: &str, subscriber: &Subscriber<A>, args: &A) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| subscriber(args))) {
        tracing::error!(
            "Subscriber of [{}] panicked: {}",
            name,
            panic_message(panic.as_ref())
        );
    }
}

/// Subscriber registry for crawl lifecycle events
///
/// # Example
///
/// ```
/// use sumi_engine::crawler::{CrawlHooks, HookMode};
///
/// let mut hooks = CrawlHooks::new();
/// hooks.on_page_crawl_completed(HookMode::Inline, |args| {
///     println!("crawled {}", args.page.page.uri);
/// });
/// ```
#[derive(Clone)]
pub struct CrawlHooks {
    page_crawl_starting: HookPoint<PageCrawlStartingArgs>,
    page_crawl_completed: HookPoint<PageCrawlCompletedArgs>,
    page_crawl_disallowed: HookPoint<PageCrawlDisallowedArgs>,
    page_links_crawl_disallowed: HookPoint<PageLinksCrawlDisallowedArgs>,
    robots_txt_parsed: HookPoint<RobotsTxtParsedArgs>,
}

impl Default for CrawlHooks {
    fn default() -> Self {
        Self::new()
    }
}

impl CrawlHooks {
    pub fn new() -> Self {
        Self {
            page_crawl_starting: HookPoint::new("page crawl starting"),
            page_crawl_completed: HookPoint::new("page crawl completed"),
            page_crawl_disallowed: HookPoint::new("page crawl disallowed"),
            page_links_crawl_disallowed: HookPoint::new("page links crawl disallowed"),
            robots_txt_parsed: HookPoint::new("robots.txt parsed"),
        }
    }

    pub fn on_page_crawl_starting(
        &mut self,
        mode: HookMode,
        f: impl Fn(&PageCrawlStartingArgs) + Send + Sync + 'static,
    ) -> &mut Self {
        self.page_crawl_starting.subscribe(mode, Arc::new(f));
        self
    }

    pub fn on_page_crawl_completed(
        &mut self,
        mode: HookMode,
        f: impl Fn(&PageCrawlCompletedArgs) + Send + Sync + 'static,
    ) -> &mut Self {
        self.page_crawl_completed.subscribe(mode, Arc::new(f));
        self
    }

    pub fn on_page_crawl_disallowed(
        &mut self,
        mode: HookMode,
        f: impl Fn(&PageCrawlDisallowedArgs) + Send + Sync + 'static,
    ) -> &mut Self {
        self.page_crawl_disallowed.subscribe(mode, Arc::new(f));
        self
    }

    pub fn on_page_links_crawl_disallowed(
        &mut self,
        mode: HookMode,
        f: impl Fn(&PageLinksCrawlDisallowedArgs) + Send + Sync + 'static,
    ) -> &mut Self {
        self.page_links_crawl_disallowed.subscribe(mode, Arc::new(f));
        self
    }

    pub fn on_robots_txt_parsed(
        &mut self,
        mode: HookMode,
        f: impl Fn(&RobotsTxtParsedArgs) + Send + Sync + 'static,
    ) -> &mut Self {
        self.robots_txt_parsed.subscribe(mode, Arc::new(f));
        self
    }

    pub(crate) fn fire_page_crawl_starting(&self, ctx: &Arc<CrawlContext>, page: &PageToCrawl) {
        self.page_crawl_starting.fire(
            ctx,
            || PageCrawlStartingArgs {
                context: ctx.clone(),
                page: page.clone(),
            },
            false,
        );
    }

    /// `force_inline` runs detached subscribers inline, used for the last
    /// page of a crawl so its event is delivered before `crawl()` returns
    pub(crate) fn fire_page_crawl_completed(
        &self,
        ctx: &Arc<CrawlContext>,
        page: &CrawledPage,
        force_inline: bool,
    ) {
        self.page_crawl_completed.fire(
            ctx,
            || PageCrawlCompletedArgs {
                context: ctx.clone(),
                page: page.clone(),
                extension_bag: ctx.extension_bag(),
            },
            force_inline,
        );
    }

    pub(crate) fn fire_page_crawl_disallowed(
        &self,
        ctx: &Arc<CrawlContext>,
        page: &PageToCrawl,
        reason: &str,
    ) {
        self.page_crawl_disallowed.fire(
            ctx,
            || PageCrawlDisallowedArgs {
                context: ctx.clone(),
                page: page.clone(),
                reason: reason.to_string(),
            },
            false,
        );
    }

    pub(crate) fn fire_page_links_crawl_disallowed(
        &self,
        ctx: &Arc<CrawlContext>,
        page: &CrawledPage,
        reason: &str,
    ) {
        self.page_links_crawl_disallowed.fire(
            ctx,
            || PageLinksCrawlDisallowedArgs {
                context: ctx.clone(),
                page: page.clone(),
                reason: reason.to_string(),
            },
            false,
        );
    }

    pub(crate) fn fire_robots_txt_parsed(&self, ctx: &Arc<CrawlContext>, robots: &RobotsTxt) {
        self.robots_txt_parsed.fire(
            ctx,
            || RobotsTxtParsedArgs {
                context: ctx.clone(),
                robots: robots.clone(),
            },
            false,
        );
    }
}
