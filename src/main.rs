//! Sumi-Engine main entry point
//!
//! Command-line front end that runs a polite crawl of a single site.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use sumi_engine::config::{load_config_with_hash, CrawlConfig};
use sumi_engine::crawler::{CrawlHooks, HookMode, PoliteCrawlEngine};
use sumi_engine::{CancellationToken, CrawlResult};
use tracing_subscriber::EnvFilter;

/// Sumi-Engine: a polite, concurrent crawl engine
///
/// Crawls a site from a root URL while respecting robots.txt, per-domain
/// delays, page limits and memory ceilings. Press Ctrl-C to cancel a crawl.
#[derive(Parser, Debug)]
#[command(name = "sumi-engine")]
#[command(version = "1.0.0")]
#[command(about = "A polite, concurrent crawl engine", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Root URL to crawl
    #[arg(value_name = "URL")]
    url: String,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    if cli.dry_run {
        handle_dry_run(&config, &cli.url);
        return Ok(());
    }

    handle_crawl(config, &cli.url).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_engine=info,warn"),
            1 => EnvFilter::new("sumi_engine=debug,info"),
            2 => EnvFilter::new("sumi_engine=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &CrawlConfig, url: &str) {
    println!("=== Sumi-Engine Dry Run ===\n");
    println!("Root URL: {}\n", url);

    println!("Limits:");
    println!("  Max concurrent pages: {}", config.max_concurrent_pages);
    println!("  Max pages to crawl: {}", config.max_pages_to_crawl);
    println!("  Max pages per domain: {}", config.max_pages_per_domain);
    println!("  Max crawl depth: {}", config.max_crawl_depth);
    println!("  Crawl timeout: {}s", config.crawl_timeout_seconds);

    println!("\nPoliteness:");
    println!("  Respect robots.txt: {}", config.respect_robots_txt);
    println!("  Robots user agent: {}", config.robots_user_agent);
    println!(
        "  Min crawl delay per domain: {}ms",
        config.min_crawl_delay_per_domain_ms
    );
    println!(
        "  Max robots.txt crawl delay: {}s",
        config.max_robots_crawl_delay_seconds
    );

    println!("\nHTTP:");
    println!("  User agent: {}", config.user_agent);
    println!("  Auto redirects: {}", config.auto_redirects);
    println!("  Max retries: {}", config.max_retry_count);

    println!("\n✓ Configuration is valid");
}

/// Handles the main crawl operation
async fn handle_crawl(config: CrawlConfig, url: &str) -> anyhow::Result<()> {
    let mut hooks = CrawlHooks::new();
    hooks.on_page_links_crawl_disallowed(HookMode::Detached, |args| {
        tracing::debug!(
            "Links of [{}] not followed: {}",
            args.page.page.uri,
            args.reason
        );
    });

    let engine = PoliteCrawlEngine::builder(config)
        .hooks(hooks)
        .build_polite()
        .context("Failed to build crawl engine")?;

    let cancellation = CancellationToken::new();
    let on_signal = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling crawl");
            on_signal.cancel();
        }
    });

    let result = engine
        .crawl_with_cancellation(url, cancellation)
        .await
        .with_context(|| format!("Failed to start crawl of {}", url))?;

    print_summary(&result);
    match &result.error {
        Some(e) if !e.is_cancellation() => Err(anyhow::anyhow!("Crawl failed: {}", e)),
        _ => Ok(()),
    }
}

fn print_summary(result: &CrawlResult) {
    println!("\n=== Crawl Summary ===\n");
    println!("Root URL: {}", result.root_uri);
    println!("Pages crawled: {}", result.crawled_count());
    println!("Elapsed: {:.2}s", result.elapsed.as_secs_f64());
    println!("Exit phase: {}", result.exit_phase);

    let mut domains: Vec<_> = result.context.count_by_domain().into_iter().collect();
    domains.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    if !domains.is_empty() {
        println!("\nPages by domain:");
        for (domain, count) in domains {
            println!("  {}: {}", domain, count);
        }
    }

    if let Some(e) = &result.error {
        println!("\nError: {}", e);
    }
}
