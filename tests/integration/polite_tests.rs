//! Integration tests for the polite crawl engine
//!
//! Covers robots.txt handling and per-domain pacing against a mock server.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use sumi_engine::crawler::{CrawlHooks, HookMode};
use sumi_engine::{CrawlConfig, PoliteCrawlEngine};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn create_test_config() -> CrawlConfig {
    CrawlConfig {
        max_concurrent_pages: 2,
        poll_interval_ms: 20,
        http_request_timeout_seconds: 5,
        respect_robots_txt: true,
        ..CrawlConfig::default()
    }
}

async fn mount_robots(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/plain"),
        )
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_html(server: &MockServer, at: &str, links: &[&str], expected: u64) {
    let anchors: String = links
        .iter()
        .map(|link| format!("<a href=\"{}\">{}</a>", link, link))
        .collect();
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!("<html><body>{}</body></html>", anchors))
                .insert_header("content-type", "text/html"),
        )
        .expect(expected)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_robots_disallowed_pages_are_skipped() {
    let mock_server = MockServer::start().await;

    mount_robots(&mock_server, "User-agent: *\nDisallow: /private\n").await;
    mount_html(&mock_server, "/", &["/public", "/private/secret"], 1).await;
    mount_html(&mock_server, "/public", &[], 1).await;
    mount_html(&mock_server, "/private/secret", &[], 0).await;

    let disallowed = Arc::new(Mutex::new(Vec::new()));
    let sink = disallowed.clone();
    let mut hooks = CrawlHooks::new();
    hooks.on_page_crawl_disallowed(HookMode::Inline, move |args| {
        sink.lock()
            .unwrap()
            .push((args.page.uri.path().to_string(), args.reason.clone()));
    });

    let engine = PoliteCrawlEngine::builder(create_test_config())
        .hooks(hooks)
        .build_polite()
        .expect("Failed to build engine");
    let result = engine
        .crawl(&format!("{}/", mock_server.uri()))
        .await
        .expect("Crawl should start");

    assert!(result.error.is_none(), "Unexpected error: {:?}", result.error);
    assert_eq!(result.crawled_count(), 2);

    let disallowed = disallowed.lock().unwrap();
    assert_eq!(disallowed.len(), 1, "Only the private page is disallowed");
    assert_eq!(disallowed[0].0, "/private/secret");
    assert!(
        disallowed[0].1.contains("Disallowed by robots.txt file"),
        "Reason should name robots.txt: {}",
        disallowed[0].1
    );
}

#[tokio::test]
async fn test_robots_parsed_hook_receives_file() {
    let mock_server = MockServer::start().await;

    mount_robots(&mock_server, "User-agent: *\nAllow: /\n").await;
    mount_html(&mock_server, "/", &[], 1).await;

    let parsed = Arc::new(Mutex::new(None));
    let sink = parsed.clone();
    let mut hooks = CrawlHooks::new();
    hooks.on_robots_txt_parsed(HookMode::Inline, move |args| {
        *sink.lock().unwrap() = Some(args.robots.content().to_string());
    });

    let engine = PoliteCrawlEngine::builder(create_test_config())
        .hooks(hooks)
        .build_polite()
        .expect("Failed to build engine");
    let result = engine
        .crawl(&format!("{}/", mock_server.uri()))
        .await
        .expect("Crawl should start");

    assert!(result.error.is_none());
    let parsed = parsed.lock().unwrap();
    assert_eq!(parsed.as_deref(), Some("User-agent: *\nAllow: /\n"));
}

#[tokio::test]
async fn test_missing_robots_allows_everything() {
    let mock_server = MockServer::start().await;

    // robots.txt is unmatched, so wiremock answers 404
    mount_html(&mock_server, "/", &["/a", "/b"], 1).await;
    mount_html(&mock_server, "/a", &[], 1).await;
    mount_html(&mock_server, "/b", &[], 1).await;

    let engine = PoliteCrawlEngine::new(create_test_config()).expect("Failed to build engine");
    let result = engine
        .crawl(&format!("{}/", mock_server.uri()))
        .await
        .expect("Crawl should start");

    assert!(result.error.is_none());
    assert_eq!(result.crawled_count(), 3);
}

#[tokio::test]
async fn test_disallowed_root_can_be_ignored() {
    let mock_server = MockServer::start().await;

    mount_robots(&mock_server, "User-agent: *\nDisallow: /\n").await;
    mount_html(&mock_server, "/", &["/a"], 1).await;
    mount_html(&mock_server, "/a", &[], 1).await;

    let config = CrawlConfig {
        ignore_robots_if_root_disallowed: true,
        ..create_test_config()
    };
    let engine = PoliteCrawlEngine::new(config).expect("Failed to build engine");
    let result = engine
        .crawl(&format!("{}/", mock_server.uri()))
        .await
        .expect("Crawl should start");

    assert!(result.error.is_none());
    assert_eq!(result.crawled_count(), 2);
}

#[tokio::test]
async fn test_disallowed_root_ends_crawl() {
    let mock_server = MockServer::start().await;

    mount_robots(&mock_server, "User-agent: *\nDisallow: /\n").await;
    mount_html(&mock_server, "/", &[], 0).await;

    let engine = PoliteCrawlEngine::new(create_test_config()).expect("Failed to build engine");
    let result = engine
        .crawl(&format!("{}/", mock_server.uri()))
        .await
        .expect("Crawl should start");

    assert!(result.error.is_none());
    assert_eq!(result.crawled_count(), 0);
}

#[tokio::test]
async fn test_robots_crawl_delay_paces_requests() {
    let mock_server = MockServer::start().await;

    mount_robots(&mock_server, "User-agent: *\nCrawl-delay: 1\n").await;
    mount_html(&mock_server, "/", &["/a"], 1).await;
    mount_html(&mock_server, "/a", &[], 1).await;

    let engine = PoliteCrawlEngine::new(create_test_config()).expect("Failed to build engine");
    let started = Instant::now();
    let result = engine
        .crawl(&format!("{}/", mock_server.uri()))
        .await
        .expect("Crawl should start");

    assert!(result.error.is_none());
    assert_eq!(result.crawled_count(), 2);
    assert!(
        started.elapsed() >= Duration::from_millis(950),
        "Second request should wait for the robots.txt crawl delay, took {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn test_min_domain_delay_without_robots() {
    let mock_server = MockServer::start().await;

    mount_html(&mock_server, "/", &["/a", "/b"], 1).await;
    mount_html(&mock_server, "/a", &[], 1).await;
    mount_html(&mock_server, "/b", &[], 1).await;

    let config = CrawlConfig {
        respect_robots_txt: false,
        min_crawl_delay_per_domain_ms: 300,
        ..create_test_config()
    };
    let engine = PoliteCrawlEngine::new(config).expect("Failed to build engine");
    let started = Instant::now();
    let result = engine
        .crawl(&format!("{}/", mock_server.uri()))
        .await
        .expect("Crawl should start");

    assert!(result.error.is_none());
    assert_eq!(result.crawled_count(), 3);
    assert!(
        started.elapsed() >= Duration::from_millis(550),
        "Three requests to one domain need two delays, took {:?}",
        started.elapsed()
    );

    let requests = mock_server
        .received_requests()
        .await
        .expect("Request recording is enabled");
    assert!(
        requests.iter().all(|r| r.url.path() != "/robots.txt"),
        "robots.txt is not fetched when it is not respected"
    );
}
