//! Integration tests for the crawl engine
//!
//! These tests use wiremock to create mock HTTP servers and run the full
//! crawl cycle end-to-end through the real HTTP fetcher.

use std::sync::{Arc, Mutex};
use sumi_engine::crawler::{CrawlHooks, HookMode};
use sumi_engine::{CrawlConfig, CrawlEngine, CrawlPhase};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration suited to a local mock server
fn create_test_config() -> CrawlConfig {
    CrawlConfig {
        max_concurrent_pages: 2,
        poll_interval_ms: 20,
        http_request_timeout_seconds: 5,
        ..CrawlConfig::default()
    }
}

/// Builds an HTML body linking to each of `links`
fn html_with_links(title: &str, links: &[String]) -> String {
    let anchors: String = links
        .iter()
        .map(|link| format!("<a href=\"{}\">{}</a>\n", link, link))
        .collect();
    format!(
        "<html><head><title>{}</title></head><body>{}</body></html>",
        title, anchors
    )
}

async fn mount_html(server: &MockServer, at: &str, links: &[String], expected: u64) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(html_with_links(at, links))
                .insert_header("content-type", "text/html"),
        )
        .expect(expected)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_crawl_single_site() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_html(
        &mock_server,
        "/",
        &[format!("{}/page1", base_url), "/page2".to_string()],
        1,
    )
    .await;
    mount_html(&mock_server, "/page1", &["/page3".to_string(), "/".to_string()], 1).await;
    mount_html(&mock_server, "/page2", &["/page1".to_string()], 1).await;
    mount_html(&mock_server, "/page3", &[], 1).await;

    let engine = CrawlEngine::new(create_test_config()).expect("Failed to build engine");
    let result = engine
        .crawl(&format!("{}/", base_url))
        .await
        .expect("Crawl should start");

    assert!(result.error.is_none(), "Unexpected error: {:?}", result.error);
    assert_eq!(result.crawled_count(), 4, "Every page should be crawled once");
    assert_eq!(result.exit_phase, CrawlPhase::Running);
    assert_eq!(
        result.root_uri.as_str(),
        format!("{}/", base_url),
        "Result should report the requested root"
    );
}

#[tokio::test]
async fn test_depth_limit_stops_discovery() {
    let mock_server = MockServer::start().await;

    mount_html(&mock_server, "/", &["/level1".to_string()], 1).await;
    mount_html(&mock_server, "/level1", &["/level2".to_string()], 1).await;
    mount_html(&mock_server, "/level2", &[], 0).await;

    let config = CrawlConfig {
        max_crawl_depth: 1,
        ..create_test_config()
    };
    let engine = CrawlEngine::new(config).expect("Failed to build engine");
    let result = engine
        .crawl(&format!("{}/", mock_server.uri()))
        .await
        .expect("Crawl should start");

    assert!(result.error.is_none());
    assert_eq!(result.crawled_count(), 2, "Pages beyond max depth are not crawled");
}

#[tokio::test]
async fn test_non_html_content_is_not_parsed() {
    let mock_server = MockServer::start().await;

    mount_html(&mock_server, "/", &["/data.json".to_string()], 1).await;
    Mock::given(method("GET"))
        .and(path("/data.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"html": "<a href=\"/hidden\">hidden</a>"}"#)
                .insert_header("content-type", "application/json"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_html(&mock_server, "/hidden", &[], 0).await;

    let completed = Arc::new(Mutex::new(Vec::new()));
    let sink = completed.clone();
    let mut hooks = CrawlHooks::new();
    hooks.on_page_crawl_completed(HookMode::Inline, move |args| {
        sink.lock()
            .unwrap()
            .push((args.page.page.uri.path().to_string(), args.page.content.is_empty()));
    });

    let engine = CrawlEngine::builder(create_test_config())
        .hooks(hooks)
        .build()
        .expect("Failed to build engine");
    let result = engine
        .crawl(&format!("{}/", mock_server.uri()))
        .await
        .expect("Crawl should start");

    assert!(result.error.is_none());
    assert_eq!(result.crawled_count(), 2);

    let completed = completed.lock().unwrap();
    let json = completed
        .iter()
        .find(|(p, _)| p == "/data.json")
        .expect("JSON page should complete");
    assert!(json.1, "Body of a non-downloadable content type is skipped");
}

#[tokio::test]
async fn test_manual_redirect_schedules_target() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_html(&mock_server, "/", &["/old".to_string()], 1).await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(
            ResponseTemplate::new(301).insert_header("location", format!("{}/new", base_url).as_str()),
        )
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_html(&mock_server, "/new", &[], 1).await;

    let config = CrawlConfig {
        auto_redirects: false,
        ..create_test_config()
    };
    let engine = CrawlEngine::new(config).expect("Failed to build engine");
    let result = engine
        .crawl(&format!("{}/", base_url))
        .await
        .expect("Crawl should start");

    assert!(result.error.is_none());
    assert_eq!(
        result.crawled_count(),
        3,
        "Root, redirect source and redirect target are all crawled"
    );
}

#[tokio::test]
async fn test_auto_redirect_of_root_moves_root() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("location", format!("{}/home", base_url).as_str()),
        )
        .mount(&mock_server)
        .await;
    mount_html(&mock_server, "/home", &["/about".to_string()], 1).await;
    mount_html(&mock_server, "/about", &[], 1).await;

    let engine = CrawlEngine::new(create_test_config()).expect("Failed to build engine");
    let result = engine
        .crawl(&format!("{}/", base_url))
        .await
        .expect("Crawl should start");

    assert!(result.error.is_none());
    assert_eq!(result.context.root_uri().path(), "/home");
    assert_eq!(result.root_uri.path(), "/");
    assert_eq!(result.crawled_count(), 2);
}

#[tokio::test]
async fn test_service_unavailable_is_retried() {
    let mock_server = MockServer::start().await;

    mount_html(&mock_server, "/", &["/flaky".to_string()], 1).await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503).insert_header("retry-after", "0"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_html(&mock_server, "/flaky", &[], 1).await;

    let statuses = Arc::new(Mutex::new(Vec::new()));
    let sink = statuses.clone();
    let mut hooks = CrawlHooks::new();
    hooks.on_page_crawl_completed(HookMode::Inline, move |args| {
        if args.page.page.uri.path() == "/flaky" {
            sink.lock()
                .unwrap()
                .push(args.page.status.map(|s| s.as_u16()));
        }
    });

    let config = CrawlConfig {
        max_retry_count: 2,
        min_retry_delay_ms: 10,
        ..create_test_config()
    };
    let engine = CrawlEngine::builder(config)
        .hooks(hooks)
        .build()
        .expect("Failed to build engine");
    let result = engine
        .crawl(&format!("{}/", mock_server.uri()))
        .await
        .expect("Crawl should start");

    assert!(result.error.is_none());
    assert_eq!(*statuses.lock().unwrap(), vec![Some(503), Some(200)]);
}

#[tokio::test]
async fn test_page_limit_caps_requests() {
    let mock_server = MockServer::start().await;

    let links: Vec<String> = (1..=10).map(|i| format!("/p{}", i)).collect();
    mount_html(&mock_server, "/", &links, 1).await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><body>leaf</body></html>")
                .insert_header("content-type", "text/html"),
        )
        .mount(&mock_server)
        .await;

    let config = CrawlConfig {
        max_concurrent_pages: 1,
        max_pages_to_crawl: 4,
        ..create_test_config()
    };
    let engine = CrawlEngine::new(config).expect("Failed to build engine");
    let result = engine
        .crawl(&format!("{}/", mock_server.uri()))
        .await
        .expect("Crawl should start");

    assert!(result.error.is_none());
    assert_eq!(result.crawled_count(), 4);
    let requests = mock_server
        .received_requests()
        .await
        .expect("Request recording is enabled");
    assert_eq!(requests.len(), 4, "No request is made past the page limit");
}

#[tokio::test]
async fn test_unreachable_root_finishes_without_pages_followed() {
    // Nothing listens on port 9 locally
    let config = CrawlConfig {
        http_request_timeout_seconds: 2,
        ..create_test_config()
    };
    let engine = CrawlEngine::new(config).expect("Failed to build engine");
    let result = engine
        .crawl("http://127.0.0.1:9/")
        .await
        .expect("Crawl should start");

    assert!(
        result.error.is_none(),
        "Transport failures are recorded on the page, not the crawl"
    );
    assert_eq!(result.crawled_count(), 1);
}

#[tokio::test]
async fn test_invalid_root_is_rejected() {
    let engine = CrawlEngine::new(create_test_config()).expect("Failed to build engine");

    let err = engine.crawl("not a url").await.unwrap_err();
    assert!(matches!(err, sumi_engine::EngineError::InvalidRoot { .. }));

    let err = engine.crawl("ftp://example.com/").await.unwrap_err();
    assert!(matches!(err, sumi_engine::EngineError::UnsupportedScheme(_)));
}
