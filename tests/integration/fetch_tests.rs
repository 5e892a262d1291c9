//! Integration tests for the lightweight fetch strategy's safety guards

use darkwatch::config::FetchConfig;
use darkwatch::crawler::{Fetcher, HttpFetcher};
use darkwatch::FetchError;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config() -> FetchConfig {
    FetchConfig {
        backoff_base_ms: 10,
        max_redirects: 2,
        max_html_bytes: 1_000,
        ..FetchConfig::default()
    }
}

fn url(server: &MockServer, p: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), p)).unwrap()
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html; charset=utf-8")
}

#[tokio::test]
async fn test_fetches_html_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Thread-A"))
        .respond_with(html("<p>hello</p>"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(&test_config()).unwrap();
    let page = fetcher.fetch_html(&url(&server, "/Thread-A")).await.unwrap();
    assert_eq!(page.html, "<p>hello</p>");
    assert_eq!(page.final_url, url(&server, "/Thread-A"));
}

#[tokio::test]
async fn test_attachment_url_is_never_requested() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(html("<p>should not be served</p>"))
        .expect(0)
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(&test_config()).unwrap();
    for p in ["/files/tool.exe", "/attachment.php?aid=3", "/x/dump.zip"] {
        let err = fetcher.fetch_html(&url(&server, p)).await.unwrap_err();
        assert!(matches!(err, FetchError::BlockedUrl { .. }), "{}: {}", p, err);
    }
}

#[tokio::test]
async fn test_rejects_attachment_disposition() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Thread-A"))
        .respond_with(html("<p>x</p>").insert_header("Content-Disposition", "attachment; filename=x.html"))
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(&test_config()).unwrap();
    let err = fetcher.fetch_html(&url(&server, "/Thread-A")).await.unwrap_err();
    assert!(matches!(err, FetchError::UnsafeResponse { .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_rejects_non_html_content_type() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Thread-A"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0x4d, 0x5a, 0x90], "application/octet-stream"))
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(&test_config()).unwrap();
    let err = fetcher.fetch_html(&url(&server, "/Thread-A")).await.unwrap_err();
    assert!(err.is_safety_rejection());
}

#[tokio::test]
async fn test_rejects_oversized_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Thread-Big"))
        .respond_with(html(&"a".repeat(5_000)))
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(&test_config()).unwrap();
    let err = fetcher.fetch_html(&url(&server, "/Thread-Big")).await.unwrap_err();
    assert!(matches!(err, FetchError::UnsafeResponse { .. }));
}

#[tokio::test]
async fn test_redirect_chain_is_capped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/loop"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/loop"))
        .expect(3)
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(&test_config()).unwrap();
    let err = fetcher.fetch_html(&url(&server, "/loop")).await.unwrap_err();
    assert!(matches!(err, FetchError::TooManyRedirects { .. }));
}

#[tokio::test]
async fn test_redirect_to_attachment_is_blocked() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Thread-A"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/download/77"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/download/77"))
        .respond_with(html("<p>payload</p>"))
        .expect(0)
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(&test_config()).unwrap();
    let err = fetcher.fetch_html(&url(&server, "/Thread-A")).await.unwrap_err();
    assert!(matches!(err, FetchError::BlockedUrl { .. }));
}

#[tokio::test]
async fn test_follows_redirect_to_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/Thread-New"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Thread-New"))
        .respond_with(html("<p>moved</p>"))
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(&test_config()).unwrap();
    let page = fetcher.fetch_html(&url(&server, "/old")).await.unwrap();
    assert_eq!(page.final_url, url(&server, "/Thread-New"));
}

#[tokio::test]
async fn test_retries_service_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Thread-A"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Thread-A"))
        .respond_with(html("<p>second time lucky</p>"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(&test_config()).unwrap();
    let page = fetcher.fetch_html(&url(&server, "/Thread-A")).await.unwrap();
    assert_eq!(page.html, "<p>second time lucky</p>");
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Thread-A"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(&test_config()).unwrap();
    let err = fetcher.fetch_html(&url(&server, "/Thread-A")).await.unwrap_err();
    assert!(matches!(err, FetchError::HttpStatus { status: 503, .. }));
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Thread-Gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(&test_config()).unwrap();
    let err = fetcher.fetch_html(&url(&server, "/Thread-Gone")).await.unwrap_err();
    assert!(matches!(err, FetchError::HttpStatus { status: 404, .. }));
}
