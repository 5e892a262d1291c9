//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock forum servers and test
//! the full crawl cycle end-to-end, from list page to JSONL log.

use darkwatch::config::{parse_config, Config};
use darkwatch::crawler::{run_crawl, CrawlOptions, FetchStrategy};
use darkwatch::storage::{read_records, MemorySink, RecordSink, SqliteMirror};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(
        format!("<html><head><title>Forum</title></head><body>{}</body></html>", body),
        "text/html",
    )
}

/// Creates a test configuration with one forum rooted at the mock server
fn create_test_config(base_url: &str, dir: &TempDir, sqlite: bool) -> Config {
    let sqlite_line = if sqlite {
        format!(
            "sqlite-path = '{}'",
            dir.path().join("mirror.db").display()
        )
    } else {
        String::new()
    };

    parse_config(&format!(
        r#"
[crawler]
max-pages = 5
delay-min-ms = 0
delay-max-ms = 0

[fetch]
backoff-base-ms = 10
max-retries = 1

[output]
log-path = '{log}'
{sqlite_line}

[forums.testforum]
list-urls = ["{base}/Forum-Leaks"]
thread-link = "a.thread"
thread-title = "h1.title"
post-container = "div.post"
content = "div.body"
author = "span.author"
posted-time = "time"
post-permalink = "a.permalink"
attachment-block = "div.attachment"
attachment-name = "span.name"
next-page = "a.next"
"#,
        log = dir.path().join("crawl.jsonl").display(),
        sqlite_line = sqlite_line,
        base = base_url,
    ))
    .expect("test config should be valid")
}

async fn mount_forum(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/Forum-Leaks"))
        .respond_with(html(
            r#"<a class="thread" href="/Thread-One">One</a>
               <a class="thread" href="/Thread-Two">Two</a>
               <a class="thread" href="/attachment.php?aid=1">file</a>
               <a class="next" href="/Forum-Leaks-2">Next</a>"#,
        ))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/Forum-Leaks-2"))
        .respond_with(html(
            r#"<a class="thread" href="/Thread-Two">Two again</a>
               <a class="thread" href="/Thread-Three">Three</a>
               <a class="next" href="/Forum-Leaks">Back to start</a>"#,
        ))
        .expect(1)
        .mount(server)
        .await;

    for (slug, title) in [("One", "Selling fresh database"), ("Two", "Gaming accounts")] {
        Mock::given(method("GET"))
            .and(path(format!("/Thread-{}", slug)))
            .respond_with(html(&format!(
                r#"<h1 class="title">{title}</h1>
                   <div class="post">
                     <span class="author">seller</span>
                     <time datetime="2024-05-01T10:00:00Z">May 1</time>
                     <a class="permalink" href="/Thread-{slug}?pid=1#pid1">#1</a>
                     <div class="body">Contact @seller_{slug} for the {title}</div>
                     <div class="attachment">
                       <a href="/attachment.php?aid=9"><span class="name">dump.zip</span></a>
                     </div>
                   </div>
                   <div class="post">
                     <span class="author">buyer</span>
                     <div class="body">vouch</div>
                   </div>"#,
                title = title,
                slug = slug
            )))
            .expect(1)
            .mount(server)
            .await;
    }

    // A broken thread must not stop the run
    Mock::given(method("GET"))
        .and(path("/Thread-Three"))
        .respond_with(ResponseTemplate::new(500))
        .mount(server)
        .await;

    // Attachments are metadata only
    Mock::given(method("GET"))
        .and(path("/attachment.php"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0u8; 16], "application/zip"))
        .expect(0)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_crawl_writes_jsonl_log() {
    let server = MockServer::start().await;
    mount_forum(&server).await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &dir, false);
    let log_path = dir.path().join("run.jsonl");

    let options = CrawlOptions {
        log_path: Some(log_path.clone()),
        ..CrawlOptions::default()
    };
    let summary = run_crawl(&config, &["testforum".to_string()], &options, Vec::new())
        .await
        .expect("crawl should finish");

    assert_eq!(summary.log_path, log_path);
    assert_eq!(summary.threads_saved(), 2);
    let report = &summary.reports[0];
    assert_eq!(report.list_pages, 2);
    assert_eq!(report.thread_failures, 1);
    assert_eq!(report.list_failures, 0);

    let records = read_records(&log_path).unwrap();
    assert_eq!(records.len(), 2);

    let first = &records[0];
    assert_eq!(first.source, "testforum");
    assert_eq!(first.thread_url, format!("{}/Thread-One", server.uri()));
    assert_eq!(first.title.as_deref(), Some("Selling fresh database"));
    assert_eq!(first.posts.len(), 2);
    assert_eq!(first.posts[0].author.as_deref(), Some("seller"));
    assert_eq!(first.posts[0].posted_at, "2024-05-01T10:00:00Z");
    assert_eq!(
        first.posts[0].attachments[0].attachment_url.as_deref(),
        Some(format!("{}/attachment.php?aid=9", server.uri()).as_str())
    );
    assert!(!first.thread_hash.is_empty());
    assert_ne!(first.thread_hash, records[1].thread_hash);
}

#[tokio::test]
async fn test_crawl_mirrors_into_sqlite() {
    let server = MockServer::start().await;
    mount_forum(&server).await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &dir, true);

    let summary = run_crawl(&config, &["testforum".to_string()], &CrawlOptions::default(), Vec::new())
        .await
        .unwrap();

    // Default log name carries a run timestamp
    let name = summary.log_path.file_name().unwrap().to_str().unwrap().to_string();
    assert!(name.starts_with("crawl_") && name.ends_with(".jsonl"), "{}", name);

    let mirror = SqliteMirror::open(&dir.path().join("mirror.db")).unwrap();
    assert_eq!(mirror.count_posts().unwrap(), 4);
    assert_eq!(mirror.count_attachments().unwrap(), 2);
}

#[tokio::test]
async fn test_unknown_forum_is_skipped() {
    let server = MockServer::start().await;
    mount_forum(&server).await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &dir, false);

    let summary = run_crawl(
        &config,
        &["ghost".to_string(), "testforum".to_string()],
        &CrawlOptions {
            strategy: Some(FetchStrategy::Lightweight),
            log_path: Some(dir.path().join("run.jsonl")),
            ..CrawlOptions::default()
        },
        Vec::new(),
    )
    .await
    .unwrap();

    assert_eq!(summary.missing_forums, vec!["ghost".to_string()]);
    assert_eq!(summary.reports.len(), 1);
    assert_eq!(summary.threads_saved(), 2);
}

/// Forwards records into a shared in-memory sink
struct Shared(std::sync::Arc<tokio::sync::Mutex<MemorySink>>);

#[async_trait::async_trait]
impl RecordSink for Shared {
    async fn accept(&mut self, record: &darkwatch::ThreadRecord) -> darkwatch::Result<()> {
        self.0.lock().await.accept(record).await
    }
}

#[tokio::test]
async fn test_extra_sinks_receive_records() {
    let server = MockServer::start().await;
    mount_forum(&server).await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &dir, false);
    let shared = std::sync::Arc::new(tokio::sync::Mutex::new(MemorySink::default()));

    run_crawl(
        &config,
        &["testforum".to_string()],
        &CrawlOptions {
            log_path: Some(dir.path().join("run.jsonl")),
            ..CrawlOptions::default()
        },
        vec![Box::new(Shared(shared.clone()))],
    )
    .await
    .unwrap();

    let sink = shared.lock().await;
    assert_eq!(sink.records.len(), 2);
}
