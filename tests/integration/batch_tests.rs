//! Integration tests for the batch escalation runner against a mock forum

use darkwatch::batch::{plan_chunks, BatchManifest, BatchRunner, ChunkStatus, CrawlChunkExecutor};
use darkwatch::config::{parse_config, Config};
use darkwatch::crawler::{FetchStrategy, Politeness};
use darkwatch::storage::read_records;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn create_test_config(base_url: &str, dir: &TempDir) -> Config {
    parse_config(&format!(
        r#"
[crawler]
delay-min-ms = 0
delay-max-ms = 0

[fetch]
max-retries = 1
backoff-base-ms = 10
chrome-path = "/nonexistent/chromium"

[output]
log-path = '{log}'

[batch]
lightweight-attempts = 2

[forums.testforum]
list-urls = ["{base}/Forum-Leaks?page=1"]
thread-link = "a.thread"
post-container = "div.post"
content = "div.body"
"#,
        log = dir.path().join("crawl.jsonl").display(),
        base = base_url,
    ))
    .expect("test config should be valid")
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html")
}

async fn mount_thread(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/Thread-Sample"))
        .respond_with(html(r#"<div class="post"><div class="body">sample data</div></div>"#))
        .mount(server)
        .await;
}

async fn mount_list_page(server: &MockServer, page: &str, status: u16, expected: u64) {
    let response = if status == 200 {
        html(r#"<a class="thread" href="/Thread-Sample">sample</a>"#)
    } else {
        ResponseTemplate::new(status)
    };
    Mock::given(method("GET"))
        .and(path("/Forum-Leaks"))
        .and(query_param("page", page))
        .respond_with(response)
        .expect(expected)
        .mount(server)
        .await;
}

fn runner(config: &Config) -> BatchRunner<CrawlChunkExecutor> {
    BatchRunner::new(
        CrawlChunkExecutor::new(config.clone(), "testforum").unwrap(),
        &config.batch,
    )
    .with_delays(Politeness::none(), Politeness::none())
}

#[tokio::test]
async fn test_failed_chunk_does_not_stop_the_batch() {
    let server = MockServer::start().await;
    mount_thread(&server).await;
    mount_list_page(&server, "1", 200, 1).await;
    mount_list_page(&server, "201", 200, 1).await;
    // Both lightweight attempts hit the server; the browser never launches
    mount_list_page(&server, "401", 500, 2).await;
    mount_list_page(&server, "601", 200, 1).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &dir);
    let chunks = plan_chunks(800, 200);
    assert_eq!(
        chunks.iter().map(|c| c.start).collect::<Vec<_>>(),
        vec![1, 201, 401, 601]
    );

    let manifest = runner(&config).run("testforum", &chunks).await;

    assert_eq!(manifest.chunks.len(), 4);
    assert_eq!(manifest.succeeded_count(), 3);

    let failed = &manifest.chunks[2];
    assert_eq!(failed.start, 401);
    assert_eq!(failed.status, ChunkStatus::Failed);
    assert_eq!(failed.attempts, 3);
    assert_eq!(failed.strategy, None);

    for chunk in manifest.chunks.iter().filter(|c| c.start != 401) {
        assert_eq!(chunk.strategy, Some(FetchStrategy::Lightweight));
        assert_eq!(chunk.attempts, 1);
        assert_eq!(chunk.threads_saved, 1);
        let log = chunk.log_path.as_ref().unwrap();
        let name = log.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(&format!("crawl_testforum_p{}_", chunk.start)), "{}", name);
        assert_eq!(read_records(log).unwrap().len(), 1);
    }
}

#[tokio::test]
async fn test_resume_reruns_only_failed_chunks() {
    let server = MockServer::start().await;
    mount_thread(&server).await;
    mount_list_page(&server, "1", 200, 1).await;
    mount_list_page(&server, "201", 500, 2).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &dir);
    let manifest = runner(&config).run("testforum", &plan_chunks(400, 200)).await;
    assert_eq!(manifest.failed_chunks().len(), 1);

    let manifest_file = dir.path().join("batch_testforum.json");
    manifest.save(&manifest_file).unwrap();

    // The forum recovers; only page 201 may be requested again
    server.reset().await;
    mount_thread(&server).await;
    mount_list_page(&server, "1", 200, 0).await;
    mount_list_page(&server, "201", 200, 1).await;

    let resumed = runner(&config)
        .resume(BatchManifest::load(&manifest_file).unwrap())
        .await;

    assert_eq!(resumed.succeeded_count(), 2);
    assert!(resumed.failed_chunks().is_empty());
    assert_eq!(resumed.chunks[1].start, 201);
    assert_eq!(resumed.chunks[1].attempts, 1);
}
