//! Integration tests for the opt-in quarantine downloader

use chrono::Utc;
use darkwatch::config::{FetchConfig, QuarantineConfig};
use darkwatch::quarantine::{
    archive_path, DownloadOutcome, QuarantineDownloader, QuarantineManifest, INERT_SUFFIX,
};
use darkwatch::records::sha256_hex;
use darkwatch::{AttachmentRef, PostRecord, ThreadRecord};
use sha2::{Digest, Sha256};
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn downloader(out_dir: &Path, tweak: impl FnOnce(&mut QuarantineConfig)) -> QuarantineDownloader {
    let mut config = QuarantineConfig {
        enabled: true,
        out_dir: out_dir.to_path_buf(),
        max_per_thread: 2,
        ..QuarantineConfig::default()
    };
    tweak(&mut config);
    QuarantineDownloader::new(&config, &FetchConfig::default()).unwrap()
}

fn thread(server: &MockServer, attachment_paths: &[&str]) -> ThreadRecord {
    let attachments = attachment_paths
        .iter()
        .map(|p| AttachmentRef {
            display_filename: None,
            display_size: None,
            attachment_url: Some(format!("{}{}", server.uri(), p)),
        })
        .collect();
    ThreadRecord {
        source: "testforum".to_string(),
        thread_url: format!("{}/Thread-Leak", server.uri()),
        title: Some("Leak".to_string()),
        posts: vec![PostRecord {
            post_url: format!("{}/Thread-Leak#pid1", server.uri()),
            author: Some("seller".to_string()),
            posted_at: "2024-05-01T10:00:00Z".to_string(),
            content: "files below".to_string(),
            attachments,
        }],
        fetched_at: Utc::now(),
        thread_hash: "thread0001".to_string(),
    }
}

fn binary(body: &[u8]) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_vec(), "application/octet-stream")
}

#[tokio::test]
async fn test_per_thread_cap_stops_requests() {
    let server = MockServer::start().await;
    for n in 1..=5 {
        Mock::given(method("GET"))
            .and(path(format!("/att/{}", n)))
            .respond_with(binary(format!("payload {}", n).as_bytes()))
            .expect(if n <= 2 { 1 } else { 0 })
            .mount(&server)
            .await;
    }

    let dir = TempDir::new().unwrap();
    let mut dl = downloader(dir.path(), |_| {});
    let record = thread(&server, &["/att/1", "/att/2", "/att/3", "/att/4", "/att/5"]);

    let manifest = dl.download_thread(&record).await.unwrap().unwrap();
    assert_eq!(manifest.downloaded.len(), 2);

    let folder = dir.path().join("testforum").join("thread0001");
    assert_eq!(QuarantineManifest::read(&folder).unwrap(), manifest);

    let first = &manifest.downloaded[0];
    assert!(first.saved_path.ends_with(INERT_SUFFIX));
    assert_eq!(first.size, "payload 1".len() as u64);
    assert_eq!(first.sha256, hex::encode(Sha256::digest(b"payload 1")));
    assert_eq!(std::fs::read(&first.saved_path).unwrap(), b"payload 1");

    // No partial files survive
    let leftovers = std::fs::read_dir(&folder)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
        .count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_disposition_name_and_collisions() {
    let server = MockServer::start().await;
    for n in 1..=2 {
        Mock::given(method("GET"))
            .and(path(format!("/attachment/{}", n)))
            .respond_with(
                binary(b"PK\x03\x04")
                    .insert_header("Content-Disposition", "attachment; filename=\"db dump.zip\""),
            )
            .mount(&server)
            .await;
    }

    let dir = TempDir::new().unwrap();
    let mut dl = downloader(dir.path(), |_| {});
    let manifest = dl
        .download_thread(&thread(&server, &["/attachment/1", "/attachment/2"]))
        .await
        .unwrap()
        .unwrap();

    let names: Vec<String> = manifest
        .downloaded
        .iter()
        .map(|a| {
            Path::new(&a.saved_path)
                .file_name()
                .unwrap()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    assert_eq!(names, vec!["db_dump.zip.quarantine", "db_dump_1.zip.quarantine"]);
}

#[tokio::test]
async fn test_skips_pages_and_oversized_files() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/att/page"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<html></html>", "text/html"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/att/big"))
        .respond_with(binary(&[7u8; 4096]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/att/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let dl = downloader(dir.path(), |c| c.max_file_bytes = 1024);
    let folder = dir.path().join("t");
    std::fs::create_dir_all(&folder).unwrap();
    let thread_url = format!("{}/Thread-Leak", server.uri());

    for p in ["/att/page", "/att/big", "/att/missing"] {
        let outcome = dl
            .download_one(&format!("{}{}", server.uri(), p), &thread_url, &folder)
            .await
            .unwrap();
        assert!(matches!(outcome, DownloadOutcome::Skipped(_)), "{}: {:?}", p, outcome);
    }
    assert_eq!(std::fs::read_dir(&folder).unwrap().count(), 0);
}

#[tokio::test]
async fn test_same_host_rejects_redirect_off_host() {
    let forum = MockServer::start().await;
    let mirror = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/att/1"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("Location", format!("{}/file.bin", mirror.uri()).as_str()),
        )
        .mount(&forum)
        .await;
    Mock::given(method("GET"))
        .and(path("/file.bin"))
        .respond_with(binary(b"elsewhere"))
        .expect(0)
        .mount(&mirror)
        .await;
    Mock::given(method("GET"))
        .and(path("/att/2"))
        .respond_with(binary(b"local"))
        .expect(0)
        .mount(&mirror)
        .await;

    let dir = TempDir::new().unwrap();
    let mut dl = downloader(dir.path(), |c| c.same_host = true);
    let mut record = thread(&forum, &["/att/1"]);
    record.posts[0].attachments.push(AttachmentRef {
        display_filename: None,
        display_size: None,
        attachment_url: Some(format!("{}/att/2", mirror.uri())),
    });

    let manifest = dl.download_thread(&record).await.unwrap().unwrap();
    assert!(manifest.downloaded.is_empty());

    // The redirect hop itself is refused, not just its response
    let folder = dir.path().join("direct");
    std::fs::create_dir_all(&folder).unwrap();
    let outcome = dl
        .download_one(&format!("{}/att/1", forum.uri()), &record.thread_url, &folder)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        DownloadOutcome::Skipped("redirected off the thread host".to_string())
    );
}

#[tokio::test]
async fn test_archive_after_download() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/att/1"))
        .respond_with(binary(b"zip me"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut dl = downloader(dir.path(), |c| c.archive = true);
    let mut record = thread(&server, &["/att/1"]);
    record.thread_hash = String::new();

    dl.download_thread(&record).await.unwrap().unwrap();

    let folder = dir
        .path()
        .join("testforum")
        .join(sha256_hex(&record.thread_url));
    assert!(archive_path(&folder).is_file());
    assert_eq!(dl.archived().len(), 1);
}
