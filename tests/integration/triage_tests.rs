//! Integration tests for the triage pipeline over a crawl log on disk

use chrono::{TimeZone, Utc};
use darkwatch::config::TriageConfig;
use darkwatch::storage::JsonlLog;
use darkwatch::triage::{resolve_input, run_pipeline, PipelineKind, TriageOutputs};
use darkwatch::{PostRecord, ThreadRecord};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn post(url: &str, content: &str) -> PostRecord {
    PostRecord {
        post_url: url.to_string(),
        author: Some("member".to_string()),
        posted_at: "2024-05-01T10:00:00Z".to_string(),
        content: content.to_string(),
        attachments: vec![],
    }
}

fn thread(url: &str, title: &str, posts: Vec<PostRecord>) -> ThreadRecord {
    ThreadRecord {
        source: "darkforums".to_string(),
        thread_url: url.to_string(),
        title: Some(title.to_string()),
        posts,
        fetched_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        thread_hash: String::new(),
    }
}

fn valuable_thread() -> ThreadRecord {
    thread(
        "http://f.onion/Thread-Fresh-Leak",
        "Fresh database leak",
        vec![
            post(
                "http://f.onion/Thread-Fresh-Leak#pid1",
                "Full customer table with emails and hashes, 2M rows, samples on request. Contact @dbseller to buy.",
            ),
            post("http://f.onion/Thread-Fresh-Leak#pid2", "vouch, the sample checked out fine"),
            post("http://f.onion/Thread-Fresh-Leak#pid3", "still available? sent you a message"),
        ],
    )
}

fn challenge_thread() -> ThreadRecord {
    thread(
        "http://f.onion/Thread-Cheap-Stuff",
        "Just a moment...",
        vec![post("http://f.onion/Thread-Cheap-Stuff", "please wait while we check your browser")],
    )
}

fn write_log(dir: &Path, records: &[ThreadRecord]) -> PathBuf {
    let path = dir.join("crawl_20240501_120000.jsonl");
    let mut log = JsonlLog::create(&path).unwrap();
    for record in records {
        log.append(record).unwrap();
    }
    path
}

fn read_lines(path: &Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[test]
fn test_valuable_thread_is_kept_with_score() {
    let dir = TempDir::new().unwrap();
    let input = write_log(dir.path(), &[valuable_thread()]);

    let summary = run_pipeline(&input, PipelineKind::Dual, &TriageConfig::default()).unwrap();
    assert_eq!(summary.strict.as_ref().unwrap().kept, 1);
    assert_eq!(summary.split.as_ref().unwrap().keep, 1);

    let keep = read_lines(&summary.outputs.relaxed_keep);
    assert_eq!(keep.len(), 1);
    assert_eq!(keep[0]["score"], 5);
    assert_eq!(keep[0]["classification"], "keep");
    assert_eq!(keep[0]["tags"][0], "db_leak");
    assert_eq!(keep[0]["contacts"]["telegram"][0], "@dbseller");

    let csv = std::fs::read_to_string(&summary.outputs.strict_summary).unwrap();
    let mut lines = csv.lines();
    assert_eq!(
        lines.next(),
        Some("url,title,post_count,tags,telegram,first_snippet")
    );
    assert!(lines.next().unwrap().starts_with("http://f.onion/Thread-Fresh-Leak,Fresh database leak,3,"));
}

#[test]
fn test_challenge_page_strict_vs_relaxed() {
    let dir = TempDir::new().unwrap();
    let input = write_log(dir.path(), &[challenge_thread()]);

    let summary = run_pipeline(&input, PipelineKind::Dual, &TriageConfig::default()).unwrap();

    // Strict drops the interstitial outright
    assert_eq!(summary.strict.as_ref().unwrap().kept, 0);
    assert!(read_lines(&summary.outputs.strict_filtered).is_empty());

    // Relaxed keeps it for scoring, which sends it to drop_meta without posts
    assert_eq!(summary.relaxed.as_ref().unwrap().kept, 1);
    let dropped = read_lines(&summary.outputs.relaxed_drop_meta);
    assert_eq!(dropped.len(), 1);
    assert_eq!(dropped[0]["classification"], "drop");
    assert_eq!(dropped[0]["title"], "Thread Cheap Stuff");
    assert_eq!(dropped[0]["posts"].as_array().unwrap().len(), 0);
}

#[test]
fn test_canonical_url_dedup() {
    let dir = TempDir::new().unwrap();
    let mut second_page = valuable_thread();
    second_page.thread_url = "http://f.onion/Thread-Fresh-Leak?page=2".to_string();
    for p in &mut second_page.posts {
        p.content.push_str(" (page two)");
    }
    let input = write_log(dir.path(), &[valuable_thread(), second_page]);

    let summary = run_pipeline(&input, PipelineKind::Relaxed, &TriageConfig::default()).unwrap();
    assert!(summary.strict.is_none());
    assert_eq!(summary.relaxed.as_ref().unwrap().total, 2);
    assert_eq!(summary.relaxed.as_ref().unwrap().kept, 1);

    let kept = read_lines(&summary.outputs.relaxed_filtered);
    assert_eq!(kept[0]["canon_url"], "http://f.onion/Thread-Fresh-Leak");
    assert!(!summary.outputs.strict_filtered.exists());
}

#[test]
fn test_thresholds_are_configurable() {
    let dir = TempDir::new().unwrap();
    let input = write_log(dir.path(), &[valuable_thread()]);
    let config = TriageConfig {
        keep_threshold: 6,
        ..TriageConfig::default()
    };

    let summary = run_pipeline(&input, PipelineKind::Relaxed, &config).unwrap();
    let split = summary.split.unwrap();
    assert_eq!((split.keep, split.review, split.drop), (0, 1, 0));
}

#[test]
fn test_latest_ignores_triage_outputs() {
    let dir = TempDir::new().unwrap();
    let input = write_log(dir.path(), &[valuable_thread()]);
    run_pipeline(&input, PipelineKind::Dual, &TriageConfig::default()).unwrap();

    let outputs = TriageOutputs::for_input(&input);
    assert!(outputs.relaxed_keep.exists());
    assert_eq!(resolve_input("latest", dir.path()).unwrap(), input);
    assert!(resolve_input("latest", &dir.path().join("empty")).is_err());
}
