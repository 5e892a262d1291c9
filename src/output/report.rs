//! Plain-text rendering of run results
//!
//! Every `render_*` function returns the text its `print_*` counterpart writes
//! to stdout, so the layout can be checked without capturing output.

use crate::alert::Finding;
use crate::batch::{BatchManifest, ChunkStatus};
use crate::config::Config;
use crate::crawler::CrawlSummary;
use crate::triage::TriageSummary;
use std::fmt::Write;

/// Renders the validated configuration and what a crawl would do
///
/// # Arguments
///
/// * `config` - The loaded configuration
/// * `hash` - Configuration file hash
pub fn render_config_plan(config: &Config, hash: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Darkwatch Configuration ===\n");
    let _ = writeln!(out, "Config hash: {}\n", hash);

    let _ = writeln!(out, "Crawler:");
    let _ = writeln!(out, "  Max pages per seed: {}", config.crawler.max_pages);
    let _ = writeln!(
        out,
        "  Politeness delay: {}-{}ms",
        config.crawler.delay_min_ms, config.crawler.delay_max_ms
    );
    let _ = writeln!(out, "  Default engine: {}", config.crawler.engine);

    let _ = writeln!(out, "\nFetch:");
    let _ = writeln!(out, "  Timeout: {}s", config.fetch.timeout_secs);
    let _ = writeln!(out, "  Max HTML bytes: {}", config.fetch.max_html_bytes);
    let _ = writeln!(out, "  Max redirects: {}", config.fetch.max_redirects);
    if config.fetch.use_proxy {
        let _ = writeln!(
            out,
            "  Proxy: lightweight {}, browser {}",
            config.fetch.lightweight_proxy, config.fetch.browser_proxy
        );
    } else {
        let _ = writeln!(out, "  Proxy: disabled");
    }

    let _ = writeln!(out, "\nOutput:");
    let _ = writeln!(out, "  Log: {}", config.output.log_path.display());
    match &config.output.sqlite_path {
        Some(path) => {
            let _ = writeln!(out, "  SQLite mirror: {}", path.display());
        }
        None => {
            let _ = writeln!(out, "  SQLite mirror: disabled");
        }
    }

    if config.quarantine.enabled {
        let _ = writeln!(
            out,
            "\nQuarantine: enabled ({}, max {} per thread, {} bytes per file)",
            config.quarantine.out_dir.display(),
            config.quarantine.max_per_thread,
            config.quarantine.max_file_bytes
        );
    } else {
        let _ = writeln!(out, "\nQuarantine: disabled");
    }

    let _ = writeln!(out, "\nForums ({}):", config.forums.len());
    for (key, profile) in &config.forums {
        let engine = profile
            .engine
            .map(|e| e.to_string())
            .unwrap_or_else(|| "default".to_string());
        let _ = writeln!(out, "  - {} ({} seeds, engine {})", key, profile.list_urls.len(), engine);
        for seed in &profile.list_urls {
            let _ = writeln!(out, "    * {}", seed);
        }
    }

    let seeds: usize = config.forums.values().map(|p| p.list_urls.len()).sum();
    let _ = writeln!(out, "\n✓ Configuration is valid");
    let _ = writeln!(out, "✓ Would start crawling with {} seed URLs", seeds);
    out
}

pub fn print_config_plan(config: &Config, hash: &str) {
    print!("{}", render_config_plan(config, hash));
}

/// Renders per-forum counters of a crawl run
pub fn render_crawl_summary(summary: &CrawlSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Crawl Summary ===\n");
    let _ = writeln!(out, "Log: {}", summary.log_path.display());
    let _ = writeln!(out, "Threads saved: {}\n", summary.threads_saved());

    let _ = writeln!(
        out,
        "  {:<20} {:>6} {:>6} {:>8} {:>8} {:>8}",
        "forum", "lists", "l-fail", "saved", "t-fail", "skipped"
    );
    for report in &summary.reports {
        let _ = writeln!(
            out,
            "  {:<20} {:>6} {:>6} {:>8} {:>8} {:>8}",
            report.forum,
            report.list_pages,
            report.list_failures,
            report.threads_saved,
            report.thread_failures,
            report.threads_skipped
        );
    }

    if !summary.missing_forums.is_empty() {
        let _ = writeln!(out, "\nNo profile configured ({}):", summary.missing_forums.len());
        for forum in &summary.missing_forums {
            let _ = writeln!(out, "  - {}", forum);
        }
    }
    out
}

pub fn print_crawl_summary(summary: &CrawlSummary) {
    print!("{}", render_crawl_summary(summary));
}

/// Renders pass counts and where each output went
pub fn render_triage_summary(summary: &TriageSummary) -> String {
    let mut out = String::new();
    let outputs = &summary.outputs;
    let _ = writeln!(out, "=== Triage Summary ===\n");
    let _ = writeln!(out, "Input: {}\n", summary.input.display());

    if let Some(strict) = &summary.strict {
        let _ = writeln!(out, "[STRICT] total={}, kept={}", strict.total, strict.kept);
        let _ = writeln!(out, "  {}", outputs.strict_filtered.display());
        let _ = writeln!(out, "  {}", outputs.strict_summary.display());
    }
    if let Some(relaxed) = &summary.relaxed {
        let _ = writeln!(out, "[RELAXED] total={}, kept={}", relaxed.total, relaxed.kept);
        let _ = writeln!(out, "  {}", outputs.relaxed_filtered.display());
        let _ = writeln!(out, "  {}", outputs.relaxed_summary.display());
    }
    if let Some(split) = &summary.split {
        let _ = writeln!(
            out,
            "[TRIAGE] keep={}, review={}, drop_meta={}",
            split.keep, split.review, split.drop
        );
        let _ = writeln!(out, "  {}", outputs.relaxed_keep.display());
        let _ = writeln!(out, "  {}", outputs.relaxed_review.display());
        let _ = writeln!(out, "  {}", outputs.relaxed_drop_meta.display());
    }
    out
}

pub fn print_triage_summary(summary: &TriageSummary) {
    print!("{}", render_triage_summary(summary));
}

/// Renders one line per chunk plus a success rate
pub fn render_batch_manifest(manifest: &BatchManifest) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Batch: {} ===\n", manifest.forum);

    for chunk in &manifest.chunks {
        let status = match chunk.status {
            ChunkStatus::Succeeded => "ok",
            ChunkStatus::Failed => "FAILED",
        };
        let strategy = chunk
            .strategy
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        let log = chunk
            .log_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "  {:<16} {:<7} {:<12} attempts={} threads={} log={}",
            chunk.plan().to_string(),
            status,
            strategy,
            chunk.attempts,
            chunk.threads_saved,
            log
        );
    }

    let total = manifest.chunks.len();
    let succeeded = manifest.succeeded_count();
    let rate = if total > 0 {
        (succeeded as f64 / total as f64) * 100.0
    } else {
        0.0
    };
    let _ = writeln!(out, "\nSucceeded: {}/{} ({:.1}%)", succeeded, total, rate);
    out
}

pub fn print_batch_manifest(manifest: &BatchManifest) {
    print!("{}", render_batch_manifest(manifest));
}

/// One-line rendering of a finding
pub fn render_finding(finding: &Finding) -> String {
    let title = finding.thread_title.as_deref().unwrap_or("(untitled)");
    format!(
        "[{}] {} {} | {} | {}",
        finding.risk,
        finding.posted_at.format("%Y-%m-%d %H:%M"),
        finding.source,
        title,
        finding.post_url
    )
}

pub fn print_finding(finding: &Finding) {
    println!("{}", render_finding(finding));
}
