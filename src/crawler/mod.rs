//! Crawler module for forum fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - The two fetch strategies and their safety guards
//! - Selector-driven parsing of list and thread pages
//! - Politeness delays and retry backoff
//! - Overall crawl coordination

mod browser;
mod coordinator;
mod fetcher;
mod http;
mod parser;
mod scheduler;

pub use browser::BrowserFetcher;
pub use coordinator::{Coordinator, CrawlReport};
pub use fetcher::{
    build_fetcher, guard_headers, guard_size, guard_url, media_type, FetchStrategy, FetchedPage,
    Fetcher, HTML_CONTENT_TYPES,
};
pub use http::{build_http_client, HttpFetcher};
pub use parser::{parse_list_page, parse_thread, resolve_field, ListPage};
pub use scheduler::{ExponentialBackoff, Politeness};

use crate::config::{Config, FetchConfig, ForumProfile};
use crate::quarantine::QuarantineDownloader;
use crate::storage::{JsonlLog, RecordSink, SinkChain, SqliteMirror};
use crate::DarkwatchError;
use std::path::PathBuf;

/// Per-run overrides of the configuration, usually from the command line
#[derive(Debug, Clone, Default)]
pub struct CrawlOptions {
    /// Forces a strategy for every forum; `None` defers to profile hints
    pub strategy: Option<FetchStrategy>,
    pub max_pages: Option<u32>,
    pub use_proxy: Option<bool>,
    /// Exact log path; `None` derives a timestamped one from `[output].log-path`
    pub log_path: Option<PathBuf>,
}

/// Outcome of a multi-forum crawl
#[derive(Debug, Clone, Default)]
pub struct CrawlSummary {
    pub log_path: PathBuf,
    pub reports: Vec<CrawlReport>,
    /// Forum keys with no profile in the configuration
    pub missing_forums: Vec<String>,
}

impl CrawlSummary {
    pub fn threads_saved(&self) -> u32 {
        self.reports.iter().map(|r| r.threads_saved).sum()
    }
}

/// Crawls one forum profile into `sink`
///
/// The fetcher is shut down on every exit path, including coordinator errors.
///
/// # Arguments
///
/// * `key` - Forum key, recorded as each record's `source`
/// * `profile` - The (possibly chunk-scoped) profile to crawl
/// * `strategy` - Fetch strategy to use
/// * `max_pages` - List pages per seed
/// * `fetch` - Fetch engine settings
/// * `politeness` - Delay after every fetch
/// * `sink` - Where records go as soon as they are parsed
pub async fn crawl_profile(
    key: &str,
    profile: &ForumProfile,
    strategy: FetchStrategy,
    max_pages: u32,
    fetch: &FetchConfig,
    politeness: Politeness,
    sink: &mut dyn RecordSink,
) -> Result<CrawlReport, DarkwatchError> {
    let compiled = profile.compile(key)?;
    let fetcher = build_fetcher(strategy, fetch)?;

    let result = Coordinator::new(&compiled, fetcher.as_ref(), politeness, max_pages)
        .run(sink)
        .await;

    fetcher.shutdown().await;
    result
}

/// Runs a complete crawl operation
///
/// This is the main entry point for a crawl. It will:
/// 1. Open the primary JSONL log (failure is fatal)
/// 2. Attach the SQLite mirror and quarantine downloader when configured
/// 3. Crawl each requested forum in turn, skipping unknown keys
/// 4. Flush every sink
///
/// # Arguments
///
/// * `config` - The validated configuration
/// * `forum_keys` - Forums to crawl, in order
/// * `options` - Command-line overrides
/// * `extra_sinks` - Additional consumers (e.g. crawl-time alerting)
///
/// # Returns
///
/// * `Ok(CrawlSummary)` - Crawl finished; per-forum failures are in the reports
/// * `Err(DarkwatchError)` - The primary log could not be opened or written
pub async fn run_crawl(
    config: &Config,
    forum_keys: &[String],
    options: &CrawlOptions,
    extra_sinks: Vec<Box<dyn RecordSink>>,
) -> Result<CrawlSummary, DarkwatchError> {
    let mut fetch = config.fetch.clone();
    if let Some(use_proxy) = options.use_proxy {
        fetch.use_proxy = use_proxy;
    }
    let max_pages = options.max_pages.unwrap_or(config.crawler.max_pages);

    let log = match &options.log_path {
        Some(path) => JsonlLog::create(path)?,
        None => JsonlLog::create_timestamped(&config.output.log_path)?,
    };
    let log_path = log.path().to_path_buf();

    let mut sinks = SinkChain::new().with(Box::new(log));
    if let Some(db_path) = &config.output.sqlite_path {
        match SqliteMirror::open(db_path) {
            Ok(mirror) => sinks.push(Box::new(mirror)),
            Err(e) => tracing::warn!("SQLite mirror disabled, cannot open {}: {}", db_path.display(), e),
        }
    }
    if config.quarantine.enabled {
        sinks.push(Box::new(QuarantineDownloader::new(&config.quarantine, &fetch)?));
    }
    for sink in extra_sinks {
        sinks.push(sink);
    }

    let mut summary = CrawlSummary {
        log_path,
        ..CrawlSummary::default()
    };

    for key in forum_keys {
        let profile = match config.forum(key) {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!("{}; skipping", e);
                summary.missing_forums.push(key.clone());
                continue;
            }
        };

        let strategy = FetchStrategy::resolve(options.strategy, profile.engine, config.crawler.engine);
        let report = crawl_profile(
            key,
            profile,
            strategy,
            max_pages,
            &fetch,
            Politeness::from_config(&config.crawler),
            &mut sinks,
        )
        .await?;
        summary.reports.push(report);
    }

    sinks.finish().await?;
    Ok(summary)
}
