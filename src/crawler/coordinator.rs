//! Crawl coordinator - walks one forum profile's list pages and threads
//!
//! This module contains the main crawl loop, including:
//! - Walking each seed through `ListPage -> [ThreadPage]* -> NextListPage -> Done`
//! - Deduplicating thread URLs within the run
//! - Invoking the politeness delay after every fetch
//! - Isolating single-thread failures
//! - Emitting each record to the sink as soon as it is parsed

use crate::config::CompiledProfile;
use crate::crawler::fetcher::Fetcher;
use crate::crawler::parser::{parse_list_page, parse_thread};
use crate::crawler::scheduler::Politeness;
use crate::records::ThreadRecord;
use crate::state::{CrawlPhase, SeedCursor};
use crate::storage::RecordSink;
use crate::url::is_attachment_url;
use crate::{DarkwatchError, FetchError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;
use url::Url;

/// Counters for one coordinator run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlReport {
    pub forum: String,
    pub list_pages: u32,
    pub list_failures: u32,
    pub threads_saved: u32,
    pub thread_failures: u32,
    pub threads_skipped: u32,
}

impl CrawlReport {
    /// True when at least one seed list page could not be fetched
    pub fn had_list_failures(&self) -> bool {
        self.list_failures > 0
    }
}

/// Main crawler coordinator structure
///
/// The visited set lives in the coordinator, so every coordinator (and so
/// every batch chunk) has its own dedup scope.
pub struct Coordinator<'a> {
    profile: &'a CompiledProfile,
    fetcher: &'a dyn Fetcher,
    politeness: Politeness,
    max_pages: u32,
    visited_threads: HashSet<String>,
    visited_lists: HashSet<String>,
    report: CrawlReport,
}

impl<'a> Coordinator<'a> {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `profile` - The compiled forum profile
    /// * `fetcher` - The fetch strategy to use
    /// * `politeness` - Delay applied after every fetch
    /// * `max_pages` - List pages followed per seed, the seed included
    pub fn new(
        profile: &'a CompiledProfile,
        fetcher: &'a dyn Fetcher,
        politeness: Politeness,
        max_pages: u32,
    ) -> Self {
        Self {
            profile,
            fetcher,
            politeness,
            max_pages: max_pages.max(1),
            visited_threads: HashSet::new(),
            visited_lists: HashSet::new(),
            report: CrawlReport {
                forum: profile.key.clone(),
                ..CrawlReport::default()
            },
        }
    }

    /// Runs the crawl over every seed list URL
    ///
    /// Thread and list-page failures are logged and counted. Only sink
    /// errors, meaning the primary log could not be written, abort the run.
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlReport)` - The walk finished (possibly with isolated failures)
    /// * `Err(DarkwatchError)` - The primary log failed
    pub async fn run(mut self, sink: &mut dyn RecordSink) -> Result<CrawlReport, DarkwatchError> {
        let start_time = Instant::now();
        tracing::info!(
            forum = %self.profile.key,
            strategy = %self.fetcher.strategy(),
            "Starting crawl of {} seed(s), up to {} page(s) each",
            self.profile.list_urls.len(),
            self.max_pages
        );

        for seed in self.profile.list_urls.clone() {
            self.walk_seed(seed, sink).await?;
        }

        tracing::info!(
            forum = %self.profile.key,
            "Crawl finished: {} threads saved, {} thread failures, {} list failures in {:?}",
            self.report.threads_saved,
            self.report.thread_failures,
            self.report.list_failures,
            start_time.elapsed()
        );

        Ok(self.report)
    }

    async fn walk_seed(&mut self, seed: Url, sink: &mut dyn RecordSink) -> Result<(), DarkwatchError> {
        let mut cursor = SeedCursor::new(seed, self.max_pages);

        loop {
            let list_url = cursor.list_url().clone();
            self.visited_lists.insert(list_url.to_string());

            tracing::info!("List page {} of seed: {}", cursor.pages_entered(), list_url);
            let fetched = self.fetcher.fetch_html(&list_url).await;
            self.politeness.pause().await;

            let list = match fetched {
                Ok(page) => {
                    self.report.list_pages += 1;
                    parse_list_page(&page.html, &page.final_url, self.profile)
                }
                Err(e) => {
                    tracing::warn!("Failed to fetch list page {}: {}", list_url, e);
                    self.report.list_failures += 1;
                    cursor.advance(CrawlPhase::Done)?;
                    return Ok(());
                }
            };

            tracing::debug!(
                "Found {} thread link(s) on {}",
                list.thread_links.len(),
                list_url
            );

            for thread_url in list.thread_links {
                if is_attachment_url(thread_url.as_str())
                    || !self.visited_threads.insert(thread_url.to_string())
                {
                    self.report.threads_skipped += 1;
                    continue;
                }

                cursor.advance(CrawlPhase::ThreadPage)?;
                match self.crawl_thread(&thread_url).await {
                    Ok(record) => {
                        sink.accept(&record).await?;
                        self.report.threads_saved += 1;
                        if self.report.threads_saved % 10 == 0 {
                            tracing::info!(
                                forum = %self.profile.key,
                                "Progress: {} threads saved",
                                self.report.threads_saved
                            );
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Thread failed {}: {}", thread_url, e);
                        self.report.thread_failures += 1;
                    }
                }
            }

            cursor.advance(CrawlPhase::NextListPage)?;
            let next = list
                .next_page
                .filter(|url| !self.visited_lists.contains(url.as_str()));
            if cursor.follow_next(next)? == CrawlPhase::Done {
                tracing::debug!("Pagination finished after {} page(s)", cursor.pages_entered());
                return Ok(());
            }
        }
    }

    async fn crawl_thread(&self, thread_url: &Url) -> Result<ThreadRecord, FetchError> {
        let fetched = self.fetcher.fetch_html(thread_url).await;
        self.politeness.pause().await;
        let page = fetched?;
        Ok(parse_thread(&page.html, thread_url, self.profile, Utc::now()))
    }
}
