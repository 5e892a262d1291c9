//! Batch escalation runner
//!
//! Crawls a large page range as independent chunks. Each chunk is tried with
//! the lightweight strategy a few times (randomized backoff and an optional
//! circuit refresh in between), then escalated once to the browser strategy.
//! A chunk that fails both is recorded and the runner moves on; the manifest
//! lets a later run resume only the failed ranges.

mod manifest;
mod plan;

pub use manifest::{manifest_path, BatchManifest, ChunkOutcome, ChunkStatus};
pub use plan::{plan_chunks, ChunkPlan};

use crate::config::{BatchConfig, Config};
use crate::crawler::{crawl_profile, CrawlReport, FetchStrategy, Politeness};
use crate::storage::{timestamped_path, JsonlLog, RecordSink};
use crate::DarkwatchError;
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

/// Result of one successful-or-not chunk attempt that ran to completion
#[derive(Debug, Clone)]
pub struct ChunkRun {
    pub log_path: PathBuf,
    pub report: CrawlReport,
}

/// Runs one chunk with one strategy
#[async_trait]
pub trait ChunkExecutor: Send + Sync {
    /// Log file for one attempt, chosen before the attempt starts
    fn log_path(&self, chunk: ChunkPlan, strategy: FetchStrategy) -> PathBuf;

    async fn run_chunk(
        &self,
        chunk: ChunkPlan,
        strategy: FetchStrategy,
        log_path: &Path,
    ) -> Result<CrawlReport, DarkwatchError>;
}

/// Hook run between lightweight attempts, e.g. to request a new Tor circuit
#[async_trait]
pub trait CircuitRefresh: Send + Sync {
    async fn refresh(&self);
}

/// No circuit refresh configured
pub struct NoRefresh;

#[async_trait]
impl CircuitRefresh for NoRefresh {
    async fn refresh(&self) {}
}

/// Runs an external command; failures are logged, never fatal
pub struct CommandCircuitRefresh {
    argv: Vec<String>,
}

impl CommandCircuitRefresh {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

#[async_trait]
impl CircuitRefresh for CommandCircuitRefresh {
    async fn refresh(&self) {
        let Some((program, args)) = self.argv.split_first() else {
            return;
        };

        let result = Command::new(program)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await;

        match result {
            Ok(output) if output.status.success() => info!("Circuit refresh command succeeded"),
            Ok(output) => warn!(
                "Circuit refresh exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
            Err(e) => warn!("Circuit refresh command '{}' failed to start: {}", program, e),
        }
    }
}

/// Executes chunks by crawling a page-offset copy of a forum profile
pub struct CrawlChunkExecutor {
    config: Config,
    forum: String,
}

impl CrawlChunkExecutor {
    /// Fails with `ConfigMissing` when the forum has no profile
    pub fn new(config: Config, forum: &str) -> Result<Self, DarkwatchError> {
        config.forum(forum)?;
        Ok(Self {
            config,
            forum: forum.to_string(),
        })
    }
}

#[async_trait]
impl ChunkExecutor for CrawlChunkExecutor {
    fn log_path(&self, chunk: ChunkPlan, _strategy: FetchStrategy) -> PathBuf {
        timestamped_path(
            &self.config.output.log_path,
            Some(&chunk.label(&self.forum)),
            Utc::now(),
        )
    }

    async fn run_chunk(
        &self,
        chunk: ChunkPlan,
        strategy: FetchStrategy,
        log_path: &Path,
    ) -> Result<CrawlReport, DarkwatchError> {
        let scoped = self.config.forum(&self.forum)?.with_start_page(chunk.start);
        let mut log = JsonlLog::create(log_path)?;

        let report = crawl_profile(
            &self.forum,
            &scoped,
            strategy,
            chunk.pages,
            &self.config.fetch,
            Politeness::from_config(&self.config.crawler),
            &mut log,
        )
        .await?;
        log.finish().await?;

        Ok(report)
    }
}

/// Batch runner
pub struct BatchRunner<E: ChunkExecutor> {
    executor: E,
    refresh: Box<dyn CircuitRefresh>,
    lightweight_attempts: u32,
    retry_backoff: Politeness,
    chunk_pause: Politeness,
    timeout_per_page: Duration,
}

impl<E: ChunkExecutor> BatchRunner<E> {
    pub fn new(executor: E, config: &BatchConfig) -> Self {
        let refresh: Box<dyn CircuitRefresh> = match &config.circuit_refresh {
            Some(argv) if !argv.is_empty() => Box::new(CommandCircuitRefresh::new(argv.clone())),
            _ => Box::new(NoRefresh),
        };
        Self {
            executor,
            refresh,
            lightweight_attempts: config.lightweight_attempts.max(1),
            retry_backoff: Politeness::from_millis(config.retry_backoff_min_ms, config.retry_backoff_max_ms),
            chunk_pause: Politeness::from_millis(config.chunk_pause_min_ms, config.chunk_pause_max_ms),
            timeout_per_page: Duration::from_secs(config.chunk_timeout_per_page_secs),
        }
    }

    pub fn with_refresh(mut self, refresh: Box<dyn CircuitRefresh>) -> Self {
        self.refresh = refresh;
        self
    }

    /// Replaces the retry backoff and inter-chunk pause
    pub fn with_delays(mut self, retry_backoff: Politeness, chunk_pause: Politeness) -> Self {
        self.retry_backoff = retry_backoff;
        self.chunk_pause = chunk_pause;
        self
    }

    pub fn with_timeout_per_page(mut self, timeout: Duration) -> Self {
        self.timeout_per_page = timeout;
        self
    }

    /// Runs every chunk in order and returns the manifest
    ///
    /// Chunk failures never stop the run.
    pub async fn run(&self, forum: &str, chunks: &[ChunkPlan]) -> BatchManifest {
        let mut manifest = BatchManifest::new(forum);
        self.run_into(&mut manifest, chunks).await;
        manifest
    }

    /// Re-runs only the failed chunks of an earlier manifest
    pub async fn resume(&self, mut manifest: BatchManifest) -> BatchManifest {
        let failed = manifest.failed_chunks();
        info!(forum = %manifest.forum, "Resuming {} failed chunk(s)", failed.len());
        self.run_into(&mut manifest, &failed).await;
        manifest
    }

    async fn run_into(&self, manifest: &mut BatchManifest, chunks: &[ChunkPlan]) {
        for (index, chunk) in chunks.iter().enumerate() {
            info!(forum = %manifest.forum, chunk = chunk.start, "==== Batch {} ({} pages) ====", chunk, chunk.pages);
            let outcome = self.run_chunk(*chunk).await;
            if !outcome.succeeded() {
                warn!(chunk = chunk.start, "Chunk {} failed on every strategy", chunk);
            }
            manifest.record(outcome);

            if index + 1 < chunks.len() {
                self.chunk_pause.pause().await;
            }
        }
        info!(
            forum = %manifest.forum,
            "Finished: {} of {} chunk(s) succeeded",
            manifest.succeeded_count(),
            manifest.chunks.len()
        );
    }

    /// Lightweight attempts, then one browser escalation
    pub async fn run_chunk(&self, chunk: ChunkPlan) -> ChunkOutcome {
        let mut attempts = 0;
        let mut last_log = None;

        for attempt in 1..=self.lightweight_attempts {
            attempts += 1;
            match self.attempt(chunk, FetchStrategy::Lightweight).await {
                Ok(run) => return succeeded(chunk, FetchStrategy::Lightweight, attempts, run),
                Err((log, reason)) => {
                    last_log = log.or(last_log);
                    warn!(chunk = chunk.start, attempt, "Lightweight attempt failed: {}", reason);
                }
            }
            if attempt < self.lightweight_attempts {
                self.retry_backoff.pause().await;
                self.refresh.refresh().await;
            }
        }

        info!(chunk = chunk.start, "Escalating to browser strategy");
        attempts += 1;
        match self.attempt(chunk, FetchStrategy::Browser).await {
            Ok(run) => succeeded(chunk, FetchStrategy::Browser, attempts, run),
            Err((log, reason)) => {
                warn!(chunk = chunk.start, "Browser attempt failed: {}", reason);
                ChunkOutcome {
                    start: chunk.start,
                    pages: chunk.pages,
                    status: ChunkStatus::Failed,
                    strategy: None,
                    attempts,
                    log_path: log.or(last_log),
                    threads_saved: 0,
                }
            }
        }
    }

    /// One bounded attempt; a run with list-page failures counts as failed
    ///
    /// An aborted attempt still reports its log when records reached it.
    async fn attempt(
        &self,
        chunk: ChunkPlan,
        strategy: FetchStrategy,
    ) -> Result<ChunkRun, (Option<PathBuf>, String)> {
        let limit = self.timeout_per_page.saturating_mul(chunk.pages.max(1));
        let log_path = self.executor.log_path(chunk, strategy);
        let partial = |path: PathBuf| path.exists().then_some(path);

        match tokio::time::timeout(limit, self.executor.run_chunk(chunk, strategy, &log_path)).await {
            Err(_) => Err((partial(log_path), format!("timed out after {:?}", limit))),
            Ok(Err(e)) => Err((partial(log_path), e.to_string())),
            Ok(Ok(report)) if report.had_list_failures() => Err((
                Some(log_path),
                format!("{} list page(s) could not be fetched", report.list_failures),
            )),
            Ok(Ok(report)) => Ok(ChunkRun { log_path, report }),
        }
    }
}

fn succeeded(chunk: ChunkPlan, strategy: FetchStrategy, attempts: u32, run: ChunkRun) -> ChunkOutcome {
    ChunkOutcome {
        start: chunk.start,
        pages: chunk.pages,
        status: ChunkStatus::Succeeded,
        strategy: Some(strategy),
        attempts,
        log_path: Some(run.log_path),
        threads_saved: run.report.threads_saved,
    }
}
