//! Polling feed of new findings for dashboard-style consumers

use crate::alert::{known_findings, Finding, SeenStore};
use crate::storage::is_triage_output;
use crate::DarkwatchError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Where the feed looks for crawl logs
#[derive(Debug, Clone)]
pub enum FeedSource {
    Files(Vec<PathBuf>),
    /// Every non-triage `.jsonl` file in the directory
    Directory(PathBuf),
}

impl FeedSource {
    /// Resolves the logs to read right now
    pub fn logs(&self) -> Result<Vec<PathBuf>, DarkwatchError> {
        match self {
            Self::Files(paths) => Ok(paths.clone()),
            Self::Directory(dir) => scan_directory(dir),
        }
    }
}

fn scan_directory(dir: &Path) -> Result<Vec<PathBuf>, DarkwatchError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut logs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("jsonl") && !is_triage_output(&path) {
            logs.push(path);
        }
    }
    logs.sort();
    Ok(logs)
}

/// Re-reads the logs on an interval and streams findings not yet seen
pub struct AlertFeed {
    source: FeedSource,
    seen: SeenStore,
    interval: Duration,
}

impl AlertFeed {
    pub fn new(source: FeedSource, seen: SeenStore, interval: Duration) -> Self {
        Self {
            source,
            seen,
            interval,
        }
    }

    /// Starts polling in a background task
    ///
    /// A finding is marked seen only after the receiver accepted it. The task
    /// ends when the receiver is dropped.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Channel buffer size
    pub fn spawn(mut self, capacity: usize) -> (mpsc::Receiver<Finding>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.poll(&tx).await {
                            match e {
                                PollError::Closed => break,
                                PollError::Failed(e) => tracing::warn!("Alert feed poll failed: {}", e),
                            }
                        }
                    }
                    _ = tx.closed() => break,
                }
            }
            tracing::debug!("Alert feed stopped");
        });

        (rx, handle)
    }

    async fn poll(&mut self, tx: &mpsc::Sender<Finding>) -> Result<(), PollError> {
        let source = self.source.clone();
        let findings = tokio::task::spawn_blocking(move || {
            let logs = source.logs()?;
            known_findings(&logs)
        })
        .await
        .map_err(|e| PollError::Failed(DarkwatchError::Persistence(e.to_string())))?
        .map_err(PollError::Failed)?;

        for finding in findings {
            if self.seen.contains(&finding.id) {
                continue;
            }
            let id = finding.id.clone();
            tx.send(finding).await.map_err(|_| PollError::Closed)?;
            self.seen.mark(&id).map_err(PollError::Failed)?;
        }
        Ok(())
    }
}

enum PollError {
    Closed,
    Failed(DarkwatchError),
}
