//! Append-only JSON Lines log, the primary record sink
//!
//! One `ThreadRecord` per line, flushed as soon as it is written. Readers
//! skip blank and malformed lines instead of failing.

use crate::records::ThreadRecord;
use crate::storage::traits::RecordSink;
use crate::DarkwatchError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Timestamp format embedded in log file names
pub const RUN_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Name fragments that mark a file as a triage output rather than a crawl log
const TRIAGE_MARKERS: [&str; 2] = [".strict.", ".relaxed."];

/// Primary crawl log
pub struct JsonlLog {
    path: PathBuf,
    file: File,
    written: u64,
}

impl JsonlLog {
    /// Opens (creating parents) the exact path given, appending to it
    pub fn create(path: &Path) -> Result<Self, DarkwatchError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| persistence(path, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| persistence(path, e))?;

        tracing::info!("Writing records to {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            file,
            written: 0,
        })
    }

    /// Opens a fresh log next to `base`, named `<stem>_<timestamp>.jsonl`
    pub fn create_timestamped(base: &Path) -> Result<Self, DarkwatchError> {
        Self::create(&timestamped_path(base, None, Utc::now()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records written through this handle
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Serializes and appends one record, flushing immediately
    pub fn append(&mut self, record: &ThreadRecord) -> Result<(), DarkwatchError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        self.file
            .write_all(line.as_bytes())
            .and_then(|_| self.file.flush())
            .map_err(|e| persistence(&self.path, e))?;
        self.written += 1;
        Ok(())
    }
}

#[async_trait]
impl RecordSink for JsonlLog {
    async fn accept(&mut self, record: &ThreadRecord) -> Result<(), DarkwatchError> {
        self.append(record)
    }

    async fn finish(&mut self) -> Result<(), DarkwatchError> {
        self.file
            .sync_data()
            .map_err(|e| persistence(&self.path, e))?;
        tracing::info!("Saved {} record(s) to {}", self.written, self.path.display());
        Ok(())
    }
}

/// Builds `<dir>/<stem>[_<label>]_<timestamp>.jsonl` from a configured base path
///
/// # Arguments
///
/// * `base` - Configured log path, e.g. `out/crawl.jsonl`
/// * `label` - Optional infix, used by batch chunks (`<forum>_p<start>`)
/// * `at` - Run timestamp
pub fn timestamped_path(base: &Path, label: Option<&str>, at: DateTime<Utc>) -> PathBuf {
    let stem = base
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("crawl");
    let ts = at.format(RUN_TIMESTAMP_FORMAT);
    let name = match label {
        Some(label) => format!("{}_{}_{}.jsonl", stem, label, ts),
        None => format!("{}_{}.jsonl", stem, ts),
    };
    base.with_file_name(name)
}

/// Reads every parseable record from a log
///
/// Blank lines are ignored; malformed lines are counted, logged, and skipped.
pub fn read_records(path: &Path) -> Result<Vec<ThreadRecord>, DarkwatchError> {
    let file = File::open(path)?;
    let mut records = Vec::new();
    let mut skipped = 0usize;

    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<ThreadRecord>(trimmed) {
            Ok(record) => records.push(record),
            Err(e) => {
                skipped += 1;
                tracing::debug!("Skipping malformed line {} in {}: {}", index + 1, path.display(), e);
            }
        }
    }

    if skipped > 0 {
        tracing::warn!("Skipped {} malformed line(s) in {}", skipped, path.display());
    }
    Ok(records)
}

/// Returns true for files written by the triage pipeline
pub fn is_triage_output(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|name| TRIAGE_MARKERS.iter().any(|m| name.contains(m)))
        .unwrap_or(false)
}

/// Finds the most recently modified crawl log in a directory
///
/// Triage outputs in the same directory are ignored.
pub fn latest_log(dir: &Path) -> Result<Option<PathBuf>, DarkwatchError> {
    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("jsonl") || is_triage_output(&path) {
            continue;
        }
        let modified = std::fs::metadata(&path)?.modified()?;
        if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
            newest = Some((modified, path));
        }
    }

    Ok(newest.map(|(_, path)| path))
}

fn persistence(path: &Path, error: std::io::Error) -> DarkwatchError {
    DarkwatchError::Persistence(format!("{}: {}", path.display(), error))
}
