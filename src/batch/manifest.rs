//! Batch manifest: which chunks succeeded, which need a resume

use crate::batch::plan::ChunkPlan;
use crate::crawler::FetchStrategy;
use crate::DarkwatchError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    Succeeded,
    Failed,
}

/// Result of running one chunk through the escalation ladder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkOutcome {
    pub start: u32,
    pub pages: u32,
    pub status: ChunkStatus,
    /// Strategy of the successful attempt
    pub strategy: Option<FetchStrategy>,
    /// Attempts across both strategies
    pub attempts: u32,
    /// Log of the last attempt
    pub log_path: Option<PathBuf>,
    #[serde(default)]
    pub threads_saved: u32,
}

impl ChunkOutcome {
    pub fn plan(&self) -> ChunkPlan {
        ChunkPlan {
            start: self.start,
            pages: self.pages,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == ChunkStatus::Succeeded
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchManifest {
    pub forum: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub chunks: Vec<ChunkOutcome>,
}

impl BatchManifest {
    pub fn new(forum: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            forum: forum.into(),
            created_at: now,
            updated_at: now,
            chunks: Vec::new(),
        }
    }

    /// Inserts an outcome, replacing any earlier outcome for the same start page
    pub fn record(&mut self, outcome: ChunkOutcome) {
        self.updated_at = Utc::now();
        match self.chunks.iter_mut().find(|c| c.start == outcome.start) {
            Some(existing) => *existing = outcome,
            None => {
                self.chunks.push(outcome);
                self.chunks.sort_by_key(|c| c.start);
            }
        }
    }

    pub fn failed_chunks(&self) -> Vec<ChunkPlan> {
        self.chunks
            .iter()
            .filter(|c| !c.succeeded())
            .map(ChunkOutcome::plan)
            .collect()
    }

    pub fn succeeded_count(&self) -> usize {
        self.chunks.iter().filter(|c| c.succeeded()).count()
    }

    pub fn save(&self, path: &Path) -> Result<(), DarkwatchError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, DarkwatchError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// `<log dir>/batch_<forum>_<timestamp>.json`
pub fn manifest_path(log_base: &Path, forum: &str, at: DateTime<Utc>) -> PathBuf {
    log_base.with_file_name(format!(
        "batch_{}_{}.json",
        forum,
        at.format(crate::storage::RUN_TIMESTAMP_FORMAT)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn outcome(start: u32, status: ChunkStatus) -> ChunkOutcome {
        ChunkOutcome {
            start,
            pages: 200,
            status,
            strategy: None,
            attempts: 4,
            log_path: None,
            threads_saved: 0,
        }
    }

    #[test]
    fn test_record_replaces_by_start() {
        let mut manifest = BatchManifest::new("f");
        manifest.record(outcome(201, ChunkStatus::Failed));
        manifest.record(outcome(1, ChunkStatus::Succeeded));
        assert_eq!(manifest.failed_chunks(), vec![ChunkPlan { start: 201, pages: 200 }]);

        manifest.record(outcome(201, ChunkStatus::Succeeded));
        assert!(manifest.failed_chunks().is_empty());
        assert_eq!(manifest.chunks.len(), 2);
        assert_eq!(manifest.chunks[0].start, 1);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("batch.json");
        let mut manifest = BatchManifest::new("darkforums");
        manifest.record(outcome(1, ChunkStatus::Succeeded));
        manifest.save(&path).unwrap();

        let loaded = BatchManifest::load(&path).unwrap();
        assert_eq!(loaded, manifest);
    }

    #[test]
    fn test_manifest_path() {
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            manifest_path(Path::new("out/crawl.jsonl"), "darkforums", at),
            PathBuf::from("out/batch_darkforums_20240102_030405.json")
        );
    }
}
