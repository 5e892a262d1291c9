//! Per-thread quarantine manifest

use crate::DarkwatchError;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const MANIFEST_FILE: &str = "manifest.json";

/// One saved artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadedArtifact {
    pub url: String,
    pub saved_path: String,
    pub sha256: String,
    pub size: u64,
    pub content_type: String,
}

/// `{thread_url, downloaded: [...]}`, written as `manifest.json` in the thread folder
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarantineManifest {
    pub thread_url: String,
    #[serde(default)]
    pub downloaded: Vec<DownloadedArtifact>,
}

impl QuarantineManifest {
    pub fn new(thread_url: impl Into<String>) -> Self {
        Self {
            thread_url: thread_url.into(),
            downloaded: Vec::new(),
        }
    }

    pub fn write(&self, folder: &Path) -> Result<(), DarkwatchError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(folder.join(MANIFEST_FILE), json)?;
        Ok(())
    }

    pub fn read(folder: &Path) -> Result<Self, DarkwatchError> {
        let content = std::fs::read_to_string(folder.join(MANIFEST_FILE))?;
        Ok(serde_json::from_str(&content)?)
    }
}
