//! Persisted set of already-alerted finding identifiers
//!
//! One identifier per line. Loaded once at start, appended on discovery.

use crate::DarkwatchError;
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct SeenStore {
    path: Option<PathBuf>,
    ids: HashSet<String>,
}

impl SeenStore {
    /// Loads the identifier file; a missing file is an empty set
    pub fn load(path: &Path) -> Result<Self, DarkwatchError> {
        let ids = match std::fs::read_to_string(path) {
            Ok(content) => content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!("Loaded {} seen id(s) from {}", ids.len(), path.display());
        Ok(Self {
            path: Some(path.to_path_buf()),
            ids,
        })
    }

    /// A store that is never written to disk
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Records an identifier, appending it to the file when new
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The identifier was new
    /// * `Ok(false)` - Already seen
    pub fn mark(&mut self, id: &str) -> Result<bool, DarkwatchError> {
        if self.ids.contains(id) {
            return Ok(false);
        }
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            writeln!(file, "{}", id)?;
        }
        self.ids.insert(id.to_string());
        Ok(true)
    }
}
