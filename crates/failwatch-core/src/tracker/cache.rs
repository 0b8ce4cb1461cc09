//! On-disk cache of resolved reasons.
//!
//! A JSON object mapping cleaned reason text to `{issue_id, link}`, or `{}`
//! when a search found nothing. An entry stays authoritative until the file
//! is deleted.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::error::{TrackerError, TrackerResult};
use crate::model::TrackerMatch;

#[derive(Debug, Clone)]
pub struct TrackerCache {
    path: PathBuf,
    entries: BTreeMap<String, TrackerMatch>,
}

impl TrackerCache {
    /// Load `path`; a missing or unreadable file starts an empty cache.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "ignoring corrupt tracker cache");
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "tracker cache not readable");
                BTreeMap::new()
            }
        };
        debug!(path = %path.display(), entries = entries.len(), "loaded tracker cache");
        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&TrackerMatch> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record `value` for `key` and rewrite the file.
    pub fn insert(&mut self, key: impl Into<String>, value: TrackerMatch) -> TrackerResult<()> {
        self.entries.insert(key.into(), value);
        self.persist()
    }

    fn persist(&self) -> TrackerResult<()> {
        let cache_err = |e: &dyn std::fmt::Display| TrackerError::Cache {
            message: format!("{}: {}", self.path.display(), e),
        };
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| cache_err(&e))?;

        let body = serde_json::to_vec_pretty(&self.entries).map_err(|e| cache_err(&e))?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| cache_err(&e))?;
        tmp.write_all(&body).map_err(|e| cache_err(&e))?;
        tmp.persist(&self.path).map_err(|e| cache_err(&e.error))?;
        debug!(path = %self.path.display(), "tracker cache saved");
        Ok(())
    }
}
