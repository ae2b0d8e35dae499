//! Snapshot persistence for the knowledge store
//!
//! The whole store is serialized as one pretty-printed JSON document. File
//! writes go to a sibling temp file first and are renamed into place, so a
//! crash mid-write never leaves a truncated snapshot behind.

use super::models::{RecentUpdate, Topic};
use crate::error::{LearningError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

pub const SNAPSHOT_VERSION: u32 = 1;

/// Serialized form of the whole store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub topics: BTreeMap<String, Topic>,
    #[serde(default)]
    pub recent_updates: Vec<RecentUpdate>,
    /// Domain reputations adjusted by accuracy feedback
    #[serde(default)]
    pub reputation: BTreeMap<String, f32>,
    /// Coordinator counters (searches performed, outcomes)
    #[serde(default)]
    pub counters: BTreeMap<String, u64>,
}

impl Snapshot {
    pub fn new(topics: BTreeMap<String, Topic>, recent_updates: Vec<RecentUpdate>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            topics,
            recent_updates,
            reputation: BTreeMap::new(),
            counters: BTreeMap::new(),
        }
    }
}

/// Where snapshots are kept
pub trait SnapshotBackend: Send + Sync + std::fmt::Debug {
    /// Load the last snapshot; `None` when nothing has been saved yet
    fn load(&self) -> Result<Option<Snapshot>>;

    fn save(&self, snapshot: &Snapshot) -> Result<()>;
}

/// JSON file on local disk
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "knowledge.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SnapshotBackend for JsonFileBackend {
    fn load(&self) -> Result<Option<Snapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.path)?;
        let snapshot: Snapshot = serde_json::from_str(&contents).map_err(|e| {
            LearningError::Persistence(format!(
                "Failed to parse snapshot {}: {}",
                self.path.display(),
                e
            ))
        })?;

        if snapshot.version > SNAPSHOT_VERSION {
            return Err(LearningError::Persistence(format!(
                "Snapshot version {} is newer than supported version {}",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }

        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(snapshot)?;
        let temp = self.temp_path();
        fs::write(&temp, json)?;
        fs::rename(&temp, &self.path)?;

        debug!(path = %self.path.display(), topics = snapshot.topics.len(), "Snapshot saved");
        Ok(())
    }
}

/// In-process backend, used in tests and for ephemeral deployments
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    snapshot: Arc<Mutex<Option<Snapshot>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last saved snapshot, if any
    pub fn snapshot(&self) -> Option<Snapshot> {
        self.snapshot.lock().ok().and_then(|guard| guard.clone())
    }
}

impl SnapshotBackend for MemoryBackend {
    fn load(&self) -> Result<Option<Snapshot>> {
        let guard = self
            .snapshot
            .lock()
            .map_err(|_| LearningError::Persistence("memory backend lock poisoned".to_string()))?;
        Ok(guard.clone())
    }

    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let mut guard = self
            .snapshot
            .lock()
            .map_err(|_| LearningError::Persistence("memory backend lock poisoned".to_string()))?;
        *guard = Some(snapshot.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_backend_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileBackend::new(dir.path().join("none.json"));
        assert!(backend.load().unwrap().is_none());
    }

    #[test]
    fn test_json_backend_creates_dirs_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("knowledge.json");
        let backend = JsonFileBackend::new(&path);

        let mut topics = BTreeMap::new();
        topics.insert("rust".to_string(), Topic::new("rust"));
        let snapshot = Snapshot::new(topics, Vec::new());

        backend.save(&snapshot).unwrap();
        assert!(path.exists());
        assert!(!backend.temp_path().exists());
        assert_eq!(backend.load().unwrap(), Some(snapshot));
    }

    #[test]
    fn test_json_backend_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knowledge.json");
        fs::write(&path, "{ not json").unwrap();

        let result = JsonFileBackend::new(&path).load();
        assert!(matches!(result, Err(LearningError::Persistence(_))));
    }

    #[test]
    fn test_snapshot_without_learning_history_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knowledge.json");
        fs::write(
            &path,
            r#"{"version": 1, "saved_at": "2026-01-01T00:00:00Z", "topics": {}}"#,
        )
        .unwrap();

        let snapshot = JsonFileBackend::new(&path).load().unwrap().unwrap();
        assert!(snapshot.reputation.is_empty());
        assert!(snapshot.counters.is_empty());
        assert!(snapshot.recent_updates.is_empty());
    }

    #[test]
    fn test_memory_backend() {
        let backend = MemoryBackend::new();
        assert!(backend.load().unwrap().is_none());

        let snapshot = Snapshot::new(BTreeMap::new(), Vec::new());
        backend.save(&snapshot).unwrap();
        assert_eq!(backend.snapshot(), Some(snapshot));
    }
}
