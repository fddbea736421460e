//! Snapshot persistence

use super::Snapshot;
use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Abstract snapshot persistence; the engine itself keeps state in memory
pub trait SnapshotStore: Send + Sync {
    /// Persist a snapshot, replacing any previous one
    fn save(&self, snapshot: &Snapshot) -> Result<()>;

    /// Most recently saved snapshot, if any
    fn load(&self) -> Result<Option<Snapshot>>;

    fn describe(&self) -> String;
}

/// Stores the latest snapshot as a JSON file
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for JsonFileStore {
    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let path = &self.path;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }

        let json = serde_json::to_vec(snapshot).context("Failed to serialize snapshot")?;

        // Write atomically using temp file
        let temp_path = path.with_extension("tmp");
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .with_context(|| format!("Failed to create temp file {:?}", temp_path))?;
        file.write_all(&json).context("Failed to write snapshot")?;
        file.sync_all().context("Failed to sync snapshot file")?;

        std::fs::rename(&temp_path, path)
            .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, path))?;

        debug!(path = %path.display(), nodes = snapshot.nodes.len(), "Snapshot saved");
        Ok(())
    }

    fn load(&self) -> Result<Option<Snapshot>> {
        let path = &self.path;
        if !path.exists() {
            return Ok(None);
        }

        let mut file =
            File::open(path).with_context(|| format!("Failed to open snapshot file {:?}", path))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .context("Failed to read snapshot file")?;

        let snapshot: Snapshot =
            serde_json::from_slice(&data).context("Failed to deserialize snapshot")?;

        info!(path = %path.display(), nodes = snapshot.nodes.len(), "Loaded snapshot from disk");
        Ok(Some(snapshot))
    }

    fn describe(&self) -> String {
        format!("json file {}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NodeRecord, UtilizationCategory};
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("state").join("snapshot.json"));

        let mut record = NodeRecord::new("n1", None, 5);
        record.category = UtilizationCategory::Lu;
        let snapshot = Snapshot {
            taken_at: 10,
            nodes: vec![record],
        };

        store.save(&snapshot).unwrap();
        assert!(!store.path().with_extension("tmp").exists());
        assert_eq!(store.load().unwrap(), Some(snapshot));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("none.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_load_corrupt_file_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, b"not json").unwrap();
        assert!(JsonFileStore::new(path).load().is_err());
    }

    #[test]
    fn test_save_replaces_previous() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("snapshot.json"));
        store
            .save(&Snapshot {
                taken_at: 1,
                nodes: vec![NodeRecord::new("a", None, 0)],
            })
            .unwrap();
        store
            .save(&Snapshot {
                taken_at: 2,
                nodes: Vec::new(),
            })
            .unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.taken_at, 2);
        assert!(loaded.nodes.is_empty());
    }
}
