use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    io::ErrorKind,
    path::PathBuf,
};

use chrono::{DateTime, Utc};
use common::{error::AppError, storage::types::knowledge_manifest::ManifestEntry};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{info, warn};

/// Per-space ingestion progress. A page id enters `done` only after its
/// vector upsert and catalog insert have both durably succeeded; `failed`
/// holds pages that were attempted and skipped this run so a later run can
/// retry them even when the space is otherwise complete.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpaceProgress {
    #[serde(default)]
    pub done: BTreeSet<String>,
    #[serde(default)]
    pub failed: BTreeSet<String>,
    #[serde(default)]
    pub completed: bool,
}

impl SpaceProgress {
    /// A space is skipped wholesale on resume only when it completed with
    /// nothing left to retry.
    pub fn skip_entirely(&self) -> bool {
        self.completed && self.failed.is_empty()
    }

    /// A completed space with leftover failures is re-entered for those
    /// pages only.
    pub fn retry_failed_only(&self) -> bool {
        self.completed && !self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Checkpoint {
    #[serde(default)]
    pub processed_spaces: BTreeMap<String, SpaceProgress>,
    #[serde(default)]
    pub ingested_files: Vec<ManifestEntry>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self {
            processed_spaces: BTreeMap::new(),
            ingested_files: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

impl Checkpoint {
    pub fn progress(&self, space_key: &str) -> Option<&SpaceProgress> {
        self.processed_spaces.get(space_key)
    }

    pub fn progress_mut(&mut self, space_key: &str) -> &mut SpaceProgress {
        self.processed_spaces.entry(space_key.to_string()).or_default()
    }

    pub fn is_done(&self, space_key: &str, page_id: &str) -> bool {
        self.progress(space_key)
            .is_some_and(|progress| progress.done.contains(page_id))
    }

    pub fn mark_done(&mut self, space_key: &str, page_id: &str) {
        let progress = self.progress_mut(space_key);
        progress.failed.remove(page_id);
        progress.done.insert(page_id.to_string());
    }

    pub fn mark_failed(&mut self, space_key: &str, page_id: &str) {
        let progress = self.progress_mut(space_key);
        if !progress.done.contains(page_id) {
            progress.failed.insert(page_id.to_string());
        }
    }

    /// Records a manifest entry, replacing any earlier entry for the same
    /// file id so a retried document never appears twice.
    pub fn record_file(&mut self, entry: ManifestEntry) {
        if let Some(existing) = self
            .ingested_files
            .iter_mut()
            .find(|candidate| candidate.id == entry.id)
        {
            *existing = entry;
        } else {
            self.ingested_files.push(entry);
        }
    }

    /// Marks the space completed once every known page is either done or
    /// failed. "Completed" and "everything succeeded" are deliberately
    /// separate facts; failures stay visible in `failed`.
    pub fn finish_space(&mut self, space_key: &str, all_page_ids: &[String]) {
        let progress = self.progress_mut(space_key);
        progress.completed = all_page_ids
            .iter()
            .all(|id| progress.done.contains(id) || progress.failed.contains(id));
    }

    /// True when every recorded space completed without leftover failures.
    pub fn fully_successful(&self) -> bool {
        self.processed_spaces
            .values()
            .all(|progress| progress.completed && progress.failed.is_empty())
    }
}

/// Durable store for the run's checkpoint, atomically rewritten after every
/// ingested document so the granularity of resumability is one page.
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Never fails: a missing file is an empty checkpoint, and an
    /// unparsable one is logged and treated as "start over".
    pub fn load(&self) -> Checkpoint {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Checkpoint::default(),
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "could not read checkpoint; starting over"
                );
                return Checkpoint::default();
            }
        };

        match serde_json::from_slice::<Checkpoint>(&bytes) {
            Ok(checkpoint) => {
                info!(
                    path = %self.path.display(),
                    spaces = checkpoint.processed_spaces.len(),
                    files = checkpoint.ingested_files.len(),
                    "loaded checkpoint"
                );
                checkpoint
            }
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "checkpoint failed to parse; starting over"
                );
                Checkpoint::default()
            }
        }
    }

    /// Atomic rewrite with a refreshed timestamp.
    pub fn save(&self, checkpoint: &mut Checkpoint) -> Result<(), AppError> {
        checkpoint.updated_at = Utc::now();

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, checkpoint)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|err| AppError::Io(err.error))?;
        Ok(())
    }

    /// Removes the checkpoint file. Called only after a fully successful
    /// run so the next invocation starts clean.
    pub fn clear(&self) -> Result<(), AppError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "checkpoint cleared");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(id: &str) -> ManifestEntry {
        ManifestEntry {
            id: id.to_string(),
            file_name: format!("{id}.md"),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = TempDir::new().expect("tempdir");
        let store = CheckpointStore::new(dir.path().join("checkpoint.json"));

        let checkpoint = store.load();
        assert!(checkpoint.processed_spaces.is_empty());
        assert!(checkpoint.ingested_files.is_empty());
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("checkpoint.json");
        fs::write(&path, b"{ not json").expect("write garbage");

        let store = CheckpointStore::new(&path);
        let checkpoint = store.load();
        assert!(checkpoint.processed_spaces.is_empty());
    }

    #[test]
    fn save_and_load_roundtrips() {
        let dir = TempDir::new().expect("tempdir");
        let store = CheckpointStore::new(dir.path().join("checkpoint.json"));

        let mut checkpoint = Checkpoint::default();
        checkpoint.mark_done("ENG", "1");
        checkpoint.mark_failed("ENG", "2");
        checkpoint.record_file(entry("f1"));
        store.save(&mut checkpoint).expect("save");

        let loaded = store.load();
        assert!(loaded.is_done("ENG", "1"));
        assert!(loaded
            .progress("ENG")
            .expect("progress")
            .failed
            .contains("2"));
        assert_eq!(loaded.ingested_files.len(), 1);
    }

    #[test]
    fn clear_removes_file() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("checkpoint.json");
        let store = CheckpointStore::new(&path);

        store.save(&mut Checkpoint::default()).expect("save");
        assert!(path.exists());

        store.clear().expect("clear");
        assert!(!path.exists());

        // Clearing an absent checkpoint is fine.
        store.clear().expect("clear again");
    }

    #[test]
    fn success_moves_page_out_of_failed() {
        let mut checkpoint = Checkpoint::default();
        checkpoint.mark_failed("ENG", "1");
        checkpoint.mark_done("ENG", "1");

        let progress = checkpoint.progress("ENG").expect("progress");
        assert!(progress.done.contains("1"));
        assert!(progress.failed.is_empty());
    }

    #[test]
    fn done_pages_never_enter_failed() {
        let mut checkpoint = Checkpoint::default();
        checkpoint.mark_done("ENG", "1");
        checkpoint.mark_failed("ENG", "1");

        let progress = checkpoint.progress("ENG").expect("progress");
        assert!(progress.done.contains("1"));
        assert!(progress.failed.is_empty());
    }

    #[test]
    fn finish_space_requires_full_coverage() {
        let pages: Vec<String> = vec!["1".into(), "2".into(), "3".into()];

        let mut checkpoint = Checkpoint::default();
        checkpoint.mark_done("ENG", "1");
        checkpoint.finish_space("ENG", &pages);
        assert!(!checkpoint.progress("ENG").expect("progress").completed);

        checkpoint.mark_done("ENG", "2");
        checkpoint.mark_failed("ENG", "3");
        checkpoint.finish_space("ENG", &pages);

        let progress = checkpoint.progress("ENG").expect("progress");
        assert!(progress.completed);
        assert!(progress.retry_failed_only());
        assert!(!progress.skip_entirely());
        assert!(!checkpoint.fully_successful());
    }

    #[test]
    fn record_file_replaces_by_id() {
        let mut checkpoint = Checkpoint::default();
        checkpoint.record_file(entry("f1"));
        checkpoint.record_file(entry("f2"));
        checkpoint.record_file(entry("f1"));

        assert_eq!(checkpoint.ingested_files.len(), 2);
    }
}
