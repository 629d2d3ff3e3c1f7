//! Queue metadata that survives a restart.
//!
//! Payloads cannot be persisted, so only items still queued or in flight
//! are written, already rewritten as `Failed` / "Upload interrupted".
//! Finished items are dropped.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{QueueError, UploadError};
use crate::types::{UploadItem, UploadStatus};

/// On-disk shape of the queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub items: Vec<UploadItem>,
}

impl PersistedState {
    /// Projects live items into what should be persisted.
    pub fn project(items: &[UploadItem]) -> Self {
        Self {
            items: items
                .iter()
                .filter(|i| i.status.is_transient())
                .cloned()
                .map(interrupted)
                .collect(),
        }
    }

    /// Items to load into a fresh store.
    pub fn recover(self) -> Vec<UploadItem> {
        self.items.into_iter().map(interrupted).collect()
    }
}

fn interrupted(mut item: UploadItem) -> UploadItem {
    item.status = UploadStatus::Failed;
    item.error = Some(UploadError::Interrupted);
    item.progress = item.progress.min(99);
    item
}

/// JSON file holding a [`PersistedState`].
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the state. A missing file is an empty queue.
    pub fn load(&self) -> Result<PersistedState, QueueError> {
        if !self.path.exists() {
            return Ok(PersistedState::default());
        }
        let data = std::fs::read_to_string(&self.path)?;
        let state: PersistedState = serde_json::from_str(&data)?;
        debug!("loaded {} persisted upload(s) from {:?}", state.items.len(), self.path);
        Ok(state)
    }

    /// Writes the state, creating parent directories as needed.
    pub fn save(&self, state: &PersistedState) -> Result<(), QueueError> {
        let json = serde_json::to_string_pretty(state)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    /// Deletes the file if present.
    pub fn clear(&self) -> Result<(), QueueError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn item(id: &str, status: UploadStatus, progress: u8) -> UploadItem {
        UploadItem {
            id: id.into(),
            file_name: format!("{id}.bin"),
            file_size: 10,
            target_path: "docs".into(),
            status,
            progress,
            error: None,
            retry_count: 1,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    #[test]
    fn projection_keeps_only_transient_items() {
        let items = vec![
            item("q", UploadStatus::Queued, 0),
            item("u", UploadStatus::Uploading, 42),
            item("d", UploadStatus::Done, 100),
            item("f", UploadStatus::Failed, 10),
        ];
        let state = PersistedState::project(&items);

        let ids: Vec<&str> = state.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["q", "u"]);
        for i in &state.items {
            assert_eq!(i.status, UploadStatus::Failed);
            assert_eq!(i.error, Some(UploadError::Interrupted));
        }
        assert_eq!(state.items[1].progress, 42);
        assert_eq!(state.items[1].retry_count, 1);
    }

    #[test]
    fn recover_rewrites_whatever_was_stored() {
        let state = PersistedState {
            items: vec![item("u", UploadStatus::Uploading, 10)],
        };
        let items = state.recover();
        assert_eq!(items[0].status, UploadStatus::Failed);
        assert_eq!(items[0].error, Some(UploadError::Interrupted));
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = StateFile::new(dir.path().join("nope.json"));
        assert_eq!(file.load().unwrap(), PersistedState::default());
    }

    #[test]
    fn save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let file = StateFile::new(dir.path().join("nested").join("uploads.json"));
        let state = PersistedState::project(&[item("u", UploadStatus::Uploading, 5)]);

        file.save(&state).unwrap();
        assert_eq!(file.load().unwrap(), state);

        file.clear().unwrap();
        assert!(!file.path().exists());
        file.clear().unwrap();
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uploads.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            StateFile::new(path).load(),
            Err(QueueError::Json(_))
        ));
    }
}
