//! Data types shared by the queue components.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::UploadError;

/// Lifecycle state of an upload item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    /// Waiting for a free concurrency slot.
    Queued,
    /// Transfer in flight.
    Uploading,
    /// Reserved for a post-upload server-side step. Nothing produces it yet.
    Processing,
    /// Transfer finished successfully.
    Done,
    /// Transfer failed, was cancelled, or was interrupted.
    Failed,
}

impl UploadStatus {
    /// `Done` and `Failed` only change on explicit user action.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// States that occupy a concurrency slot.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Uploading | Self::Processing)
    }

    /// States that survive a restart (rewritten to `Failed`).
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Queued | Self::Uploading | Self::Processing)
    }
}

/// One user file queued for transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadItem {
    pub id: String,
    pub file_name: String,
    pub file_size: u64,
    pub target_path: String,
    pub status: UploadStatus,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<UploadError>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Where the bytes of a payload live.
#[derive(Debug, Clone)]
pub enum PayloadSource {
    /// Bytes already held in memory.
    Memory(Arc<[u8]>),
    /// A local file read at transfer time.
    File(PathBuf),
}

/// The file content behind an upload item.
///
/// Cloning is cheap: in-memory bytes are shared.
#[derive(Debug, Clone)]
pub struct FilePayload {
    name: String,
    size: u64,
    source: PayloadSource,
}

impl FilePayload {
    /// Wraps in-memory bytes.
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        let data: Vec<u8> = data.into();
        Self {
            name: name.into(),
            size: data.len() as u64,
            source: PayloadSource::Memory(Arc::from(data)),
        }
    }

    /// References a local file with a known size.
    pub fn from_file(name: impl Into<String>, path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            source: PayloadSource::File(path.into()),
        }
    }

    /// Stats a local file and references it under its own file name.
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let meta = tokio::fs::metadata(path).await?;
        if !meta.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("not a regular file: {}", path.display()),
            ));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("no file name: {}", path.display()),
                )
            })?;
        Ok(Self::from_file(name, path, meta.len()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn source(&self) -> &PayloadSource {
        &self.source
    }
}

/// Visual category of a user notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Success,
    Error,
    Warning,
    Info,
}

/// A user-facing notification emitted by the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub description: Option<String>,
}

impl Notification {
    pub fn new(
        kind: NotificationKind,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            title: title.into(),
            description: Some(description.into()),
        }
    }
}

/// Result of a `retry` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Re-queued; eligible to start after `delay`.
    Scheduled { delay: Duration },
    /// Retry budget exhausted; state unchanged.
    LimitReached,
    /// Unknown id, or the item is not `Failed`.
    NotRetryable,
}

/// State change events emitted by the manager.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    /// New items were created by `add_files`.
    Added { items: Vec<UploadItem> },
    /// An item took a concurrency slot.
    Started { id: String },
    /// Transfer progress, 0–99.
    Progress { id: String, progress: u8 },
    /// Transfer finished successfully.
    Completed { id: String },
    /// The item reached `Failed`.
    Failed { id: String, error: UploadError },
    /// The item was re-queued by a retry.
    Requeued {
        id: String,
        retry_count: u32,
        delay: Duration,
    },
    /// The item was removed explicitly.
    Removed { id: String },
    /// Terminal items were cleared in bulk.
    Cleared { ids: Vec<String> },
}
