//! Error types for the upload queue.

use serde::{Deserialize, Serialize};

/// Why an upload item ended up `Failed`.
///
/// Stored on the item itself; the `Display` text is what the UI shows.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum UploadError {
    /// User-initiated abort. Never notified as an error.
    #[error("Cancelled")]
    Cancelled,

    /// The endpoint rejected the transfer.
    #[error("{0}")]
    Server(String),

    /// The transport failed before a response arrived.
    #[error("{0}")]
    Network(String),

    /// The payload handle was gone when the scheduler tried to start the item.
    #[error("File not found")]
    PayloadMissing,

    /// The item was in flight when the previous session ended.
    #[error("Upload interrupted")]
    Interrupted,

    /// A file with the same name is already known at the destination.
    #[error("File already exists")]
    AlreadyExists,
}

/// Errors returned by queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("upload queue is closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
