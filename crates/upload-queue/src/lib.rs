//! Client-side upload queue for a remote file store.
//!
//! Callers hand files to an [`UploadManager`] together with a destination
//! directory. The manager keeps one [`UploadItem`] per file, runs at most
//! `concurrency` transfers at a time in creation order, and reports
//! progress, completion and failure through events, notifications and
//! cache invalidation. Failed items can be retried a bounded number of
//! times with exponential backoff.
//!
//! The transport is pluggable through the [`Transfer`] trait.

pub mod config;
pub mod error;
pub mod executor;
pub mod manager;
pub mod notifier;
pub mod path;
pub mod persist;
pub mod retry;
pub mod scheduler;
pub mod selectors;
pub mod store;
pub mod types;

pub use config::QueueConfig;
pub use error::{QueueError, UploadError};
pub use executor::{ProgressCallback, Transfer, TransferError, TransferFuture};
pub use manager::{Collaborators, UploadManager};
pub use notifier::{CacheInvalidator, CompletionNotifier, NoopCache, NoopNotifier, Notifier};
pub use persist::{PersistedState, StateFile};
pub use retry::{MAX_RETRIES, RETRY_DELAYS, RetryPolicy};
pub use scheduler::DEFAULT_CONCURRENCY;
pub use types::{
    FilePayload, Notification, NotificationKind, PayloadSource, RetryOutcome, UploadEvent,
    UploadItem, UploadStatus,
};
