//! Completion side effects: cache invalidation and user notifications.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::UploadError;
use crate::types::{Notification, NotificationKind, UploadItem, UploadStatus};

/// Minimum number of successful uploads in a directory before the
/// summary notification is shown.
pub const BATCH_SUMMARY_MIN: usize = 3;

/// Receives user-facing notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Invalidates cached directory listings. Fire-and-forget.
pub trait CacheInvalidator: Send + Sync {
    fn invalidate(&self, path: &str);
}

/// Discards notifications.
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _notification: Notification) {}
}

/// For callers without a listing cache.
pub struct NoopCache;

impl CacheInvalidator for NoopCache {
    fn invalidate(&self, _path: &str) {}
}

/// Fires side effects when items reach a terminal state.
#[derive(Clone)]
pub struct CompletionNotifier {
    notifier: Arc<dyn Notifier>,
    cache: Arc<dyn CacheInvalidator>,
}

impl CompletionNotifier {
    pub fn new(notifier: Arc<dyn Notifier>, cache: Arc<dyn CacheInvalidator>) -> Self {
        Self { notifier, cache }
    }

    /// Handles one terminal transition.
    ///
    /// `items` is the store state after the transition. Only a successful
    /// upload can complete a batch, so the summary is checked on `Done` only.
    pub fn on_terminal(&self, item: &UploadItem, items: &[UploadItem]) {
        match (&item.status, &item.error) {
            (UploadStatus::Done, _) => {
                self.cache.invalidate(&item.target_path);
                info!(item = %item.id, file = %item.file_name, target = %item.target_path, "upload complete");
                self.notifier.notify(Notification::new(
                    NotificationKind::Success,
                    "Upload complete",
                    item.file_name.clone(),
                ));
                if let Some(done) = batch_summary(items, &item.target_path) {
                    self.notifier.notify(Notification::new(
                        NotificationKind::Success,
                        format!("{done} files uploaded"),
                        "All uploads complete",
                    ));
                }
            }
            (UploadStatus::Failed, Some(UploadError::Cancelled)) => {
                debug!(item = %item.id, file = %item.file_name, "upload cancelled");
            }
            (UploadStatus::Failed, error) => {
                let message = error
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "Upload failed".into());
                warn!(item = %item.id, file = %item.file_name, error = %message, "upload failed");
                self.notifier.notify(Notification::new(
                    NotificationKind::Error,
                    "Upload failed",
                    format!("{} - {message}", item.file_name),
                ));
            }
            _ => {}
        }
    }

    /// Tells the user an item has no retries left.
    pub fn on_retry_limit(&self, item: &UploadItem, max_retries: u32) {
        info!(item = %item.id, file = %item.file_name, "retry limit reached");
        self.notifier.notify(Notification::new(
            NotificationKind::Error,
            "Retry limit reached",
            format!("{} has failed {max_retries} times", item.file_name),
        ));
    }
}

/// Number of `Done` items under `target_path` if every item there is
/// terminal and at least [`BATCH_SUMMARY_MIN`] succeeded.
pub fn batch_summary(items: &[UploadItem], target_path: &str) -> Option<usize> {
    let mut done = 0;
    for item in items.iter().filter(|i| i.target_path == target_path) {
        if !item.status.is_terminal() {
            return None;
        }
        if item.status == UploadStatus::Done {
            done += 1;
        }
    }
    (done >= BATCH_SUMMARY_MIN).then_some(done)
}
