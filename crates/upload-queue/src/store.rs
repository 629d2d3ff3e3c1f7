//! Item store: the single owner of upload items, payloads and
//! in-flight cancellation tokens.
//!
//! Every mutation goes through `&mut self`, and the store is owned by the
//! manager's actor task, so two transfers settling together cannot
//! interleave partial updates.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::UploadError;
use crate::executor::TransferError;
use crate::types::{FilePayload, UploadItem, UploadStatus};

/// Field-level patch applied by [`ItemStore::update`].
///
/// `None` leaves a field untouched. The nested options on `error` and
/// `completed_at` allow clearing them.
#[derive(Debug, Clone, Default)]
pub struct ItemPatch {
    pub status: Option<UploadStatus>,
    pub progress: Option<u8>,
    pub error: Option<Option<UploadError>>,
    pub retry_count: Option<u32>,
    pub completed_at: Option<Option<DateTime<Utc>>>,
}

/// A transfer handed out by the scheduler.
#[derive(Debug, Clone)]
pub struct StartedTransfer {
    pub item: UploadItem,
    pub payload: FilePayload,
    pub cancel: CancellationToken,
    /// Distinguishes this run from earlier runs of the same item.
    pub attempt: u64,
}

struct InFlight {
    cancel: CancellationToken,
    attempt: u64,
}

/// Authoritative collection of upload items.
#[derive(Default)]
pub struct ItemStore {
    items: Vec<UploadItem>,
    payloads: HashMap<String, FilePayload>,
    in_flight: HashMap<String, InFlight>,
    /// Backoff gates set by retries; absent means eligible now.
    not_before: HashMap<String, Instant>,
    next_attempt: u64,
}

impl ItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates one `Queued` item per file and stores its payload.
    pub fn add_batch(&mut self, files: Vec<FilePayload>, target_path: &str) -> Vec<UploadItem> {
        let created_at = Utc::now();
        let mut created = Vec::with_capacity(files.len());
        for payload in files {
            let item = UploadItem {
                id: uuid::Uuid::new_v4().to_string(),
                file_name: payload.name().to_string(),
                file_size: payload.size(),
                target_path: target_path.to_string(),
                status: UploadStatus::Queued,
                progress: 0,
                error: None,
                retry_count: 0,
                created_at,
                completed_at: None,
            };
            self.payloads.insert(item.id.clone(), payload);
            self.items.push(item.clone());
            created.push(item);
        }
        debug!(count = created.len(), target = %target_path, "batch added");
        created
    }

    /// Inserts items recovered from a previous session. They carry no payload.
    pub fn restore(&mut self, items: Vec<UploadItem>) {
        for item in items {
            if self.get(&item.id).is_none() {
                self.items.push(item);
            }
        }
    }

    /// Merges `patch` into one item. Returns `None` if the item is gone.
    pub fn update(&mut self, id: &str, patch: ItemPatch) -> Option<&UploadItem> {
        let item = self.items.iter_mut().find(|i| i.id == id)?;
        if let Some(status) = patch.status {
            item.status = status;
        }
        if let Some(progress) = patch.progress {
            item.progress = progress;
        }
        if let Some(error) = patch.error {
            item.error = error;
        }
        if let Some(retry_count) = patch.retry_count {
            item.retry_count = retry_count;
        }
        if let Some(completed_at) = patch.completed_at {
            item.completed_at = completed_at;
        }
        Some(item)
    }

    pub fn get(&self, id: &str) -> Option<&UploadItem> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn has_payload(&self, id: &str) -> bool {
        self.payloads.contains_key(id)
    }

    pub fn snapshot(&self) -> Vec<UploadItem> {
        self.items.clone()
    }

    /// Whether a queued item's retry backoff has elapsed.
    pub fn is_eligible(&self, id: &str, now: Instant) -> bool {
        self.not_before.get(id).is_none_or(|at| *at <= now)
    }

    /// Moves a `Queued` item to `Uploading` and issues its cancellation token.
    ///
    /// Returns `None` without touching the item if it is not queued or its
    /// payload is missing.
    pub fn begin_upload(&mut self, id: &str) -> Option<StartedTransfer> {
        if self.get(id)?.status != UploadStatus::Queued {
            return None;
        }
        let payload = self.payloads.get(id)?.clone();

        self.next_attempt += 1;
        let attempt = self.next_attempt;
        let cancel = CancellationToken::new();
        self.in_flight.insert(
            id.to_string(),
            InFlight {
                cancel: cancel.clone(),
                attempt,
            },
        );
        self.not_before.remove(id);

        let item = self
            .update(
                id,
                ItemPatch {
                    status: Some(UploadStatus::Uploading),
                    progress: Some(0),
                    ..Default::default()
                },
            )?
            .clone();

        Some(StartedTransfer {
            item,
            payload,
            cancel,
            attempt,
        })
    }

    /// Records transfer progress for the current attempt.
    ///
    /// Capped at 99: only `Done` may show 100.
    pub fn record_progress(&mut self, id: &str, attempt: u64, percent: u8) -> Option<u8> {
        if !self.is_current(id, attempt) {
            return None;
        }
        let progress = percent.min(99);
        let item = self.items.iter_mut().find(|i| i.id == id)?;
        if item.status != UploadStatus::Uploading || progress <= item.progress {
            return None;
        }
        item.progress = progress;
        Some(progress)
    }

    /// Applies a transfer's outcome.
    ///
    /// A no-op returning `None` when the item was removed, already finalized
    /// (e.g. by `cancel`), or restarted since this attempt began.
    pub fn settle(
        &mut self,
        id: &str,
        attempt: u64,
        result: Result<(), TransferError>,
    ) -> Option<UploadItem> {
        if !self.is_current(id, attempt) {
            return None;
        }
        self.in_flight.remove(id);
        if self.get(id)?.status != UploadStatus::Uploading {
            return None;
        }

        let patch = match result {
            Ok(()) => ItemPatch {
                status: Some(UploadStatus::Done),
                progress: Some(100),
                error: Some(None),
                completed_at: Some(Some(Utc::now())),
                ..Default::default()
            },
            Err(err) => ItemPatch {
                status: Some(UploadStatus::Failed),
                error: Some(Some(err.into())),
                completed_at: Some(Some(Utc::now())),
                ..Default::default()
            },
        };
        self.update(id, patch).cloned()
    }

    /// Marks a non-terminal item `Failed` with `error`, cancelling its
    /// transfer if one is running.
    pub fn fail(&mut self, id: &str, error: UploadError) -> Option<UploadItem> {
        if self.get(id)?.status.is_terminal() {
            return None;
        }
        if let Some(flight) = self.in_flight.remove(id) {
            flight.cancel.cancel();
        }
        self.not_before.remove(id);

        let progress = self.get(id)?.progress.min(99);
        self.update(
            id,
            ItemPatch {
                status: Some(UploadStatus::Failed),
                progress: Some(progress),
                error: Some(Some(error)),
                completed_at: Some(Some(Utc::now())),
                ..Default::default()
            },
        )
        .cloned()
    }

    /// Puts a `Failed` item back in the queue, eligible from `not_before`.
    pub fn requeue(&mut self, id: &str, not_before: Instant) -> Option<UploadItem> {
        let item = self.get(id)?;
        if item.status != UploadStatus::Failed {
            return None;
        }
        let retry_count = item.retry_count + 1;
        self.not_before.insert(id.to_string(), not_before);
        self.update(
            id,
            ItemPatch {
                status: Some(UploadStatus::Queued),
                progress: Some(0),
                error: Some(None),
                retry_count: Some(retry_count),
                completed_at: Some(None),
            },
        )
        .cloned()
    }

    /// Deletes an item, its payload and any in-flight transfer.
    pub fn remove(&mut self, id: &str) -> Option<UploadItem> {
        if let Some(flight) = self.in_flight.remove(id) {
            flight.cancel.cancel();
        }
        self.payloads.remove(id);
        self.not_before.remove(id);
        let idx = self.items.iter().position(|i| i.id == id)?;
        Some(self.items.remove(idx))
    }

    /// Removes every terminal item and its payload. Returns the removed ids.
    pub fn clear_terminal(&mut self) -> Vec<String> {
        let ids: Vec<String> = self
            .items
            .iter()
            .filter(|i| i.status.is_terminal())
            .map(|i| i.id.clone())
            .collect();
        for id in &ids {
            self.payloads.remove(id);
            self.not_before.remove(id);
        }
        self.items.retain(|i| !i.status.is_terminal());
        ids
    }

    /// Cancels every running transfer. Used on shutdown.
    pub fn cancel_all(&mut self) {
        for (_, flight) in self.in_flight.drain() {
            flight.cancel.cancel();
        }
    }

    fn is_current(&self, id: &str, attempt: u64) -> bool {
        self.in_flight.get(id).is_some_and(|f| f.attempt == attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn files(names: &[&str]) -> Vec<FilePayload> {
        names
            .iter()
            .map(|n| FilePayload::from_bytes(*n, n.as_bytes().to_vec()))
            .collect()
    }

    #[test]
    fn add_batch_creates_queued_items_with_payloads() {
        let mut store = ItemStore::new();
        let items = store.add_batch(files(&["a.txt", "b.txt"]), "docs");

        assert_eq!(items.len(), 2);
        assert_ne!(items[0].id, items[1].id);
        for item in &items {
            assert_eq!(item.status, UploadStatus::Queued);
            assert_eq!(item.progress, 0);
            assert_eq!(item.retry_count, 0);
            assert_eq!(item.target_path, "docs");
            assert!(store.has_payload(&item.id));
        }
        assert_eq!(items[0].file_size, 5);
    }

    #[test]
    fn update_missing_item_is_noop() {
        let mut store = ItemStore::new();
        assert!(
            store
                .update(
                    "nope",
                    ItemPatch {
                        progress: Some(5),
                        ..Default::default()
                    }
                )
                .is_none()
        );
    }

    #[test]
    fn begin_upload_issues_token_and_resets_progress() {
        let mut store = ItemStore::new();
        let id = store.add_batch(files(&["a.txt"]), "docs")[0].id.clone();

        let started = store.begin_upload(&id).unwrap();
        assert_eq!(started.item.status, UploadStatus::Uploading);
        assert_eq!(started.item.progress, 0);
        assert_eq!(started.payload.name(), "a.txt");
        assert!(!started.cancel.is_cancelled());

        // Already uploading.
        assert!(store.begin_upload(&id).is_none());
    }

    #[test]
    fn progress_capped_below_done() {
        let mut store = ItemStore::new();
        let id = store.add_batch(files(&["a.txt"]), "docs")[0].id.clone();
        let s = store.begin_upload(&id).unwrap();

        assert_eq!(store.record_progress(&id, s.attempt, 40), Some(40));
        assert_eq!(store.record_progress(&id, s.attempt, 30), None);
        assert_eq!(store.record_progress(&id, s.attempt, 100), Some(99));
        assert_eq!(store.get(&id).unwrap().progress, 99);
    }

    #[test]
    fn settle_success_forces_full_progress() {
        let mut store = ItemStore::new();
        let id = store.add_batch(files(&["a.txt"]), "docs")[0].id.clone();
        let s = store.begin_upload(&id).unwrap();

        let done = store.settle(&id, s.attempt, Ok(())).unwrap();
        assert_eq!(done.status, UploadStatus::Done);
        assert_eq!(done.progress, 100);
        assert!(done.error.is_none());
        assert!(done.completed_at.is_some());
    }

    #[test]
    fn settle_failure_records_error() {
        let mut store = ItemStore::new();
        let id = store.add_batch(files(&["a.txt"]), "docs")[0].id.clone();
        let s = store.begin_upload(&id).unwrap();

        let failed = store
            .settle(&id, s.attempt, Err(TransferError::Network("reset".into())))
            .unwrap();
        assert_eq!(failed.status, UploadStatus::Failed);
        assert_eq!(failed.error, Some(UploadError::Network("reset".into())));
        assert!(failed.progress < 100);
    }

    #[test]
    fn settle_after_cancel_is_noop() {
        let mut store = ItemStore::new();
        let id = store.add_batch(files(&["a.txt"]), "docs")[0].id.clone();
        let s = store.begin_upload(&id).unwrap();

        let cancelled = store.fail(&id, UploadError::Cancelled).unwrap();
        assert!(s.cancel.is_cancelled());
        assert_eq!(cancelled.error, Some(UploadError::Cancelled));

        assert!(store.settle(&id, s.attempt, Ok(())).is_none());
        assert_eq!(store.get(&id).unwrap().status, UploadStatus::Failed);
    }

    #[test]
    fn stale_attempt_cannot_finalize_restarted_item() {
        let mut store = ItemStore::new();
        let id = store.add_batch(files(&["a.txt"]), "docs")[0].id.clone();
        let first = store.begin_upload(&id).unwrap();
        store.fail(&id, UploadError::Cancelled);
        store.requeue(&id, Instant::now());
        let second = store.begin_upload(&id).unwrap();

        assert!(
            store
                .settle(&id, first.attempt, Err(TransferError::Cancelled))
                .is_none()
        );
        assert_eq!(store.get(&id).unwrap().status, UploadStatus::Uploading);
        assert!(store.settle(&id, second.attempt, Ok(())).is_some());
    }

    #[test]
    fn requeue_clears_error_and_counts_retry() {
        let mut store = ItemStore::new();
        let id = store.add_batch(files(&["a.txt"]), "docs")[0].id.clone();
        let s = store.begin_upload(&id).unwrap();
        store.settle(&id, s.attempt, Err(TransferError::Network("x".into())));

        let now = Instant::now();
        let item = store.requeue(&id, now + Duration::from_secs(1)).unwrap();
        assert_eq!(item.status, UploadStatus::Queued);
        assert_eq!(item.retry_count, 1);
        assert!(item.error.is_none());
        assert!(item.completed_at.is_none());
        assert!(!store.is_eligible(&id, now));
        assert!(store.is_eligible(&id, now + Duration::from_secs(1)));
    }

    #[test]
    fn requeue_requires_failed() {
        let mut store = ItemStore::new();
        let id = store.add_batch(files(&["a.txt"]), "docs")[0].id.clone();
        assert!(store.requeue(&id, Instant::now()).is_none());
    }

    #[test]
    fn remove_drops_item_payload_and_cancels() {
        let mut store = ItemStore::new();
        let id = store.add_batch(files(&["a.txt"]), "docs")[0].id.clone();
        let s = store.begin_upload(&id).unwrap();

        let removed = store.remove(&id).unwrap();
        assert_eq!(removed.id, id);
        assert!(s.cancel.is_cancelled());
        assert!(store.get(&id).is_none());
        assert!(!store.has_payload(&id));
        assert!(store.settle(&id, s.attempt, Ok(())).is_none());
    }

    #[test]
    fn clear_terminal_keeps_transient_items() {
        let mut store = ItemStore::new();
        let ids: Vec<String> = store
            .add_batch(files(&["a", "b", "c"]), "docs")
            .into_iter()
            .map(|i| i.id)
            .collect();
        let s = store.begin_upload(&ids[0]).unwrap();
        store.settle(&ids[0], s.attempt, Ok(()));
        store.fail(&ids[1], UploadError::Cancelled);

        let cleared = store.clear_terminal();
        assert_eq!(cleared.len(), 2);
        assert!(!store.has_payload(&ids[0]));
        assert!(!store.has_payload(&ids[1]));
        let left = store.snapshot();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, ids[2]);
        assert!(store.has_payload(&ids[2]));
    }

    #[test]
    fn restored_items_have_no_payload() {
        let mut store = ItemStore::new();
        let mut item = store.add_batch(files(&["a"]), "docs").remove(0);
        item.id = "old".into();
        item.status = UploadStatus::Failed;
        item.error = Some(UploadError::Interrupted);
        store.restore(vec![item]);

        assert!(store.get("old").is_some());
        assert!(!store.has_payload("old"));
    }
}
