//! Queue scheduler: fills free concurrency slots with queued items.

use tokio::time::Instant;
use tracing::{debug, error};

use crate::error::UploadError;
use crate::store::{ItemStore, StartedTransfer};
use crate::types::{UploadItem, UploadStatus};

/// Default number of simultaneous transfers.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// What a scheduler tick decided for one item.
#[derive(Debug)]
pub enum Dispatch {
    /// The item moved to `Uploading`; the caller must run the transfer.
    Start(StartedTransfer),
    /// The item had no payload and was failed in place.
    PayloadMissing(UploadItem),
}

/// Enforces the concurrency bound and FIFO start order.
#[derive(Debug, Clone)]
pub struct Scheduler {
    concurrency: usize,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

impl Scheduler {
    /// A bound of zero is raised to one.
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Starts as many eligible queued items as there are free slots,
    /// oldest first. Never blocks; transfers are run by the caller.
    ///
    /// Items whose payload is missing are failed and skipped without
    /// consuming a slot.
    pub fn tick(&self, store: &mut ItemStore, now: Instant) -> Vec<Dispatch> {
        let snapshot = store.snapshot();
        let active = snapshot.iter().filter(|i| i.status.is_active()).count();
        let mut slots = self.concurrency.saturating_sub(active);
        if slots == 0 {
            return Vec::new();
        }

        let mut queued: Vec<&UploadItem> = snapshot
            .iter()
            .filter(|i| i.status == UploadStatus::Queued && store.is_eligible(&i.id, now))
            .collect();
        // Stable: items created together keep insertion order.
        queued.sort_by_key(|i| i.created_at);

        let mut dispatched = Vec::new();
        for item in queued {
            if slots == 0 {
                break;
            }
            match store.begin_upload(&item.id) {
                Some(started) => {
                    debug!(item = %item.id, file = %item.file_name, "starting upload");
                    slots -= 1;
                    dispatched.push(Dispatch::Start(started));
                }
                None => {
                    error!(item = %item.id, file = %item.file_name, "payload missing for queued item");
                    if let Some(failed) = store.fail(&item.id, UploadError::PayloadMissing) {
                        dispatched.push(Dispatch::PayloadMissing(failed));
                    }
                }
            }
        }
        dispatched
    }
}
