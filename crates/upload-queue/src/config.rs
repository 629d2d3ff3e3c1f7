//! Queue configuration.

use std::path::PathBuf;

use crate::retry::RetryPolicy;
use crate::scheduler::DEFAULT_CONCURRENCY;

/// Default capacity of the event channel.
const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Configuration for an [`UploadManager`](crate::UploadManager).
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum simultaneous transfers.
    pub concurrency: usize,
    /// Retry budget and backoff table.
    pub retry: RetryPolicy,
    /// Buffered events before new ones are dropped.
    pub event_capacity: usize,
    /// Where interrupted uploads are remembered across restarts.
    pub state_file: Option<PathBuf>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetryPolicy::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            state_file: None,
        }
    }
}
