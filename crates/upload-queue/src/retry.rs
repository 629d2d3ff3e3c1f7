//! Retry policy with a capped backoff table.

use std::time::Duration;

use crate::types::{UploadItem, UploadStatus};

/// Maximum number of retries per item.
pub const MAX_RETRIES: u32 = 3;

/// Delay before the n-th retry may start; the last entry repeats.
pub const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
];

/// What the policy allows for a retry request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    LimitReached,
    NotRetryable,
}

/// Configuration for manual retries with backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Backoff table indexed by retries already consumed.
    pub delays: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            delays: RETRY_DELAYS.to_vec(),
        }
    }
}

impl RetryPolicy {
    /// Delay for an item that has already used `retry_count` retries.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let idx = (retry_count as usize).min(self.delays.len().saturating_sub(1));
        self.delays.get(idx).copied().unwrap_or(RETRY_DELAYS[0])
    }

    /// Decides whether `item` may be re-queued.
    pub fn decide(&self, item: &UploadItem) -> RetryDecision {
        if item.status != UploadStatus::Failed {
            return RetryDecision::NotRetryable;
        }
        if item.retry_count >= self.max_retries {
            return RetryDecision::LimitReached;
        }
        RetryDecision::Retry {
            delay: self.delay_for(item.retry_count),
        }
    }
}
