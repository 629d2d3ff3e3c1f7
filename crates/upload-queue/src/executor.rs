//! Transfer executor seam.
//!
//! [`Transfer`] is implemented by the transport (HTTP in production, mocks
//! in tests). [`execute`] wraps one call with the guarantees the queue
//! relies on: a cancelled token always resolves as `Cancelled`, and
//! progress never goes backwards.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio_util::sync::CancellationToken;

use crate::error::UploadError;
use crate::types::FilePayload;

/// Callback invoked with a transfer percentage (0–100).
pub type ProgressCallback = Box<dyn Fn(u8) + Send + Sync>;

/// Boxed future returned by [`Transfer::transfer`].
pub type TransferFuture<'a> = Pin<Box<dyn Future<Output = Result<(), TransferError>> + Send + 'a>>;

/// Why a single transfer did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    #[error("cancelled")]
    Cancelled,

    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("{0}")]
    Network(String),
}

impl From<TransferError> for UploadError {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::Cancelled => UploadError::Cancelled,
            TransferError::Server { message, .. } => UploadError::Server(message),
            TransferError::Network(message) => UploadError::Network(message),
        }
    }
}

/// Performs one file transfer to a destination directory.
///
/// Implementations report progress through `on_progress` and should stop
/// work promptly once `cancel` fires.
pub trait Transfer: Send + Sync {
    fn transfer<'a>(
        &'a self,
        payload: &'a FilePayload,
        target_path: &'a str,
        on_progress: ProgressCallback,
        cancel: CancellationToken,
    ) -> TransferFuture<'a>;
}

/// Runs `transfer` for one payload.
///
/// Resolves as `Cancelled` if the token fires before or during the call,
/// even if the implementation ignores it. Progress reports are clamped to
/// 100 and deduplicated so that listeners only see increases.
pub async fn execute(
    transfer: &dyn Transfer,
    payload: &FilePayload,
    target_path: &str,
    on_progress: ProgressCallback,
    cancel: CancellationToken,
) -> Result<(), TransferError> {
    if cancel.is_cancelled() {
        return Err(TransferError::Cancelled);
    }

    let last = Arc::new(AtomicU8::new(0));
    let monotonic: ProgressCallback = Box::new(move |percent| {
        let percent = percent.min(100);
        if last.fetch_max(percent, Ordering::AcqRel) < percent {
            on_progress(percent);
        }
    });

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TransferError::Cancelled),
        res = transfer.transfer(payload, target_path, monotonic, cancel.clone()) => res,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Reports a fixed progress sequence, then waits forever or succeeds.
    struct Scripted {
        steps: Vec<u8>,
        hang: bool,
    }

    impl Transfer for Scripted {
        fn transfer<'a>(
            &'a self,
            _payload: &'a FilePayload,
            _target_path: &'a str,
            on_progress: ProgressCallback,
            _cancel: CancellationToken,
        ) -> TransferFuture<'a> {
            Box::pin(async move {
                for step in &self.steps {
                    on_progress(*step);
                }
                if self.hang {
                    std::future::pending::<()>().await;
                }
                Ok(())
            })
        }
    }

    fn payload() -> FilePayload {
        FilePayload::from_bytes("a.txt", b"abc".to_vec())
    }

    fn recorder() -> (Arc<Mutex<Vec<u8>>>, ProgressCallback) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        (seen, Box::new(move |p| s.lock().unwrap().push(p)))
    }

    #[tokio::test]
    async fn progress_is_monotonic_and_clamped() {
        let t = Scripted {
            steps: vec![10, 40, 30, 40, 90, 250],
            hang: false,
        };
        let (seen, cb) = recorder();
        execute(&t, &payload(), "docs", cb, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![10, 40, 90, 100]);
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let t = Scripted {
            steps: vec![50],
            hang: false,
        };
        let (seen, cb) = recorder();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let res = execute(&t, &payload(), "docs", cb, cancel).await;
        assert_eq!(res, Err(TransferError::Cancelled));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancelled_mid_flight_even_if_impl_ignores_token() {
        let t = Scripted {
            steps: vec![20],
            hang: true,
        };
        let (_seen, cb) = recorder();
        let cancel = CancellationToken::new();
        let c = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            c.cancel();
        });
        let res = execute(&t, &payload(), "docs", cb, cancel).await;
        assert_eq!(res, Err(TransferError::Cancelled));
    }

    #[test]
    fn maps_to_item_errors() {
        assert_eq!(
            UploadError::from(TransferError::Cancelled),
            UploadError::Cancelled
        );
        assert_eq!(
            UploadError::from(TransferError::Server {
                status: 409,
                message: "exists".into()
            }),
            UploadError::Server("exists".into())
        );
        assert_eq!(
            UploadError::from(TransferError::Network("reset".into())),
            UploadError::Network("reset".into())
        );
    }
}
