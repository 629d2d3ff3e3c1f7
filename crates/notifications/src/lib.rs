//! User-facing notifications for upload outcomes.
//!
//! [`ToastQueue`] holds what is currently on screen; [`SharedToasts`] lets
//! the upload manager push into it from its own task.

pub mod toast;

use std::sync::{Arc, Mutex};

use filebay_upload_queue::{Notification, NotificationKind, Notifier};
use tracing::{info, warn};

pub use toast::{MAX_VISIBLE, Toast, ToastQueue, display_duration};

/// Thread-safe handle to a [`ToastQueue`].
#[derive(Debug, Clone, Default)]
pub struct SharedToasts {
    inner: Arc<Mutex<ToastQueue>>,
}

impl SharedToasts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` with the queue locked.
    pub fn with<R>(&self, f: impl FnOnce(&mut ToastQueue) -> R) -> R {
        let mut queue = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut queue)
    }

    /// Copies the visible toasts, oldest first.
    pub fn visible(&self) -> Vec<Toast> {
        self.with(|q| q.iter().cloned().collect())
    }
}

impl Notifier for SharedToasts {
    fn notify(&self, notification: Notification) {
        let description = notification.description.as_deref().unwrap_or_default();
        match notification.kind {
            NotificationKind::Error | NotificationKind::Warning => {
                warn!(title = %notification.title, %description, "notification")
            }
            NotificationKind::Success | NotificationKind::Info => {
                info!(title = %notification.title, %description, "notification")
            }
        }
        self.with(|q| q.push(notification));
    }
}
