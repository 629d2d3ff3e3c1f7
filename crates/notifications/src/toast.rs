use std::time::{Duration, Instant};

use filebay_upload_queue::{Notification, NotificationKind};

/// Most toasts shown at once. Pushing past it evicts the oldest.
pub const MAX_VISIBLE: usize = 3;

/// How long a toast of `kind` stays up.
pub fn display_duration(kind: NotificationKind) -> Duration {
    Duration::from_millis(match kind {
        NotificationKind::Success => 4000,
        NotificationKind::Info => 5000,
        NotificationKind::Warning => 8000,
        NotificationKind::Error => 10_000,
    })
}

/// A notification on screen.
#[derive(Debug, Clone)]
pub struct Toast {
    pub id: u64,
    pub kind: NotificationKind,
    pub title: String,
    pub description: Option<String>,
    pub duration: Duration,
    pub shown_at: Instant,
}

impl Toast {
    pub fn expires_at(&self) -> Instant {
        self.shown_at + self.duration
    }
}

/// Bounded toast queue with monotonic ids.
///
/// Dismissal timing is driven by the caller through [`ToastQueue::expire`].
#[derive(Debug, Clone)]
pub struct ToastQueue {
    toasts: Vec<Toast>,
    next_id: u64,
    capacity: usize,
}

impl ToastQueue {
    pub fn new() -> Self {
        Self::with_capacity(MAX_VISIBLE)
    }

    /// Queue showing at most `capacity` toasts (minimum one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            toasts: Vec::new(),
            next_id: 0,
            capacity: capacity.max(1),
        }
    }

    /// Shows a notification now. Returns the assigned toast id.
    pub fn push(&mut self, notification: Notification) -> u64 {
        self.push_at(notification, Instant::now())
    }

    /// Shows a notification as of `now`, evicting the oldest toasts
    /// beyond capacity.
    pub fn push_at(&mut self, notification: Notification, now: Instant) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.toasts.push(Toast {
            id,
            kind: notification.kind,
            title: notification.title,
            description: notification.description,
            duration: display_duration(notification.kind),
            shown_at: now,
        });
        if self.toasts.len() > self.capacity {
            let excess = self.toasts.len() - self.capacity;
            self.toasts.drain(..excess);
        }
        id
    }

    /// Removes a toast by id. Returns `true` if it was shown.
    pub fn dismiss(&mut self, id: u64) -> bool {
        let len_before = self.toasts.len();
        self.toasts.retain(|t| t.id != id);
        self.toasts.len() != len_before
    }

    /// Drops toasts whose display time has run out. Returns their ids.
    pub fn expire(&mut self, now: Instant) -> Vec<u64> {
        let expired: Vec<u64> = self
            .toasts
            .iter()
            .filter(|t| t.expires_at() <= now)
            .map(|t| t.id)
            .collect();
        self.toasts.retain(|t| t.expires_at() > now);
        expired
    }

    /// Earliest pending expiry, for scheduling the next [`expire`](Self::expire).
    pub fn next_expiry(&self) -> Option<Instant> {
        self.toasts.iter().map(Toast::expires_at).min()
    }

    pub fn get(&self, id: u64) -> Option<&Toast> {
        self.toasts.iter().find(|t| t.id == id)
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Toast> {
        self.toasts.iter()
    }

    pub fn len(&self) -> usize {
        self.toasts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.toasts.is_empty()
    }

    pub fn clear(&mut self) {
        self.toasts.clear();
    }
}

impl Default for ToastQueue {
    fn default() -> Self {
        Self::new()
    }
}
