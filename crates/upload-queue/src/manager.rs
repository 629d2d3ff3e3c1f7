//! Upload manager: the public face of the queue.
//!
//! One actor task owns the [`ItemStore`]. Public operations, transfer
//! progress, transfer settlements and retry timers all arrive as messages
//! in its inbox and are applied one at a time. Every message that frees or
//! adds work is followed by a scheduler tick, which is the only place
//! transfers are started.

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::QueueConfig;
use crate::error::{QueueError, UploadError};
use crate::executor::{self, ProgressCallback, Transfer, TransferError};
use crate::notifier::{CacheInvalidator, CompletionNotifier, NoopCache, NoopNotifier, Notifier};
use crate::path::normalize_target_path;
use crate::persist::{PersistedState, StateFile};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::scheduler::{Dispatch, Scheduler};
use crate::selectors;
use crate::store::{ItemStore, StartedTransfer};
use crate::types::{FilePayload, RetryOutcome, UploadEvent, UploadItem};

/// Inbox capacity. Progress updates are dropped when it is full.
const INBOX_CAPACITY: usize = 256;

/// External services the manager drives.
#[derive(Clone)]
pub struct Collaborators {
    pub transfer: Arc<dyn Transfer>,
    pub notifier: Arc<dyn Notifier>,
    pub cache: Arc<dyn CacheInvalidator>,
}

impl Collaborators {
    /// Uses `transfer` with no-op notifications and cache.
    pub fn new(transfer: Arc<dyn Transfer>) -> Self {
        Self {
            transfer,
            notifier: Arc::new(NoopNotifier),
            cache: Arc::new(NoopCache),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheInvalidator>) -> Self {
        self.cache = cache;
        self
    }
}

enum Command {
    AddFiles {
        files: Vec<FilePayload>,
        target_path: String,
        existing: HashSet<String>,
        reply: oneshot::Sender<Vec<UploadItem>>,
    },
    Cancel {
        id: String,
        reply: oneshot::Sender<bool>,
    },
    Retry {
        id: String,
        reply: oneshot::Sender<RetryOutcome>,
    },
    Remove {
        id: String,
        reply: oneshot::Sender<bool>,
    },
    ClearCompleted {
        reply: oneshot::Sender<usize>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<UploadItem>>,
    },
    Progress {
        id: String,
        attempt: u64,
        percent: u8,
    },
    Settled {
        id: String,
        attempt: u64,
        result: Result<(), TransferError>,
    },
    Tick,
    Shutdown {
        reply: oneshot::Sender<PersistedState>,
    },
}

/// Handle to a running upload queue.
///
/// Dropping the handle stops the queue and cancels running transfers.
pub struct UploadManager {
    inbox: mpsc::Sender<Command>,
    events_rx: std::sync::Mutex<Option<mpsc::Receiver<UploadEvent>>>,
    closed: CancellationToken,
}

impl UploadManager {
    /// Starts the queue on the current tokio runtime.
    ///
    /// Items remembered in `config.state_file` are loaded as
    /// `Failed` / "Upload interrupted".
    pub fn start(config: QueueConfig, collaborators: Collaborators) -> Result<Self, QueueError> {
        let state_file = config.state_file.map(StateFile::new);
        let mut store = ItemStore::new();
        if let Some(file) = &state_file {
            let recovered = file.load()?.recover();
            if !recovered.is_empty() {
                info!(count = recovered.len(), "recovered interrupted uploads");
            }
            store.restore(recovered);
        }

        let (inbox_tx, inbox_rx) = mpsc::channel(INBOX_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(config.event_capacity.max(1));
        let closed = CancellationToken::new();

        let actor = Actor {
            store,
            scheduler: Scheduler::new(config.concurrency),
            retry: config.retry,
            completion: CompletionNotifier::new(collaborators.notifier, collaborators.cache),
            transfer: collaborators.transfer,
            inbox: inbox_tx.clone(),
            events: events_tx,
            state_file,
        };
        tokio::spawn(actor.run(inbox_rx, closed.clone()));

        Ok(Self {
            inbox: inbox_tx,
            events_rx: std::sync::Mutex::new(Some(events_rx)),
            closed,
        })
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events_rx.lock().ok().and_then(|mut rx| rx.take())
    }

    /// Queues `files` for upload to `target_path` and starts what fits.
    ///
    /// Returns the created items as they were at creation time.
    pub async fn add_files(
        &self,
        files: Vec<FilePayload>,
        target_path: &str,
    ) -> Result<Vec<UploadItem>, QueueError> {
        self.add_files_checked(files, target_path, &HashSet::new())
            .await
    }

    /// Like [`add_files`](Self::add_files), but files whose name is in
    /// `existing` are created as `Failed` / "File already exists" and never
    /// transferred. `existing` is the caller's snapshot of the destination
    /// and is trusted as is.
    pub async fn add_files_checked(
        &self,
        files: Vec<FilePayload>,
        target_path: &str,
        existing: &HashSet<String>,
    ) -> Result<Vec<UploadItem>, QueueError> {
        let target_path = normalize_target_path(target_path)?;
        let existing = existing.clone();
        self.request(|reply| Command::AddFiles {
            files,
            target_path,
            existing,
            reply,
        })
        .await
    }

    /// Cancels a queued or uploading item. Returns `false` if there was
    /// nothing to cancel.
    pub async fn cancel(&self, id: &str) -> Result<bool, QueueError> {
        let id = id.to_string();
        self.request(|reply| Command::Cancel { id, reply }).await
    }

    /// Re-queues a failed item after its backoff delay.
    pub async fn retry(&self, id: &str) -> Result<RetryOutcome, QueueError> {
        let id = id.to_string();
        self.request(|reply| Command::Retry { id, reply }).await
    }

    /// Deletes an item and its payload, cancelling it if in flight.
    pub async fn remove(&self, id: &str) -> Result<bool, QueueError> {
        let id = id.to_string();
        self.request(|reply| Command::Remove { id, reply }).await
    }

    /// Removes all `Done` and `Failed` items. Returns how many were removed.
    pub async fn clear_completed(&self) -> Result<usize, QueueError> {
        self.request(|reply| Command::ClearCompleted { reply }).await
    }

    /// Current items in creation order.
    pub async fn snapshot(&self) -> Result<Vec<UploadItem>, QueueError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    pub async fn active_count(&self) -> Result<usize, QueueError> {
        Ok(selectors::active_count(&self.snapshot().await?))
    }

    pub async fn overall_progress(&self) -> Result<u8, QueueError> {
        Ok(selectors::overall_progress(&self.snapshot().await?))
    }

    /// Stops the queue, cancels running transfers and returns what was
    /// persisted.
    pub async fn shutdown(self) -> Result<PersistedState, QueueError> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, QueueError> {
        let (tx, rx) = oneshot::channel();
        self.inbox
            .send(make(tx))
            .await
            .map_err(|_| QueueError::Closed)?;
        rx.await.map_err(|_| QueueError::Closed)
    }
}

impl Drop for UploadManager {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

struct Actor {
    store: ItemStore,
    scheduler: Scheduler,
    retry: RetryPolicy,
    completion: CompletionNotifier,
    transfer: Arc<dyn Transfer>,
    inbox: mpsc::Sender<Command>,
    events: mpsc::Sender<UploadEvent>,
    state_file: Option<StateFile>,
}

impl Actor {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>, closed: CancellationToken) {
        loop {
            let cmd = tokio::select! {
                _ = closed.cancelled() => break,
                cmd = rx.recv() => match cmd {
                    Some(cmd) => cmd,
                    None => break,
                },
            };
            if self.handle(cmd).is_break() {
                return;
            }
        }
        self.stop();
    }

    fn handle(&mut self, cmd: Command) -> ControlFlow<()> {
        match cmd {
            Command::AddFiles {
                files,
                target_path,
                existing,
                reply,
            } => {
                let items = self.add_files(files, &target_path, &existing);
                self.tick();
                self.persist();
                let _ = reply.send(items);
            }
            Command::Cancel { id, reply } => {
                let cancelled = self.store.fail(&id, UploadError::Cancelled);
                if let Some(item) = &cancelled {
                    info!(item = %id, file = %item.file_name, "upload cancelled");
                    self.finalized(item);
                    self.tick();
                    self.persist();
                }
                let _ = reply.send(cancelled.is_some());
            }
            Command::Retry { id, reply } => {
                let outcome = self.retry(&id);
                let _ = reply.send(outcome);
            }
            Command::Remove { id, reply } => {
                let removed = self.store.remove(&id).is_some();
                if removed {
                    debug!(item = %id, "upload removed");
                    self.emit(UploadEvent::Removed { id });
                    self.tick();
                    self.persist();
                }
                let _ = reply.send(removed);
            }
            Command::ClearCompleted { reply } => {
                let ids = self.store.clear_terminal();
                let count = ids.len();
                if count > 0 {
                    debug!(count, "cleared finished uploads");
                    self.emit(UploadEvent::Cleared { ids });
                    self.persist();
                }
                let _ = reply.send(count);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.store.snapshot());
            }
            Command::Progress {
                id,
                attempt,
                percent,
            } => {
                if let Some(progress) = self.store.record_progress(&id, attempt, percent) {
                    self.emit(UploadEvent::Progress { id, progress });
                }
            }
            Command::Settled {
                id,
                attempt,
                result,
            } => {
                match self.store.settle(&id, attempt, result) {
                    Some(item) => self.finalized(&item),
                    None => trace!(item = %id, attempt, "ignoring stale settlement"),
                }
                self.tick();
                self.persist();
            }
            Command::Tick => {
                if self.tick() {
                    self.persist();
                }
            }
            Command::Shutdown { reply } => {
                let _ = reply.send(self.stop());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn add_files(
        &mut self,
        files: Vec<FilePayload>,
        target_path: &str,
        existing: &HashSet<String>,
    ) -> Vec<UploadItem> {
        let mut items = self.store.add_batch(files, target_path);
        let mut collided = Vec::new();
        for item in items.iter_mut() {
            if !existing.contains(&item.file_name) {
                continue;
            }
            if let Some(failed) = self.store.fail(&item.id, UploadError::AlreadyExists) {
                *item = failed.clone();
                collided.push(failed);
            }
        }
        info!(count = items.len(), target = %target_path, skipped = collided.len(), "files queued");
        self.emit(UploadEvent::Added {
            items: items.clone(),
        });
        for item in &collided {
            self.finalized(item);
        }
        items
    }

    fn retry(&mut self, id: &str) -> RetryOutcome {
        let Some(item) = self.store.get(id).cloned() else {
            return RetryOutcome::NotRetryable;
        };
        match self.retry.decide(&item) {
            RetryDecision::NotRetryable => RetryOutcome::NotRetryable,
            RetryDecision::LimitReached => {
                self.completion
                    .on_retry_limit(&item, self.retry.max_retries);
                RetryOutcome::LimitReached
            }
            RetryDecision::Retry { delay } => {
                let deadline = Instant::now() + delay;
                let Some(requeued) = self.store.requeue(id, deadline) else {
                    return RetryOutcome::NotRetryable;
                };
                info!(
                    item = %id,
                    file = %requeued.file_name,
                    retry = requeued.retry_count,
                    delay_secs = delay.as_secs_f64(),
                    "retry scheduled"
                );
                self.emit(UploadEvent::Requeued {
                    id: id.to_string(),
                    retry_count: requeued.retry_count,
                    delay,
                });
                self.wake_at(deadline);
                self.persist();
                RetryOutcome::Scheduled { delay }
            }
        }
    }

    /// Runs one scheduler pass. Returns whether anything changed.
    fn tick(&mut self) -> bool {
        let dispatched = self.scheduler.tick(&mut self.store, Instant::now());
        let changed = !dispatched.is_empty();
        for dispatch in dispatched {
            match dispatch {
                Dispatch::Start(started) => self.spawn_transfer(started),
                Dispatch::PayloadMissing(item) => self.finalized(&item),
            }
        }
        changed
    }

    /// Emits the event and side effects for an item that just became terminal.
    fn finalized(&self, item: &UploadItem) {
        match &item.error {
            None => self.emit(UploadEvent::Completed {
                id: item.id.clone(),
            }),
            Some(error) => self.emit(UploadEvent::Failed {
                id: item.id.clone(),
                error: error.clone(),
            }),
        }
        self.completion.on_terminal(item, &self.store.snapshot());
    }

    fn spawn_transfer(&self, started: StartedTransfer) {
        let StartedTransfer {
            item,
            payload,
            cancel,
            attempt,
        } = started;
        self.emit(UploadEvent::Started {
            id: item.id.clone(),
        });

        let transfer = Arc::clone(&self.transfer);
        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            let progress_inbox = inbox.clone();
            let progress_id = item.id.clone();
            let on_progress: ProgressCallback = Box::new(move |percent| {
                let cmd = Command::Progress {
                    id: progress_id.clone(),
                    attempt,
                    percent,
                };
                if progress_inbox.try_send(cmd).is_err() {
                    trace!(item = %progress_id, percent, "progress update dropped");
                }
            });

            let result = executor::execute(
                transfer.as_ref(),
                &payload,
                &item.target_path,
                on_progress,
                cancel,
            )
            .await;

            let _ = inbox
                .send(Command::Settled {
                    id: item.id,
                    attempt,
                    result,
                })
                .await;
        });
    }

    /// Schedules a tick once a retry backoff has elapsed.
    fn wake_at(&self, deadline: Instant) {
        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = inbox.send(Command::Tick).await;
        });
    }

    fn emit(&self, event: UploadEvent) {
        if let Err(e) = self.events.try_send(event) {
            trace!("upload event dropped: {e}");
        }
    }

    fn persist(&self) {
        self.save(&PersistedState::project(&self.store.snapshot()));
    }

    fn save(&self, state: &PersistedState) {
        let Some(file) = &self.state_file else {
            return;
        };
        if let Err(e) = file.save(state) {
            warn!(path = ?file.path(), error = %e, "failed to persist upload queue");
        }
    }

    fn stop(&mut self) -> PersistedState {
        self.store.cancel_all();
        let state = PersistedState::project(&self.store.snapshot());
        self.save(&state);
        debug!(persisted = state.items.len(), "upload manager stopped");
        state
    }
}
