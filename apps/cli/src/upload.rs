//! `filebay upload`: drives an upload manager until every file settles.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use filebay_http_transfer::HttpTransfer;
use filebay_notifications::SharedToasts;
use filebay_upload_queue::{
    CacheInvalidator, Collaborators, FilePayload, MAX_RETRIES, PersistedState, QueueConfig,
    RetryOutcome, RetryPolicy, UploadError, UploadEvent, UploadItem, UploadManager, UploadStatus,
};
use tracing::{debug, info, warn};

use crate::cli::UploadArgs;
use crate::config::AppConfig;

/// How often the queue is polled when no events arrive.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Nothing to invalidate in a one-shot CLI; the hook is only logged.
struct LoggedInvalidation;

impl CacheInvalidator for LoggedInvalidation {
    fn invalidate(&self, path: &str) {
        debug!(path, "directory listing changed");
    }
}

/// Whether a failure is worth retrying automatically.
fn auto_retryable(error: Option<&UploadError>) -> bool {
    matches!(error, Some(UploadError::Server(_) | UploadError::Network(_)))
}

pub async fn run(args: UploadArgs, config: AppConfig) -> anyhow::Result<()> {
    let mut files = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let payload = FilePayload::open(path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?;
        files.push(payload);
    }

    let api_origin = args.api_origin.unwrap_or(config.api_origin.clone());
    let transfer = HttpTransfer::new(&api_origin)?;

    let auto_retries = args.retries.min(MAX_RETRIES);
    let queue_config = QueueConfig {
        concurrency: args.concurrency.unwrap_or(config.concurrency),
        retry: RetryPolicy {
            max_retries: auto_retries,
            ..RetryPolicy::default()
        },
        state_file: Some(config.state_file_path()?),
        ..QueueConfig::default()
    };
    info!(
        origin = %api_origin,
        concurrency = queue_config.concurrency,
        retries = queue_config.retry.max_retries,
        "starting uploads"
    );

    let collaborators = Collaborators::new(Arc::new(transfer))
        .with_notifier(Arc::new(SharedToasts::new()))
        .with_cache(Arc::new(LoggedInvalidation));
    let manager = UploadManager::start(queue_config, collaborators)?;

    let existing: HashSet<String> = args.existing.into_iter().collect();
    let created = manager.add_files_checked(files, &args.to, &existing).await?;
    let ids: HashSet<String> = created.iter().map(|i| i.id.clone()).collect();

    let ending = drive(manager, &ids, auto_retries, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;
    match ending {
        Ending::Settled(items) => summarize(&items),
        Ending::Interrupted(persisted) => {
            println!(
                "Interrupted. {} upload(s) saved; see `filebay status`.",
                persisted.items.len()
            );
            Ok(())
        }
    }
}

/// How a run ended.
enum Ending {
    /// Every item in the run reached a terminal status.
    Settled(Vec<UploadItem>),
    Interrupted(PersistedState),
}

/// Polls the queue until the items in `ids` settle or `interrupt` resolves.
///
/// Failed transport errors are retried up to `auto_retries` times each.
async fn drive(
    manager: UploadManager,
    ids: &HashSet<String>,
    auto_retries: u32,
    interrupt: impl Future<Output = ()>,
) -> anyhow::Result<Ending> {
    let mut events = manager
        .take_events()
        .context("upload events already taken")?;
    let mut exhausted = HashSet::new();
    let mut poll = tokio::time::interval(POLL_INTERVAL);
    tokio::pin!(interrupt);
    loop {
        tokio::select! {
            _ = &mut interrupt => {
                warn!("interrupted, stopping uploads");
                return Ok(Ending::Interrupted(manager.shutdown().await?));
            }
            Some(event) = events.recv() => log_event(&event),
            _ = poll.tick() => {}
        }

        let items = manager.snapshot().await?;
        for item in items.iter().filter(|i| ids.contains(&i.id)) {
            if auto_retries == 0
                || item.status != UploadStatus::Failed
                || exhausted.contains(&item.id)
                || !auto_retryable(item.error.as_ref())
            {
                continue;
            }
            match manager.retry(&item.id).await? {
                RetryOutcome::Scheduled { delay } => {
                    info!(file = %item.file_name, attempt = item.retry_count + 1, ?delay, "retrying");
                }
                RetryOutcome::LimitReached | RetryOutcome::NotRetryable => {
                    exhausted.insert(item.id.clone());
                }
            }
        }

        let mine: Vec<UploadItem> = manager
            .snapshot()
            .await?
            .into_iter()
            .filter(|i| ids.contains(&i.id))
            .collect();
        if mine.iter().all(|i| i.status.is_terminal()) {
            manager.shutdown().await?;
            return Ok(Ending::Settled(mine));
        }
    }
}

fn log_event(event: &UploadEvent) {
    match event {
        UploadEvent::Started { id } => debug!(item = %id, "started"),
        UploadEvent::Progress { id, progress } => debug!(item = %id, progress, "progress"),
        UploadEvent::Completed { id } => debug!(item = %id, "completed"),
        UploadEvent::Failed { id, error } => debug!(item = %id, %error, "failed"),
        UploadEvent::Requeued { id, retry_count, .. } => debug!(item = %id, retry_count, "requeued"),
        UploadEvent::Added { items } => debug!(count = items.len(), "added"),
        UploadEvent::Removed { id } => debug!(item = %id, "removed"),
        UploadEvent::Cleared { ids } => debug!(count = ids.len(), "cleared"),
    }
}

fn summarize(items: &[UploadItem]) -> anyhow::Result<()> {
    for line in summary_lines(items) {
        println!("{line}");
    }
    let failed = items
        .iter()
        .filter(|i| i.status == UploadStatus::Failed)
        .count();
    if failed > 0 {
        anyhow::bail!("{failed} upload(s) failed");
    }
    Ok(())
}

/// One line per item, then the totals.
fn summary_lines(items: &[UploadItem]) -> Vec<String> {
    let mut lines: Vec<String> = items
        .iter()
        .map(|item| match &item.error {
            None => format!("  uploaded  {}", item.file_name),
            Some(error) => format!("  failed    {} - {error}", item.file_name),
        })
        .collect();
    let failed = items.iter().filter(|i| i.error.is_some()).count();
    lines.push(format!("{} uploaded, {failed} failed", items.len() - failed));
    lines
}
