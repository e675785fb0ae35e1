//! Bounded-parallel download execution
//!
//! Runs the plan's FETCH/DELETE entries on a worker pool. Fetches are
//! written to a temp path and renamed into place, transient transport
//! errors are retried with exponential backoff, and one entry's
//! failure never aborts its siblings.

use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backoff::{future::retry, Error as BackoffError, ExponentialBackoff};
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SyncError};
use crate::remote::ObjectStore;
use crate::types::{DownloadOutcome, OutcomeStatus, PlanAction, PlanEntry};

/// Progress callback: (entries completed, bytes downloaded)
pub type ProgressFn = Arc<dyn Fn(usize, u64) + Send + Sync>;

/// Retry window per object; transient errors retry inside this bound
const RETRY_INITIAL_INTERVAL: Duration = Duration::from_millis(250);
const RETRY_MAX_INTERVAL: Duration = Duration::from_secs(5);
const RETRY_MAX_ELAPSED: Duration = Duration::from_secs(30);

/// Executes a download plan with bounded parallelism
pub struct DownloadExecutor {
    store: Arc<dyn ObjectStore>,
    workers: usize,
    cancel: CancellationToken,
    progress: Option<ProgressFn>,
}

impl DownloadExecutor {
    /// Create an executor with the given worker count (minimum 1)
    pub fn new(store: Arc<dyn ObjectStore>, workers: usize) -> Self {
        Self {
            store,
            workers: workers.max(1),
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    /// Attach a run-level cancellation token. Once tripped, no new
    /// entry is dispatched; in-flight transfers finish.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Attach an optional progress callback
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Run all plan entries. Returns one outcome per dispatched entry;
    /// entries never dispatched because of cancellation produce none.
    pub async fn execute(&self, plan: Vec<PlanEntry>) -> Vec<DownloadOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut join_set: JoinSet<DownloadOutcome> = JoinSet::new();
        let files_done = Arc::new(AtomicUsize::new(0));
        let bytes_done = Arc::new(AtomicU64::new(0));

        for entry in plan {
            if self.cancel.is_cancelled() {
                tracing::warn!("cancellation requested, no further entries dispatched");
                break;
            }

            let permit = tokio::select! {
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
                _ = self.cancel.cancelled() => {
                    tracing::warn!("cancellation requested, no further entries dispatched");
                    break;
                }
            };

            let store = Arc::clone(&self.store);
            let progress = self.progress.clone();
            let files_done = Arc::clone(&files_done);
            let bytes_done = Arc::clone(&bytes_done);

            join_set.spawn(async move {
                let _permit = permit;
                let outcome = run_entry(store.as_ref(), entry).await;

                let files = files_done.fetch_add(1, Ordering::Relaxed) + 1;
                let bytes = bytes_done.fetch_add(outcome.bytes, Ordering::Relaxed) + outcome.bytes;
                if let Some(progress) = &progress {
                    progress(files, bytes);
                }
                outcome
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => tracing::error!("download task panicked: {e}"),
            }
        }
        outcomes
    }
}

async fn run_entry(store: &dyn ObjectStore, entry: PlanEntry) -> DownloadOutcome {
    let result = match entry.action {
        PlanAction::Fetch => fetch_entry(store, &entry).await,
        PlanAction::Delete => delete_entry(&entry).await.map(|_| 0),
    };

    match result {
        Ok(bytes) => {
            tracing::info!(
                key = %entry.object.object_key(),
                action = ?entry.action,
                bytes,
                "entry completed"
            );
            DownloadOutcome {
                entry,
                status: OutcomeStatus::Succeeded,
                error: None,
                bytes,
            }
        }
        Err(e) => {
            tracing::error!(key = %entry.object.object_key(), "entry failed: {e}");
            DownloadOutcome {
                entry,
                status: OutcomeStatus::Failed,
                error: Some(e.to_string()),
                bytes: 0,
            }
        }
    }
}

/// Fetch one object with retry, writing temp-then-rename so a partial
/// body never lands at the final path.
async fn fetch_entry(store: &dyn ObjectStore, entry: &PlanEntry) -> Result<u64> {
    let bucket = entry.object.bucket.clone();
    let key = entry.object.key.clone();

    let policy = ExponentialBackoff {
        initial_interval: RETRY_INITIAL_INTERVAL,
        max_interval: RETRY_MAX_INTERVAL,
        max_elapsed_time: Some(RETRY_MAX_ELAPSED),
        ..ExponentialBackoff::default()
    };

    let body = retry(policy, || async {
        match store.get_object(&bucket, &key).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.is_retryable() => {
                tracing::warn!(key = %key, "transient transfer error, retrying: {e}");
                Err(BackoffError::transient(e))
            }
            Err(e) => Err(BackoffError::permanent(e)),
        }
    })
    .await?;

    write_atomic(&entry.local_path, &body).await?;
    Ok(body.len() as u64)
}

/// Remove the local file for a mirror DELETE; already-absent is fine.
async fn delete_entry(entry: &PlanEntry) -> Result<()> {
    match tokio::fs::remove_file(&entry.local_path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(SyncError::Io(e)),
    }
}

async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!(".{file_name}.{}.part", std::process::id()));

    let mut file = tokio::fs::File::create(&temp_path).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&temp_path, path).await?;
    Ok(())
}
