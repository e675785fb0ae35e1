//! Pipeline coordination
//!
//! One run: validate pairs, list, reconcile against prior state,
//! download, then commit the new state exactly once. Per-pair listing
//! failures and per-object transfer failures are isolated; only setup
//! failures abort the run. A cancelled run never commits.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::config::SyncConfig;
use crate::download::{DownloadExecutor, ProgressFn};
use crate::error::{Result, SyncError};
use crate::reconcile;
use crate::remote::ObjectStore;
use crate::state::SyncStateStore;
use crate::types::{
    ObjectKey, OutcomeStatus, PlanAction, RemoteObject, RunPhase, RunSummary, SyncRecord,
};

/// Coordinates one sync run end to end
pub struct Pipeline {
    store: Arc<dyn ObjectStore>,
    config: SyncConfig,
    progress: Option<ProgressFn>,
}

impl Pipeline {
    pub fn new(store: Arc<dyn ObjectStore>, config: SyncConfig) -> Self {
        Self {
            store,
            config,
            progress: None,
        }
    }

    /// Attach an optional progress callback, forwarded to the executor
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Execute one full pipeline pass
    pub async fn run(&self, cancel: CancellationToken) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        // INIT: the local root must exist before anything else; failure
        // here is fatal to the whole run.
        enter(RunPhase::Init);
        let local_root = self.config.local_root();
        std::fs::create_dir_all(&local_root).map_err(|e| {
            enter(RunPhase::Failed);
            SyncError::Config(format!(
                "cannot create local root {}: {e}",
                local_root.display()
            ))
        })?;
        let state_store = SyncStateStore::new(&local_root);

        // LISTING
        enter(RunPhase::Listing);
        let scope = self.validated_pairs().await.map_err(|e| {
            enter(RunPhase::Failed);
            e
        })?;
        if scope.is_empty() {
            tracing::warn!("no accessible (bucket, prefix) pairs configured");
        }

        // Only pairs that actually listed this run; a pair whose
        // listing failed was not observed and must stay outside the
        // mirror deletion scope.
        let mut listed_scope: Vec<(String, String)> = Vec::new();
        let mut remote_objects: Vec<RemoteObject> = Vec::new();
        for (bucket, prefix) in &scope {
            match self.store.list_objects(bucket, prefix).await {
                Ok(objects) => {
                    tracing::info!(%bucket, %prefix, count = objects.len(), "listed pair");
                    remote_objects.extend(objects);
                    listed_scope.push((bucket.clone(), prefix.clone()));
                }
                Err(e) => {
                    // This pair's objects are excluded; the run continues.
                    tracing::error!(%bucket, %prefix, "listing failed, pair excluded: {e}");
                    summary.listing_errors += 1;
                }
            }
        }

        let prior_state = match state_store.load_all() {
            Ok(state) => state,
            Err(SyncError::CorruptState(msg)) => {
                // Recoverable: worst case is a redundant re-download.
                tracing::warn!("sync state unreadable, treating as empty: {msg}");
                BTreeMap::new()
            }
            Err(e) => {
                enter(RunPhase::Failed);
                return Err(e);
            }
        };

        // RECONCILING
        enter(RunPhase::Reconciling);
        let plan = reconcile::plan(
            &remote_objects,
            &self.config.filters,
            self.config.sync.mode,
            &prior_state,
            &listed_scope,
            &local_root,
        );
        summary.total_planned = plan.entries.len();
        summary.skipped = plan.skipped;
        summary.malformed = plan.malformed;
        tracing::info!(
            planned = plan.entries.len(),
            skipped = plan.skipped,
            malformed = plan.malformed,
            mode = %self.config.sync.mode,
            "plan computed"
        );

        if cancel.is_cancelled() {
            summary.cancelled = true;
            tracing::warn!("run cancelled before download phase, state not committed");
            return Ok(summary);
        }

        // DOWNLOADING
        enter(RunPhase::Downloading);
        let mut executor = DownloadExecutor::new(Arc::clone(&self.store), self.config.sync.threads)
            .with_cancellation(cancel.clone());
        if let Some(progress) = &self.progress {
            executor = executor.with_progress(Arc::clone(progress));
        }
        let outcomes = executor.execute(plan.entries).await;

        // Aggregate outcomes into the commit set and the summary.
        let mut new_records: BTreeMap<ObjectKey, SyncRecord> = plan
            .carried
            .into_iter()
            .map(|r| (r.object_key(), r))
            .collect();

        for outcome in &outcomes {
            let key = outcome.entry.object.object_key();
            match (outcome.status, outcome.entry.action) {
                (OutcomeStatus::Succeeded, PlanAction::Fetch) => {
                    summary.succeeded += 1;
                    if let Some(record) = record_for(&outcome.entry.object, &outcome.entry.local_path)
                    {
                        new_records.insert(key, record);
                    }
                }
                (OutcomeStatus::Succeeded, PlanAction::Delete) => {
                    summary.deleted += 1;
                    new_records.remove(&key);
                }
                (OutcomeStatus::Failed, action) => {
                    summary.failed += 1;
                    let detail = outcome.error.clone().unwrap_or_default();
                    summary.failures.push((key.clone(), detail));
                    if action == PlanAction::Delete {
                        // The file is still on disk; keep the record so
                        // the next mirror run retries the deletion.
                        if let Some(record) = prior_state.get(&key) {
                            new_records.insert(key, record.clone());
                        }
                    }
                }
                (OutcomeStatus::Skipped, _) => summary.skipped += 1,
            }
        }

        if cancel.is_cancelled() {
            // Partial truth must not be persisted; the next run replans
            // from the old state.
            summary.cancelled = true;
            tracing::warn!("run cancelled, state not committed");
            return Ok(summary);
        }

        // COMMITTING
        enter(RunPhase::Committing);
        state_store.commit(new_records.into_values())?;

        enter(RunPhase::Done);
        tracing::info!(%summary, "run complete");
        Ok(summary)
    }

    /// Validate configured (bucket, prefix) pairs the way the listing
    /// step expects them: a missing bucket is dropped with an error
    /// log and its pairs excluded, but a connection-level failure is
    /// fatal to the whole run before any plan is made.
    async fn validated_pairs(&self) -> Result<Vec<(String, String)>> {
        let mut pairs = Vec::new();
        let mut last_bucket: Option<(String, bool)> = None;

        for (bucket, prefix) in self.config.bucket_prefixes() {
            let accessible = match &last_bucket {
                Some((b, ok)) if *b == bucket => *ok,
                _ => {
                    let ok = self.store.bucket_exists(&bucket).await?;
                    if !ok {
                        tracing::error!(%bucket, "bucket not accessible, skipping");
                    }
                    last_bucket = Some((bucket.clone(), ok));
                    ok
                }
            };
            if accessible {
                pairs.push((bucket, prefix));
            }
        }
        Ok(pairs)
    }
}

fn enter(phase: RunPhase) {
    tracing::info!(phase = %phase, "pipeline phase");
}

fn record_for(object: &RemoteObject, local_path: &std::path::Path) -> Option<SyncRecord> {
    Some(SyncRecord {
        bucket: object.bucket.clone(),
        key: object.key.clone(),
        size: object.size,
        last_modified: object.last_modified?,
        local_path: local_path.to_path_buf(),
        downloaded_at: Utc::now(),
    })
}
