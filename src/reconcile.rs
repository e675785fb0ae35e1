//! Sync-state reconciliation
//!
//! Pure planning: compares a remote listing against the prior sync
//! state under the configured filter rules and mode, and produces the
//! ordered FETCH/DELETE plan for this run. No IO happens here.

use std::collections::BTreeMap;
use std::path::Path;

use crate::filter::FilterRules;
use crate::types::{ObjectKey, PlanAction, PlanEntry, RemoteObject, SyncMode, SyncRecord};

/// Output of one reconciliation pass
#[derive(Debug, Clone, Default)]
pub struct ReconcilePlan {
    /// FETCH/DELETE entries, sorted by (bucket, key)
    pub entries: Vec<PlanEntry>,
    /// Prior records still up to date, carried into the next commit
    pub carried: Vec<SyncRecord>,
    /// Objects skipped because their fingerprint matched the prior record
    pub skipped: usize,
    /// Listing entries dropped for missing key or timestamp
    pub malformed: usize,
}

/// Compute the download plan for one run.
///
/// Filtered-out objects are invisible to this run: they are neither
/// fetched nor, in mirror mode, considered missing. Malformed listing
/// entries are counted and excluded rather than failing the run. In
/// mirror mode, deletion is restricted to prior records under the
/// given (bucket, prefix) scope; the caller must pass only pairs
/// whose listing succeeded this run.
///
/// Local target path is `<root>/<bucket>/<key>` so identical keys in
/// two configured buckets never collide.
pub fn plan(
    remote_objects: &[RemoteObject],
    rules: &FilterRules,
    mode: SyncMode,
    prior_state: &BTreeMap<ObjectKey, SyncRecord>,
    scope: &[(String, String)],
    local_root: &Path,
) -> ReconcilePlan {
    let mut result = ReconcilePlan::default();

    // Filter pass. Eligible objects keyed for the mirror diff below.
    let mut eligible: BTreeMap<ObjectKey, &RemoteObject> = BTreeMap::new();
    for object in remote_objects {
        if object.is_malformed() {
            result.malformed += 1;
            continue;
        }
        if !rules.is_eligible(object) {
            continue;
        }
        eligible.insert(object.object_key(), object);
    }

    for (key, object) in &eligible {
        let fetch = match mode {
            SyncMode::FullRefresh => true,
            SyncMode::Incremental | SyncMode::Mirror => match prior_state.get(key) {
                None => true,
                Some(record) => object.fingerprint() != Some(record.fingerprint()),
            },
        };

        if fetch {
            result.entries.push(PlanEntry {
                object: (*object).clone(),
                local_path: local_root.join(&object.bucket).join(&object.key),
                action: PlanAction::Fetch,
            });
        } else {
            result.skipped += 1;
            // Up to date; its record survives into the next commit.
            result.carried.push(prior_state[key].clone());
        }
    }

    if mode == SyncMode::Mirror {
        for (key, record) in prior_state {
            if eligible.contains_key(key) {
                continue;
            }
            if !in_scope(key, scope) {
                // Outside the configured bucket/prefix scope this run
                // could not have observed the object; carry, never delete.
                result.carried.push(record.clone());
                continue;
            }
            result.entries.push(PlanEntry {
                object: RemoteObject {
                    bucket: record.bucket.clone(),
                    key: record.key.clone(),
                    size: record.size,
                    last_modified: Some(record.last_modified),
                    etag: None,
                },
                local_path: record.local_path.clone(),
                action: PlanAction::Delete,
            });
        }
    } else {
        // Non-mirror modes never drop prior records for vanished keys.
        for (key, record) in prior_state {
            if !eligible.contains_key(key) {
                result.carried.push(record.clone());
            }
        }
    }

    result
        .entries
        .sort_by(|a, b| a.object.object_key().cmp(&b.object.object_key()));
    result
}

fn in_scope(key: &ObjectKey, scope: &[(String, String)]) -> bool {
    scope
        .iter()
        .any(|(bucket, prefix)| key.bucket == *bucket && key.key.starts_with(prefix))
}
