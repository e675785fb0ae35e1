//! Core types for s3sync

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of a remote object: (bucket, key)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    pub bucket: String,
    pub key: String,
}

impl ObjectKey {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Immutable snapshot of a remote object at listing time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObject {
    pub bucket: String,
    /// Full key including prefix
    pub key: String,
    /// Object size in bytes
    pub size: u64,
    /// May be absent in a malformed listing entry; such objects are
    /// excluded from planning and reported as malformed
    pub last_modified: Option<DateTime<Utc>>,
    /// ETag as reported by the listing, if any
    pub etag: Option<String>,
}

impl RemoteObject {
    pub fn object_key(&self) -> ObjectKey {
        ObjectKey::new(self.bucket.clone(), self.key.clone())
    }

    /// Basename of the key (final path segment)
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }

    /// A listing entry is malformed if it has no key or no timestamp
    pub fn is_malformed(&self) -> bool {
        self.key.is_empty() || self.last_modified.is_none()
    }

    /// Cheap change proxy: (size, last_modified)
    pub fn fingerprint(&self) -> Option<(u64, DateTime<Utc>)> {
        self.last_modified.map(|ts| (self.size, ts))
    }
}

/// Persisted record of a previously downloaded object.
///
/// Field order matches the persisted column order:
/// (bucket, key, size, last_modified, local_path, downloaded_at).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRecord {
    pub bucket: String,
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub local_path: PathBuf,
    pub downloaded_at: DateTime<Utc>,
}

impl SyncRecord {
    pub fn object_key(&self) -> ObjectKey {
        ObjectKey::new(self.bucket.clone(), self.key.clone())
    }

    pub fn fingerprint(&self) -> (u64, DateTime<Utc>) {
        (self.size, self.last_modified)
    }
}

/// Policy governing which remote objects are considered for transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Ignore prior state, refetch everything matching filters
    FullRefresh,
    /// Fetch only new objects or objects whose fingerprint changed
    #[default]
    Incremental,
    /// Incremental plus deletion of local files gone from the remote
    Mirror,
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "full_refresh" => Ok(SyncMode::FullRefresh),
            "incremental" => Ok(SyncMode::Incremental),
            "mirror" => Ok(SyncMode::Mirror),
            other => Err(format!(
                "invalid sync mode '{other}' (expected full_refresh, incremental or mirror)"
            )),
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncMode::FullRefresh => "full_refresh",
            SyncMode::Incremental => "incremental",
            SyncMode::Mirror => "mirror",
        };
        f.write_str(s)
    }
}

/// Planned action for one object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanAction {
    Fetch,
    Delete,
}

/// One entry of a download plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub object: RemoteObject,
    pub local_path: PathBuf,
    pub action: PlanAction,
}

/// Terminal status of one executed plan entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Succeeded,
    Failed,
    Skipped,
}

/// Result of executing one plan entry
#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    pub entry: PlanEntry,
    pub status: OutcomeStatus,
    /// Error detail when status is Failed
    pub error: Option<String>,
    /// Bytes written for a successful fetch
    pub bytes: u64,
}

/// Pipeline state machine phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Init,
    Listing,
    Reconciling,
    Downloading,
    Committing,
    Done,
    Failed,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunPhase::Init => "INIT",
            RunPhase::Listing => "LISTING",
            RunPhase::Reconciling => "RECONCILING",
            RunPhase::Downloading => "DOWNLOADING",
            RunPhase::Committing => "COMMITTING",
            RunPhase::Done => "DONE",
            RunPhase::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Run-level result surfaced to the caller after one pipeline pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub total_planned: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub deleted: usize,
    /// Listing entries dropped for missing key or timestamp
    pub malformed: usize,
    /// (bucket, prefix) pairs whose listing failed and was excluded
    pub listing_errors: usize,
    pub cancelled: bool,
    /// Key and error detail for every failed entry
    pub failures: Vec<(ObjectKey, String)>,
}

impl RunSummary {
    /// A run is a success when no planned entry failed
    pub fn is_success(&self) -> bool {
        self.failed == 0 && !self.cancelled
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "planned={} succeeded={} failed={} skipped={} deleted={} malformed={} listing_errors={}{}",
            self.total_planned,
            self.succeeded,
            self.failed,
            self.skipped,
            self.deleted,
            self.malformed,
            self.listing_errors,
            if self.cancelled { " (cancelled)" } else { "" },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_mode_parses_known_values() {
        assert_eq!("full_refresh".parse::<SyncMode>(), Ok(SyncMode::FullRefresh));
        assert_eq!("incremental".parse::<SyncMode>(), Ok(SyncMode::Incremental));
        assert_eq!("mirror".parse::<SyncMode>(), Ok(SyncMode::Mirror));
        assert!("bidirectional".parse::<SyncMode>().is_err());
    }

    #[test]
    fn sync_mode_roundtrips_through_display() {
        for mode in [SyncMode::FullRefresh, SyncMode::Incremental, SyncMode::Mirror] {
            assert_eq!(mode.to_string().parse::<SyncMode>(), Ok(mode));
        }
    }

    #[test]
    fn file_name_strips_prefix() {
        let obj = RemoteObject {
            bucket: "b".into(),
            key: "raw/2024/data.csv".into(),
            size: 1,
            last_modified: Some(Utc::now()),
            etag: None,
        };
        assert_eq!(obj.file_name(), "data.csv");
    }

    #[test]
    fn missing_timestamp_is_malformed() {
        let obj = RemoteObject {
            bucket: "b".into(),
            key: "a.csv".into(),
            size: 1,
            last_modified: None,
            etag: None,
        };
        assert!(obj.is_malformed());
        assert!(obj.fingerprint().is_none());
    }
}
