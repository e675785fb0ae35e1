//! Durable sync-state store
//!
//! One JSON artifact per local root holding the full record set. The
//! whole set is rewritten on each successful commit via
//! write-to-temp-then-rename, so a crash mid-commit leaves either the
//! old artifact or the complete new one, never a truncated file.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Result, SyncError};
use crate::types::{ObjectKey, SyncRecord};

/// File name of the persisted artifact inside the local root
pub const STATE_FILE_NAME: &str = "sync_state.json";

/// Store for the persisted sync records of one local root
#[derive(Debug, Clone)]
pub struct SyncStateStore {
    path: PathBuf,
}

impl SyncStateStore {
    /// Bind to the artifact under the given local root
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            path: root.as_ref().join(STATE_FILE_NAME),
        }
    }

    /// Path of the persisted artifact
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all records, keyed by (bucket, key). An absent file is an
    /// empty set (first run). An unparseable file is `CorruptState`;
    /// the caller recovers by treating it as empty after a warning.
    /// Duplicate keys in the artifact resolve latest-wins.
    pub fn load_all(&self) -> Result<BTreeMap<ObjectKey, SyncRecord>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(&self.path)?;
        let records: Vec<SyncRecord> = serde_json::from_str(&content).map_err(|e| {
            SyncError::CorruptState(format!("{}: {e}", self.path.display()))
        })?;

        let mut map = BTreeMap::new();
        for record in records {
            map.insert(record.object_key(), record);
        }
        Ok(map)
    }

    /// Atomically replace the artifact with the given record set,
    /// sorted by (bucket, key) for reproducible output.
    pub fn commit(&self, records: impl IntoIterator<Item = SyncRecord>) -> Result<()> {
        let mut sorted: Vec<SyncRecord> = records.into_iter().collect();
        sorted.sort_by(|a, b| a.object_key().cmp(&b.object_key()));

        let json = serde_json::to_string_pretty(&sorted)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Temp file in the same directory so the rename stays on one
        // filesystem and is atomic.
        let temp_name = format!(".{STATE_FILE_NAME}.{}.tmp", std::process::id());
        let temp_path = self.path.with_file_name(temp_name);

        let mut temp_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;
        temp_file.write_all(json.as_bytes())?;
        temp_file.sync_all()?;
        drop(temp_file);

        fs::rename(&temp_path, &self.path)?;

        tracing::debug!(
            records = sorted.len(),
            path = %self.path.display(),
            "sync state committed"
        );
        Ok(())
    }
}
