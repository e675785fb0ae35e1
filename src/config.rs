//! YAML configuration loading and validation
//!
//! The configuration maps buckets to prefix lists and carries the sync
//! mode, local download root, worker count and filter rules. It is
//! parsed once at startup and treated as immutable for the run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::filter::FilterRules;
use crate::types::SyncMode;

/// Default worker count when `sync.threads` is omitted
pub const DEFAULT_THREADS: usize = 12;

/// Top-level configuration for one sync run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Bucket name -> list of prefixes (empty list means the whole bucket)
    pub s3: BTreeMap<String, Vec<String>>,
    pub sync: SyncSettings,
    #[serde(default)]
    pub filters: FilterRules,
}

/// The `sync:` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default)]
    pub mode: SyncMode,
    /// Local download root; `~` is expanded
    pub loc_download: String,
    #[serde(default = "default_threads")]
    pub threads: usize,
}

fn default_threads() -> usize {
    DEFAULT_THREADS
}

impl SyncConfig {
    /// Load and validate a configuration from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: SyncConfig = serde_yaml::from_str(&content).map_err(|e| {
            SyncError::Config(format!("cannot parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check required fields; called by `load` and from tests directly
    pub fn validate(&self) -> Result<()> {
        if self.s3.is_empty() {
            return Err(SyncError::Config(
                "at least one bucket must be configured under `s3`".to_string(),
            ));
        }
        if self.sync.loc_download.trim().is_empty() {
            return Err(SyncError::Config(
                "`sync.loc_download` must not be empty".to_string(),
            ));
        }
        if self.sync.threads < 1 {
            return Err(SyncError::Config(
                "`sync.threads` must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Local root with `~` expanded
    pub fn local_root(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.sync.loc_download).to_string())
    }

    /// All configured (bucket, prefix) pairs. An empty prefix list
    /// expands to a single empty prefix covering the whole bucket.
    pub fn bucket_prefixes(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for (bucket, prefixes) in &self.s3 {
            if prefixes.is_empty() {
                pairs.push((bucket.clone(), String::new()));
            } else {
                for prefix in prefixes {
                    pairs.push((bucket.clone(), prefix.clone()));
                }
            }
        }
        pairs
    }

    /// Write a commented starter configuration, refusing to overwrite
    /// an existing file.
    pub fn write_template(path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if path.exists() {
            return Err(SyncError::Config(format!(
                "refusing to overwrite existing config: {}",
                path.display()
            )));
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, TEMPLATE)?;
        Ok(())
    }
}

const TEMPLATE: &str = "\
# s3sync configuration
#
# Buckets and the prefixes to mirror from each. An empty prefix list
# mirrors the whole bucket.
s3:
  example-bucket:
    - sample-data/

sync:
  # full_refresh | incremental | mirror
  mode: incremental
  loc_download: ./downloads
  threads: 12

filters:
  include_extensions:
    - \".csv\"
    - \".json\"
  exclude_files: []
";
