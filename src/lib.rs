//! s3sync - Incremental S3-to-local mirror
//!
//! Synchronizes a local directory against a set of S3 bucket/prefix
//! pairs, downloading only new or changed objects and persisting sync
//! state between runs.

pub mod config;
pub mod download;
pub mod error;
pub mod filter;
pub mod pipeline;
pub mod reconcile;
pub mod remote;
pub mod state;
pub mod types;

pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use filter::FilterRules;
pub use pipeline::Pipeline;
pub use remote::{ObjectStore, S3ObjectStore};
pub use state::SyncStateStore;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
