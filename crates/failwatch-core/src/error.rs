//! Error types for the failure pipeline.

use std::path::PathBuf;

pub use crate::tracker::error::{TrackerError, TrackerResult};

/// Failure store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// `save`/`fetch_statistics` called before `init_schema`.
    #[error("failure store not initialized: call init_schema() first")]
    NotInitialized,

    /// The database file could not be opened.
    #[error("failed to open failure store at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Any other SQLite failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

/// Crate-level error.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for pipeline operations.
pub type WatchResult<T> = Result<T, WatchError>;
