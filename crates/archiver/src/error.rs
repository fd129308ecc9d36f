//! Error types for the export engine
//!
//! Errors fall into a few families that callers treat differently:
//!
//! - **Permanent derivation errors** (`DatePrecedesGenesis`, `NoUnusedWalkName`,
//!   configuration problems) abort processing of the current period.
//! - **Transient errors** (`Http`, `Rpc`, most `Io`) are absorbed by the poll
//!   loop and retried.
//! - **`JobNotFound`** is permanent while waiting for a walk to finish and
//!   means "nothing to adopt" everywhere else.
//! - **`Cancelled`** always propagates straight to the driver.

use std::path::PathBuf;
use thiserror::Error;

use crate::calendar::Date;
use crate::lily::JobId;

/// Result type alias for export operations
pub type Result<T> = std::result::Result<T, ExportError>;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("date precedes genesis: {0}")]
    DatePrecedesGenesis(Date),

    #[error("failed to find unused walk name after {attempts} attempts")]
    NoUnusedWalkName { attempts: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("unknown compression scheme: {0}")]
    UnknownCompression(String),

    #[error("table '{name}' is not part of schema version {schema}")]
    UnknownTable { name: String, schema: u32 },

    #[error("job not found: {0}")]
    JobNotFound(JobId),

    #[error("walk {walk} failed: {message}")]
    WalkFailed { walk: String, message: String },

    #[error("lily api {method} returned error {code}: {message}")]
    Rpc {
        method: &'static str,
        code: i64,
        message: String,
    },

    #[error("lily api {method} returned an empty response")]
    EmptyRpcResponse { method: &'static str },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("stat {path:?}: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("file {0:?} is not a regular file")]
    NotRegularFile(PathBuf),

    #[error("compress {src:?} to {dst:?}: {source}")]
    Compression {
        src: PathBuf,
        dst: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("processing report {path:?}: {message}")]
    ProcessingReport { path: PathBuf, message: String },

    #[error("failed to ship one or more export files ({failed_tasks} failed tasks, {failed_files} failed files)")]
    ShipFailed {
        failed_tasks: usize,
        failed_files: usize,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Common(#[from] archiver_common::CommonError),

    #[error("operation cancelled")]
    Cancelled,
}

impl ExportError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn stat(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Stat {
            path: path.into(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn is_job_not_found(&self) -> bool {
        matches!(self, Self::JobNotFound(_))
    }
}
