//! Lily job request and response types
//!
//! Field names match the node's JSON encoding, which is PascalCase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Job type reported for walks
pub const WALK_JOB_TYPE: &str = "walk";

/// Identifier the node assigns to a scheduled job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Request to walk a height range and write the given tasks' tables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WalkConfig {
    pub name: String,
    pub tasks: Vec<String>,

    /// Job timeout in nanoseconds, zero for none
    pub window: i64,
    pub from: i64,
    pub to: i64,
    pub restart_delay: i64,
    pub restart_on_completion: bool,
    pub restart_on_failure: bool,

    /// Name of the storage configured on the node
    pub storage: String,
}

/// Response to a walk submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JobSubmitResult {
    #[serde(rename = "ID")]
    pub id: JobId,
    #[serde(default)]
    pub name: String,
}

/// One entry of the node's job list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JobListResult {
    #[serde(rename = "ID")]
    pub id: JobId,
    pub name: String,
    #[serde(rename = "Type")]
    pub job_type: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub tasks: Vec<String>,
    pub running: bool,
    #[serde(default)]
    pub restart_on_failure: bool,
    #[serde(default)]
    pub restart_on_completion: bool,
    #[serde(default)]
    pub restart_delay: i64,

    /// String-valued job parameters such as `storage`, `minHeight`, `maxHeight`
    #[serde(default)]
    pub params: HashMap<String, String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

impl JobListResult {
    fn param_height(&self, key: &str) -> Option<i64> {
        self.params.get(key).and_then(|v| v.parse().ok())
    }

    /// True when this is a running walk doing exactly what `cfg` asks for.
    ///
    /// Task lists are compared ignoring order.
    pub fn matches(&self, cfg: &WalkConfig) -> bool {
        self.job_type == WALK_JOB_TYPE
            && self.running
            && self.params.get("storage").map(String::as_str) == Some(cfg.storage.as_str())
            && self.param_height("minHeight") == Some(cfg.from)
            && self.param_height("maxHeight") == Some(cfg.to)
            && same_tasks(&self.tasks, &cfg.tasks)
    }
}

fn same_tasks(a: &[String], b: &[String]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut a: Vec<&str> = a.iter().map(String::as_str).collect();
    let mut b: Vec<&str> = b.iter().map(String::as_str).collect();
    a.sort_unstable();
    b.sort_unstable();
    a == b
}
