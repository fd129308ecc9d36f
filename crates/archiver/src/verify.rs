//! Per-task verification of a finished walk
//!
//! A walk writes one processing report row for every task at every height it
//! visited. A task's output is trusted only when the report shows the task
//! ran and never reported an error.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{ExportError, Result};
use crate::walk::{WalkInfo, WalkPhase};

/// Status value the indexer writes for failed task runs
pub const STATUS_ERROR: &str = "ERROR";

/// Verification outcome for one task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Ok,
    Failed(String),
}

impl TaskStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, TaskStatus::Ok)
    }

    /// Terminal walk phase for the task's output
    pub fn phase(&self) -> WalkPhase {
        match self {
            TaskStatus::Ok => WalkPhase::Verified,
            TaskStatus::Failed(_) => WalkPhase::Failed,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Ok => f.write_str("ok"),
            TaskStatus::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Status of every requested task, ordered by task name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationReport {
    pub tasks: BTreeMap<String, TaskStatus>,
}

impl VerificationReport {
    pub fn ok_tasks(&self) -> impl Iterator<Item = &str> {
        self.tasks
            .iter()
            .filter(|(_, s)| s.is_ok())
            .map(|(t, _)| t.as_str())
    }

    pub fn failed_tasks(&self) -> impl Iterator<Item = (&str, &TaskStatus)> {
        self.tasks
            .iter()
            .filter(|(_, s)| !s.is_ok())
            .map(|(t, s)| (t.as_str(), s))
    }
}

/// Decides which tasks of a finished walk produced usable output
#[async_trait]
pub trait TaskVerifier: Send + Sync {
    async fn verify(&self, walk: &WalkInfo, tasks: &[String]) -> Result<VerificationReport>;
}

#[derive(Debug, Deserialize)]
struct ReportRow {
    task: String,
    status: String,
    #[serde(default)]
    status_information: String,
}

#[derive(Default)]
struct TaskTally {
    rows: usize,
    errors: usize,
    first_error: Option<String>,
}

/// Reads the walk's `visor_processing_reports` file
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessingReportVerifier;

impl ProcessingReportVerifier {
    fn read_report(path: &Path) -> Result<HashMap<String, TaskTally>> {
        let reader = match csv::ReaderBuilder::new().flexible(true).from_path(path) {
            Ok(r) => r,
            Err(e) => {
                let missing = matches!(e.kind(), csv::ErrorKind::Io(io) if io.kind() == ErrorKind::NotFound);
                return Err(ExportError::ProcessingReport {
                    path: path.to_path_buf(),
                    message: if missing {
                        "report not found".to_string()
                    } else {
                        e.to_string()
                    },
                });
            }
        };

        let mut tallies: HashMap<String, TaskTally> = HashMap::new();
        for row in reader.into_deserialize::<ReportRow>() {
            let row = row?;
            let tally = tallies.entry(row.task).or_default();
            tally.rows += 1;
            if row.status.eq_ignore_ascii_case(STATUS_ERROR) {
                tally.errors += 1;
                tally.first_error.get_or_insert(row.status_information);
            }
        }
        Ok(tallies)
    }

    /// Classify tasks from the report found at `path`
    pub fn verify_report(path: &Path, tasks: &[String]) -> Result<VerificationReport> {
        let tallies = Self::read_report(path)?;
        let mut report = VerificationReport::default();

        for task in tasks {
            let status = match tallies.get(task) {
                None => TaskStatus::Failed("no rows in processing report".to_string()),
                Some(t) if t.errors > 0 => TaskStatus::Failed(format!(
                    "{} of {} rows reported errors: {}",
                    t.errors,
                    t.rows,
                    t.first_error.as_deref().unwrap_or("")
                )),
                Some(t) => {
                    debug!(task = %task, rows = t.rows, phase = %WalkPhase::Verified, "task verified");
                    TaskStatus::Ok
                }
            };
            if let TaskStatus::Failed(reason) = &status {
                warn!(task = %task, reason = %reason, phase = %status.phase(), "task failed verification");
            }
            report.tasks.insert(task.clone(), status);
        }

        Ok(report)
    }
}

#[async_trait]
impl TaskVerifier for ProcessingReportVerifier {
    async fn verify(&self, walk: &WalkInfo, tasks: &[String]) -> Result<VerificationReport> {
        let path = walk.processing_report();
        let tasks = tasks.to_vec();
        tokio::task::spawn_blocking(move || Self::verify_report(&path, &tasks)).await?
    }
}
