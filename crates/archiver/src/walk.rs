//! Scheduling walks on the lily node
//!
//! A walk is the remote job that writes the tables for one period. Running
//! one goes through a fixed sequence of [`WalkPhase`]s:
//!
//! 1. derive the task set from the manifest's unshipped files
//! 2. pick a walk name whose processing report does not exist yet
//! 3. adopt a running walk with the same signature, or submit a new one
//! 4. wait for the job to stop running
//! 5. fetch its final state and check the error string
//! 6. touch a placeholder for every expected working file
//!
//! A failure anywhere restarts the whole sequence on the next tick.
//!
//! Adoption has no lock behind it. Two archivers that list jobs at the same
//! moment can both decide to submit, and the node will run both walks. The
//! walk names differ, so their output never collides and the later ship is
//! a no-op.

use chrono::{DateTime, Utc};
use rand::Rng;
use std::collections::BTreeSet;
use std::fmt;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::catalog::TableCatalog;
use crate::error::{ExportError, Result};
use crate::lily::{Connector, JobId, JobListResult, LilyApi, WalkConfig};
use crate::manifest::{ExportManifest, EXPORT_FORMAT};
use crate::poll::{poll_until, wait_until};

/// Task added to every walk so the consensus table is always produced
pub const BASELINE_TASK: &str = "consensus";

pub const MAX_WALK_NAME_ATTEMPTS: usize = 500;

/// Table every walk writes, one row per task and height
pub const PROCESSING_REPORT_TABLE: &str = "visor_processing_reports";

/// Where a walk on the node writes its files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkStorage {
    /// Storage name configured on the node
    pub name: String,

    /// Directory the storage writes to, as seen by the archiver
    pub path: PathBuf,
}

/// Progress of a single walk attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkPhase {
    Idle,
    Submitting,
    Adopting,
    Running,
    Ended,
    ResultFetched,
    Verified,
    Failed,
}

impl fmt::Display for WalkPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WalkPhase::Idle => "idle",
            WalkPhase::Submitting => "submitting",
            WalkPhase::Adopting => "adopting",
            WalkPhase::Running => "running",
            WalkPhase::Ended => "ended",
            WalkPhase::ResultFetched => "result_fetched",
            WalkPhase::Verified => "verified",
            WalkPhase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A finished walk and where its files are
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkInfo {
    pub name: String,
    pub path: PathBuf,
    pub format: String,
}

impl WalkInfo {
    /// Working file the walk writes for `table`
    pub fn walk_file(&self, table: &str) -> PathBuf {
        self.path.join(format!("{}-{}.{}", self.name, table, self.format))
    }

    pub fn processing_report(&self) -> PathBuf {
        self.walk_file(PROCESSING_REPORT_TABLE)
    }
}

/// Job the node is running on our behalf
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedJob {
    pub id: JobId,

    /// Walk name, which differs from the requested one when adopted
    pub name: String,

    /// `Adopting` or `Submitting`, depending on how the job was obtained
    pub phase: WalkPhase,
}

/// Tasks needed to produce the unshipped files, plus [`BASELINE_TASK`]
///
/// Returned in sorted order.
pub fn tasks_for_manifest(manifest: &ExportManifest, catalog: &TableCatalog) -> Vec<String> {
    let mut tasks: BTreeSet<&str> = manifest
        .unshipped_files()
        .filter_map(|f| catalog.get(&f.table_name).map(|t| t.task))
        .collect();
    tasks.insert(BASELINE_TASK);
    tasks.into_iter().map(str::to_string).collect()
}

/// Pick a walk name whose processing report is not already in `storage_path`
pub fn unused_walk_name(storage_path: &Path, suffix: &str, now: DateTime<Utc>) -> Result<String> {
    let day = now.format("%m%d");
    let mut name = format!("arch{day}-{suffix}");

    for _ in 0..MAX_WALK_NAME_ATTEMPTS {
        let info = WalkInfo {
            name: name.clone(),
            path: storage_path.to_path_buf(),
            format: EXPORT_FORMAT.to_string(),
        };
        match std::fs::metadata(info.processing_report()) {
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(name),
            Err(e) => return Err(ExportError::stat(info.processing_report(), e)),
            Ok(_) => {}
        }
        let n: u32 = rand::thread_rng().gen_range(0..10_000);
        name = format!("arch{day}-{n}-{suffix}");
    }

    Err(ExportError::NoUnusedWalkName {
        attempts: MAX_WALK_NAME_ATTEMPTS,
    })
}

/// Walk request covering the manifest's period and unshipped tables
pub fn walk_for_manifest(
    manifest: &ExportManifest,
    storage: &WalkStorage,
    catalog: &TableCatalog,
    now: DateTime<Utc>,
) -> Result<WalkConfig> {
    let name = unused_walk_name(&storage.path, &manifest.period.date.to_string(), now)?;

    Ok(WalkConfig {
        name,
        tasks: tasks_for_manifest(manifest, catalog),
        window: 0,
        from: manifest.period.start_height,
        to: manifest.period.end_height,
        restart_delay: 0,
        restart_on_completion: false,
        restart_on_failure: false,
        storage: storage.name.clone(),
    })
}

/// A running walk with the same signature as `cfg`, if any
pub async fn find_existing_job(api: &dyn LilyApi, cfg: &WalkConfig) -> Result<Option<JobListResult>> {
    let jobs = api.job_list().await?;
    Ok(jobs.into_iter().find(|j| j.matches(cfg)))
}

/// Current state of job `id`
pub async fn get_job_result(api: &dyn LilyApi, id: JobId) -> Result<JobListResult> {
    api.job_list()
        .await?
        .into_iter()
        .find(|j| j.id == id)
        .ok_or(ExportError::JobNotFound(id))
}

/// Create an empty working file for every manifest file that has none
///
/// The node skips files for tables with no rows; the placeholder lets
/// shipping treat "no rows" like any other output.
pub fn touch_export_files(manifest: &ExportManifest, walk: &WalkInfo) -> Result<()> {
    for file in &manifest.files {
        OpenOptions::new()
            .append(true)
            .create(true)
            .open(walk.walk_file(&file.table_name))?;
    }
    Ok(())
}

/// Drives one period's walk to completion
pub struct WalkRunner<'a> {
    connector: &'a dyn Connector,
    storage: &'a WalkStorage,
    catalog: &'a TableCatalog,
    cancel: &'a CancellationToken,
    interval: Duration,
}

impl<'a> WalkRunner<'a> {
    pub fn new(
        connector: &'a dyn Connector,
        storage: &'a WalkStorage,
        catalog: &'a TableCatalog,
        cancel: &'a CancellationToken,
        interval: Duration,
    ) -> Self {
        Self {
            connector,
            storage,
            catalog,
            cancel,
            interval,
        }
    }

    async fn connect(&self) -> Option<Box<dyn LilyApi>> {
        match self.connector.connect().await {
            Ok(api) => Some(api),
            Err(e) => {
                error!(error = %e, "failed to connect to lily api");
                None
            }
        }
    }

    /// One attempt at adopting or submitting the walk; `None` means retry
    pub async fn job_has_been_started(&self, cfg: &WalkConfig) -> Result<Option<StartedJob>> {
        let Some(api) = self.connect().await else {
            return Ok(None);
        };

        match find_existing_job(api.as_ref(), cfg).await {
            Ok(Some(job)) => {
                info!(job_id = %job.id, walk = %job.name, "adopting running walk that matched required job");
                Ok(Some(StartedJob {
                    id: job.id,
                    name: job.name,
                    phase: WalkPhase::Adopting,
                }))
            }
            Ok(None) => match api.walk(cfg).await {
                Ok(res) => Ok(Some(StartedJob {
                    id: res.id,
                    name: cfg.name.clone(),
                    phase: WalkPhase::Submitting,
                })),
                Err(e) => {
                    error!(error = %e, walk = %cfg.name, "failed to create walk");
                    Ok(None)
                }
            },
            Err(e) => {
                error!(error = %e, "failed to read jobs");
                Ok(None)
            }
        }
    }

    /// One check on whether job `id` has stopped running
    ///
    /// Only a job that has vanished from the node is an error.
    pub async fn job_has_ended(&self, id: JobId) -> Result<bool> {
        let Some(api) = self.connect().await else {
            return Ok(false);
        };

        match get_job_result(api.as_ref(), id).await {
            Ok(job) => Ok(!job.running),
            Err(e) if e.is_job_not_found() => Err(e),
            Err(e) => {
                error!(error = %e, job_id = %id, "failed to get job result");
                Ok(false)
            }
        }
    }

    /// One attempt at fetching the final state of job `id`
    pub async fn job_get_result(&self, id: JobId) -> Result<Option<JobListResult>> {
        let Some(api) = self.connect().await else {
            return Ok(None);
        };

        match get_job_result(api.as_ref(), id).await {
            Ok(job) => Ok(Some(job)),
            Err(e) => {
                error!(error = %e, job_id = %id, "failed reading job result");
                Ok(None)
            }
        }
    }

    /// One full walk attempt; `None` means start over on the next tick
    #[instrument(skip_all, fields(date = %manifest.period.date))]
    pub async fn walk_is_completed(&self, manifest: &ExportManifest) -> Result<Option<WalkInfo>> {
        let cfg = match walk_for_manifest(manifest, self.storage, self.catalog, Utc::now()) {
            Ok(cfg) => cfg,
            Err(e) => {
                error!(error = %e, "failed to create walk configuration");
                return Ok(None);
            }
        };
        debug!(walk = %cfg.name, tasks = %cfg.tasks.join(","), "using tasks");

        info!(walk = %cfg.name, phase = %WalkPhase::Idle, "starting walk");
        let started = poll_until(self.cancel, Duration::ZERO, self.interval, || {
            self.job_has_been_started(&cfg)
        })
        .await;
        let job = match started {
            Ok(job) => job,
            Err(e) => return self.attempt_failed(e, &cfg.name, WalkPhase::Submitting),
        };

        info!(walk = %job.name, job_id = %job.id, phase = %WalkPhase::Running, "waiting for walk to complete");
        if let Err(e) = wait_until(self.cancel, self.interval, self.interval, || {
            self.job_has_ended(job.id)
        })
        .await
        {
            return self.attempt_failed(e, &job.name, WalkPhase::Running);
        }

        info!(walk = %job.name, job_id = %job.id, phase = %WalkPhase::Ended, "walk complete");
        let result = match poll_until(self.cancel, Duration::ZERO, self.interval, || {
            self.job_get_result(job.id)
        })
        .await
        {
            Ok(result) => result,
            Err(e) => return self.attempt_failed(e, &job.name, WalkPhase::Ended),
        };

        if !result.error.is_empty() {
            let e = ExportError::WalkFailed {
                walk: job.name.clone(),
                message: result.error,
            };
            return self.attempt_failed(e, &job.name, WalkPhase::ResultFetched);
        }

        let walk = WalkInfo {
            name: job.name,
            path: self.storage.path.clone(),
            format: EXPORT_FORMAT.to_string(),
        };
        if let Err(e) = touch_export_files(manifest, &walk) {
            return self.attempt_failed(e, &walk.name, WalkPhase::ResultFetched);
        }

        Ok(Some(walk))
    }

    fn attempt_failed(&self, e: ExportError, walk: &str, phase: WalkPhase) -> Result<Option<WalkInfo>> {
        if e.is_cancelled() {
            return Err(e);
        }
        warn!(error = %e, walk, %phase, "walk attempt failed");
        Ok(None)
    }

    /// Run walk attempts until one completes
    pub async fn run(&self, manifest: &ExportManifest) -> Result<WalkInfo> {
        poll_until(self.cancel, Duration::ZERO, self.interval, || {
            self.walk_is_completed(manifest)
        })
        .await
    }
}
