//! Shared fixtures for archiver integration tests
#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use archiver::calendar::{first_export_period, ChainParams, ExportPeriod};
use archiver::catalog::TableCatalog;
use archiver::compression::Compression;
use archiver::config::{ArchiverConfig, LilyConfig, PollSettings};
use archiver::lily::{Connector, JobId, JobListResult, JobSubmitResult, LilyApi, WalkConfig};
use archiver::walk::WalkStorage;
use archiver::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const REPORT_HEADER: &str =
    "height,state_root,reporter,task,started_at,completed_at,status,status_information,errors_detected\n";

/// Called when the mock node accepts a walk, standing in for the walk's output
pub type WalkHook = Arc<dyn Fn(&WalkConfig) + Send + Sync>;

#[derive(Default)]
struct State {
    jobs: Vec<JobListResult>,
    submitted: Vec<WalkConfig>,
    next_id: u64,
    list_calls: usize,
    fail_next_walk: Option<String>,
    drop_next_job: bool,
}

/// In-memory lily node.
///
/// Every job listing reports jobs as they were before the call and then
/// marks all running jobs finished, so a walk runs for exactly one poll.
#[derive(Clone)]
pub struct MockLily {
    state: Arc<Mutex<State>>,
    hook: Option<WalkHook>,
}

impl MockLily {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                next_id: 1,
                ..State::default()
            })),
            hook: None,
        }
    }

    pub fn with_hook(mut self, hook: WalkHook) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Add a running walk that was submitted by someone else
    pub fn add_running_walk(&self, id: u64, name: &str, cfg_like: &WalkConfig) {
        let mut state = self.state.lock().unwrap();
        state.jobs.push(job_for(JobId(id), name, cfg_like));
    }

    /// Make the next submitted walk finish with `error`
    pub fn fail_next_walk(&self, error: &str) {
        self.state.lock().unwrap().fail_next_walk = Some(error.to_string());
    }

    /// Forget the next submitted walk as soon as it is accepted
    pub fn drop_next_job(&self) {
        self.state.lock().unwrap().drop_next_job = true;
    }

    pub fn submitted(&self) -> Vec<WalkConfig> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }
}

fn job_for(id: JobId, name: &str, cfg: &WalkConfig) -> JobListResult {
    JobListResult {
        id,
        name: name.to_string(),
        job_type: "walk".to_string(),
        error: String::new(),
        tasks: cfg.tasks.clone(),
        running: true,
        restart_on_failure: false,
        restart_on_completion: false,
        restart_delay: 0,
        params: HashMap::from([
            ("storage".to_string(), cfg.storage.clone()),
            ("minHeight".to_string(), cfg.from.to_string()),
            ("maxHeight".to_string(), cfg.to.to_string()),
        ]),
        started_at: None,
        ended_at: None,
    }
}

#[async_trait]
impl LilyApi for MockLily {
    async fn walk(&self, cfg: &WalkConfig) -> Result<JobSubmitResult> {
        let (id, failure) = {
            let mut state = self.state.lock().unwrap();
            let id = JobId(state.next_id);
            state.next_id += 1;
            state.submitted.push(cfg.clone());

            let mut job = job_for(id, &cfg.name, cfg);
            let failure = state.fail_next_walk.take();
            if let Some(error) = &failure {
                job.error = error.clone();
            }
            if !std::mem::take(&mut state.drop_next_job) {
                state.jobs.push(job);
            }
            (id, failure)
        };

        if failure.is_none() {
            if let Some(hook) = &self.hook {
                hook(cfg);
            }
        }

        Ok(JobSubmitResult {
            id,
            name: cfg.name.clone(),
        })
    }

    async fn job_list(&self) -> Result<Vec<JobListResult>> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        let snapshot = state.jobs.clone();
        for job in &mut state.jobs {
            job.running = false;
        }
        Ok(snapshot)
    }
}

#[async_trait]
impl Connector for MockLily {
    async fn connect(&self) -> Result<Box<dyn LilyApi>> {
        Ok(Box::new(self.clone()))
    }
}

/// Temporary storage and archive directories
pub struct Workspace {
    _dir: TempDir,
    pub storage: PathBuf,
    pub archive: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let storage = dir.path().join("storage");
        let archive = dir.path().join("archive");
        std::fs::create_dir_all(&storage).unwrap();
        std::fs::create_dir_all(&archive).unwrap();
        Self {
            _dir: dir,
            storage,
            archive,
        }
    }

    pub fn config(&self, tables: &[&str]) -> ArchiverConfig {
        let catalog = TableCatalog::builtin();
        let names: Vec<String> = tables.iter().map(|t| t.to_string()).collect();

        ArchiverConfig {
            network: "mainnet".to_string(),
            chain: ChainParams::mainnet(),
            archive_root: self.archive.clone(),
            storage: WalkStorage {
                name: "CSV".to_string(),
                path: self.storage.clone(),
            },
            schema_version: 1,
            tables: catalog.resolve(1, &names).unwrap(),
            compression: Compression::GZIP,
            lily: LilyConfig {
                api_addr: "/ip4/127.0.0.1/tcp/1234".to_string(),
                api_token: None,
                timeout: Duration::from_secs(5),
            },
            poll: PollSettings::uniform(Duration::from_millis(5)),
            min_height: 0,
            start_date: None,
            end_date: None,
        }
    }

    pub fn archived(&self, path: &Path) -> bool {
        self.archive.join(path).exists()
    }
}

/// First mainnet period, long past finality
pub fn genesis_period() -> ExportPeriod {
    first_export_period(&ChainParams::mainnet())
}

/// Write a processing report for `walk` in `storage`
pub fn write_report(storage: &Path, walk: &str, rows: &[(&str, &str)]) {
    let mut body = REPORT_HEADER.to_string();
    for (task, status) in rows {
        body.push_str(&format!(
            "10,bafy,{walk},{task},2021-01-01 00:00:00,2021-01-01 00:00:01,{status},,\n"
        ));
    }
    std::fs::write(
        storage.join(format!("{walk}-visor_processing_reports.csv")),
        body,
    )
    .unwrap();
}

/// Hook that reports every requested task as OK
pub fn all_ok_hook(storage: PathBuf) -> WalkHook {
    Arc::new(move |cfg: &WalkConfig| {
        let rows: Vec<(&str, &str)> = cfg.tasks.iter().map(|t| (t.as_str(), "OK")).collect();
        write_report(&storage, &cfg.name, &rows);
    })
}
