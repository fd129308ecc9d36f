//! Archiver configuration
//!
//! Settings arrive through the command line (with `ARCHIVER_*` environment
//! fallbacks, see [`crate::ArchiveArgs`]) and are validated here into an
//! [`ArchiverConfig`] before anything touches the node or the filesystem.

use chrono::{DateTime, Datelike, Utc};
use std::path::PathBuf;
use std::time::Duration;

use crate::calendar::{ChainParams, Date};
use crate::catalog::{Table, TableCatalog};
use crate::compression::Compression;
use crate::error::{ExportError, Result};
use crate::manifest::ExportTarget;
use crate::walk::WalkStorage;
use crate::ArchiveArgs;

// ============================================================================
// Configuration Defaults
// ============================================================================

pub const DEFAULT_NETWORK: &str = "mainnet";

/// Lily API address when none is configured
pub const DEFAULT_LILY_API: &str = "/ip4/127.0.0.1/tcp/1234";

/// Storage name lily writes CSV output through
pub const DEFAULT_STORAGE_NAME: &str = "CSV";

pub const DEFAULT_SCHEMA_VERSION: u32 = 1;

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Last calendar year a start height may fall in
pub const MAX_EXPORT_YEAR: i32 = 9999;

/// Lily node connection settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LilyConfig {
    /// Multiaddr or http(s) URL of the node API
    pub api_addr: String,
    pub api_token: Option<String>,
    pub timeout: Duration,
}

/// Intervals for the waits in a period's lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Between checks that a period has reached finality
    pub finality: Duration,

    /// Between walk submission, completion and result checks
    pub walk: Duration,

    /// Between attempts at processing a period
    pub period: Duration,
}

impl PollSettings {
    pub fn uniform(interval: Duration) -> Self {
        Self {
            finality: interval,
            walk: interval,
            period: interval,
        }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::uniform(Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS))
    }
}

/// Validated archiver settings
#[derive(Debug, Clone)]
pub struct ArchiverConfig {
    pub network: String,
    pub chain: ChainParams,

    /// Root of the shared archive filesystem
    pub archive_root: PathBuf,
    pub storage: WalkStorage,
    pub schema_version: u32,

    /// Tables to export, resolved against the catalog
    pub tables: Vec<Table>,
    pub compression: Compression,
    pub lily: LilyConfig,
    pub poll: PollSettings,

    /// Lowest height to export; periods starting below it are skipped
    pub min_height: i64,

    /// First date to export, overriding `min_height`
    pub start_date: Option<Date>,

    /// Last date to export; the archiver runs forever when unset
    pub end_date: Option<Date>,
}

impl ArchiverConfig {
    /// Validate command line arguments into a configuration
    pub fn from_args(args: &ArchiveArgs, catalog: &TableCatalog) -> Result<Self> {
        let network = non_empty("network", &args.network)?;
        let mut chain = ChainParams::for_network(&network).unwrap_or_else(ChainParams::mainnet);
        if args.genesis_ts.is_some() || args.epoch_duration.is_some() || args.finality.is_some() {
            chain = ChainParams::new(
                args.genesis_ts.unwrap_or(chain.genesis_ts()),
                args.epoch_duration.unwrap_or(chain.epoch_duration_secs()),
                args.finality.unwrap_or(chain.finality()),
            )?;
        } else if ChainParams::for_network(&network).is_none() {
            return Err(ExportError::config(format!(
                "unknown network '{network}': set --genesis-ts for custom networks"
            )));
        }

        let storage = WalkStorage {
            name: non_empty("storage name", &args.storage_name)?,
            path: non_empty_path("storage path", &args.storage_path)?,
        };
        let archive_root = non_empty_path("ship path", &args.ship_path)?;
        let compression: Compression = args.compression.parse()?;

        let names: Vec<String> = args
            .tables
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        let tables = catalog.resolve(args.schema, &names)?;
        if tables.is_empty() {
            return Err(ExportError::config(format!(
                "no tables to export for schema version {}",
                args.schema
            )));
        }

        if args.poll_interval == 0 {
            return Err(ExportError::config("poll interval must be at least one second"));
        }
        if args.min_height < 0 {
            return Err(ExportError::config("min height must not be negative"));
        }
        if !height_in_calendar(args.min_height, &chain) {
            return Err(ExportError::config(format!(
                "min height {} lies beyond year {MAX_EXPORT_YEAR}",
                args.min_height
            )));
        }
        if let (Some(start), Some(end)) = (args.start_date, args.end_date) {
            if end < start {
                return Err(ExportError::config(format!(
                    "end date {end} precedes start date {start}"
                )));
            }
        }

        Ok(Self {
            network,
            chain,
            archive_root,
            storage,
            schema_version: args.schema,
            tables,
            compression,
            lily: LilyConfig {
                api_addr: non_empty("lily api address", &args.lily_api)?,
                api_token: args.lily_api_token.clone().filter(|t| !t.is_empty()),
                timeout: Duration::from_secs(args.lily_timeout),
            },
            poll: PollSettings::uniform(Duration::from_secs(args.poll_interval)),
            min_height: args.min_height,
            start_date: args.start_date,
            end_date: args.end_date,
        })
    }

    pub fn export_target(&self) -> ExportTarget {
        ExportTarget {
            network: self.network.clone(),
            archive_root: self.archive_root.clone(),
            schema_version: self.schema_version,
            allowed_tables: self.tables.clone(),
            compression: self.compression,
        }
    }
}

/// Whether `height` falls on a date the calendar can iterate to
fn height_in_calendar(height: i64, chain: &ChainParams) -> bool {
    height
        .checked_mul(chain.epoch_duration_secs())
        .and_then(|secs| secs.checked_add(chain.genesis_ts()))
        .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
        .is_some_and(|t| t.year() <= MAX_EXPORT_YEAR)
}

fn non_empty(what: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ExportError::config(format!("{what} must not be empty")));
    }
    Ok(value.to_string())
}

fn non_empty_path(what: &str, value: &std::path::Path) -> Result<PathBuf> {
    if value.as_os_str().is_empty() {
        return Err(ExportError::config(format!("{what} must not be empty")));
    }
    Ok(value.to_path_buf())
}
