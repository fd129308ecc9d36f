//! Chain Archiver Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Exports the tables a lily node derives from the Filecoin chain into a
//! durable archive, one UTC day at a time, exactly once per day.
//!
//! # Overview
//!
//! - **Calendar**: maps calendar days onto contiguous height ranges
//! - **Manifest**: the files a day should produce and which are archived
//! - **Walks**: submits or adopts the lily job that writes a day's tables
//! - **Verification & Shipping**: checks each task's output, then
//!   compresses it into the archive and removes the working copy
//! - **Driver**: [`export::Archiver`] walks through days in order
//!
//! Nothing is persisted besides the archive itself. A restarted archiver
//! rebuilds its position from the files it finds there and the jobs the node
//! reports.

pub mod calendar;
pub mod catalog;
pub mod commands;
pub mod compression;
pub mod config;
pub mod error;
pub mod export;
pub mod lily;
pub mod manifest;
pub mod poll;
pub mod ship;
pub mod verify;
pub mod walk;

// Re-export commonly used types
pub use calendar::{ChainParams, Date, ExportPeriod};
pub use catalog::TableCatalog;
pub use config::ArchiverConfig;
pub use error::{ExportError, Result};
pub use export::Archiver;
pub use manifest::{ExportFile, ExportManifest};

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use config::{
    DEFAULT_LILY_API, DEFAULT_NETWORK, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_SCHEMA_VERSION,
    DEFAULT_STORAGE_NAME,
};
use lily::client::DEFAULT_API_TIMEOUT_SECS;

/// Chain Archiver - daily exports of lily tables
#[derive(Parser, Debug)]
#[command(name = "chain-archiver")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export every day from the start period onwards, forever or until --end-date
    Run {
        #[command(flatten)]
        archive: ArchiveArgs,
    },

    /// Show the export manifest for a single day
    Manifest {
        #[command(flatten)]
        archive: ArchiveArgs,

        /// Day to inspect (YYYY-MM-DD)
        #[arg(long)]
        date: Date,

        /// Print the manifest as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Settings shared by every command
#[derive(Args, Debug, Clone)]
pub struct ArchiveArgs {
    /// Network name, used in archive paths and to pick chain parameters
    #[arg(long, env = "ARCHIVER_NETWORK", default_value = DEFAULT_NETWORK)]
    pub network: String,

    /// Override the network's genesis unix timestamp
    #[arg(long, env = "ARCHIVER_GENESIS_TS")]
    pub genesis_ts: Option<i64>,

    /// Override the epoch duration in seconds
    #[arg(long, env = "ARCHIVER_EPOCH_DURATION")]
    pub epoch_duration: Option<i64>,

    /// Override the finality in epochs
    #[arg(long, env = "ARCHIVER_FINALITY")]
    pub finality: Option<i64>,

    /// Name of the lily storage walks write through
    #[arg(long, env = "ARCHIVER_STORAGE_NAME", default_value = DEFAULT_STORAGE_NAME)]
    pub storage_name: String,

    /// Directory the lily storage writes to
    #[arg(long, env = "ARCHIVER_STORAGE_PATH")]
    pub storage_path: PathBuf,

    /// Root of the archive files are shipped to
    #[arg(long, env = "ARCHIVER_SHIP_PATH")]
    pub ship_path: PathBuf,

    /// Major schema version of the exported tables
    #[arg(long, env = "ARCHIVER_SCHEMA", default_value_t = DEFAULT_SCHEMA_VERSION)]
    pub schema: u32,

    /// Comma separated tables to export; all tables of the schema when empty
    #[arg(long, env = "ARCHIVER_TABLES", value_delimiter = ',')]
    pub tables: Vec<String>,

    /// Compression for shipped files
    #[arg(long, env = "ARCHIVER_COMPRESSION", default_value = "gzip")]
    pub compression: String,

    /// Lily API address (multiaddr or URL)
    #[arg(long, env = "ARCHIVER_LILY_API", default_value = DEFAULT_LILY_API)]
    pub lily_api: String,

    /// Lily API token
    #[arg(long, env = "ARCHIVER_LILY_API_TOKEN", hide_env_values = true)]
    pub lily_api_token: Option<String>,

    /// Timeout for a single lily API request in seconds
    #[arg(long, env = "ARCHIVER_LILY_TIMEOUT", default_value_t = DEFAULT_API_TIMEOUT_SECS)]
    pub lily_timeout: u64,

    /// Seconds between polls while waiting on finality, walks and retries
    #[arg(long, env = "ARCHIVER_POLL_INTERVAL", default_value_t = DEFAULT_POLL_INTERVAL_SECS)]
    pub poll_interval: u64,

    /// Skip periods starting below this height
    #[arg(long, env = "ARCHIVER_MIN_HEIGHT", default_value_t = 0)]
    pub min_height: i64,

    /// First day to export (YYYY-MM-DD), overrides --min-height
    #[arg(long, env = "ARCHIVER_START_DATE")]
    pub start_date: Option<Date>,

    /// Last day to export (YYYY-MM-DD)
    #[arg(long, env = "ARCHIVER_END_DATE")]
    pub end_date: Option<Date>,
}
