//! Expected export artifacts for a period
//!
//! A manifest lists every file the archive should hold for one period and
//! whether it is already there. The shipped flag is always derived from the
//! archive filesystem when the manifest is built; nothing about it is
//! persisted between runs.

use serde::Serialize;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::calendar::{export_period_for_date, ChainParams, Date, ExportPeriod};
use crate::catalog::{Table, TableCatalog};
use crate::compression::Compression;
use crate::error::{ExportError, Result};

/// Format written by the indexer for every table
pub const EXPORT_FORMAT: &str = "csv";

/// One expected archive artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportFile {
    pub date: Date,
    pub schema: u32,
    pub network: String,
    pub table_name: String,
    pub format: String,
    #[serde(skip)]
    pub compression: Compression,

    /// True when the canonical archive path exists
    pub shipped: bool,

    /// Hex SHA-256 of the compressed artifact, set once this run ships it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
}

impl ExportFile {
    /// Archive path relative to the archive root:
    /// `<network>/<format>/<schema>/<table>/<year>/<filename>`
    pub fn path(&self) -> PathBuf {
        let mut path = PathBuf::from(&self.network);
        path.push(&self.format);
        path.push(self.schema.to_string());
        path.push(&self.table_name);
        path.push(self.date.year().to_string());
        path.push(self.filename());
        path
    }

    pub fn filename(&self) -> String {
        format!(
            "{}-{}.{}.{}",
            self.table_name, self.date, self.format, self.compression.extension
        )
    }
}

impl fmt::Display for ExportFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.table_name, self.date)
    }
}

/// Where and what to export
#[derive(Debug, Clone)]
pub struct ExportTarget {
    pub network: String,
    pub archive_root: PathBuf,
    pub schema_version: u32,
    pub allowed_tables: Vec<Table>,
    pub compression: Compression,
}

impl ExportTarget {
    fn allows(&self, table: &Table) -> bool {
        self.allowed_tables.iter().any(|t| t.name == table.name)
    }
}

/// Files expected for one period, in catalog declaration order
#[derive(Debug, Clone, Serialize)]
pub struct ExportManifest {
    pub period: ExportPeriod,
    pub network: String,
    pub files: Vec<ExportFile>,
}

impl ExportManifest {
    /// Keep only files for the given tables
    pub fn filter_tables(&self, allowed: &[Table]) -> ExportManifest {
        ExportManifest {
            period: self.period,
            network: self.network.clone(),
            files: self
                .files
                .iter()
                .filter(|f| allowed.iter().any(|t| t.name == f.table_name))
                .cloned()
                .collect(),
        }
    }

    pub fn has_unshipped_files(&self) -> bool {
        self.files.iter().any(|f| !f.shipped)
    }

    pub fn unshipped_files(&self) -> impl Iterator<Item = &ExportFile> {
        self.files.iter().filter(|f| !f.shipped)
    }

    /// Files whose table is produced by `task`
    ///
    /// Files naming a table the catalog does not know are skipped.
    pub fn files_for_task(&self, task: &str, catalog: &TableCatalog) -> Vec<&ExportFile> {
        self.files
            .iter()
            .filter(|f| match catalog.get(&f.table_name) {
                Some(table) => table.task == task,
                None => {
                    warn!(table = %f.table_name, date = %f.date, "manifest file has unknown table");
                    false
                }
            })
            .collect()
    }

    /// Record that a file now exists at its archive path
    pub fn mark_shipped(&mut self, table_name: &str, content_id: Option<String>) {
        if let Some(f) = self.files.iter_mut().find(|f| f.table_name == table_name) {
            f.shipped = true;
            f.content_id = content_id;
        }
    }
}

/// Build the manifest for a period, probing the archive for shipped files
pub fn manifest_for_period(
    period: ExportPeriod,
    target: &ExportTarget,
    catalog: &TableCatalog,
) -> Result<ExportManifest> {
    let mut files = Vec::new();

    for table in catalog.tables_for_schema(target.schema_version) {
        if !target.allows(table) {
            continue;
        }

        let mut file = ExportFile {
            date: period.date,
            schema: target.schema_version,
            network: target.network.clone(),
            table_name: table.name.to_string(),
            format: EXPORT_FORMAT.to_string(),
            compression: target.compression,
            shipped: false,
            content_id: None,
        };
        file.shipped = exists(&target.archive_root.join(file.path()))?;
        files.push(file);
    }

    Ok(ExportManifest {
        period,
        network: target.network.clone(),
        files,
    })
}

/// Build the manifest for the period covering `date`
pub fn manifest_for_date(
    date: Date,
    params: &ChainParams,
    target: &ExportTarget,
    catalog: &TableCatalog,
) -> Result<ExportManifest> {
    let period = export_period_for_date(date, params)?;
    manifest_for_period(period, target, catalog)
}

fn exists(path: &Path) -> Result<bool> {
    match std::fs::metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(ExportError::stat(path, e)),
    }
}
