//! `chain-archiver manifest` command implementation
//!
//! Shows which files a day should produce and which are already archived.

use colored::Colorize;

use crate::calendar::Date;
use crate::catalog::TableCatalog;
use crate::config::ArchiverConfig;
use crate::error::Result;
use crate::manifest::{manifest_for_date, ExportManifest};
use crate::ArchiveArgs;

/// Print the manifest for `date`
pub async fn run(args: &ArchiveArgs, date: Date, json: bool) -> Result<()> {
    let catalog = TableCatalog::builtin();
    let config = ArchiverConfig::from_args(args, &catalog)?;
    let manifest = manifest_for_date(date, &config.chain, &config.export_target(), &catalog)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&manifest)?);
    } else {
        print_manifest(&manifest, &catalog);
    }
    Ok(())
}

fn print_manifest(manifest: &ExportManifest, catalog: &TableCatalog) {
    println!(
        "{} {} ({})",
        "Export period:".cyan().bold(),
        manifest.period.date,
        manifest.network
    );
    println!(
        "  Heights: {} to {}",
        manifest.period.start_height, manifest.period.end_height
    );
    println!();

    for file in &manifest.files {
        let task = catalog.get(&file.table_name).map_or("?", |t| t.task);
        let status = if file.shipped {
            "shipped".green()
        } else {
            "pending".yellow()
        };
        println!("{:>8}  {:<20} {}", status, task, file.path().display());
    }

    let pending = manifest.unshipped_files().count();
    println!();
    println!("{}", "Summary:".cyan().bold());
    println!("  Files:   {}", manifest.files.len());
    println!("  Pending: {}", pending);
}
