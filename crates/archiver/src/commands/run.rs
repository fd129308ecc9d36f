//! `chain-archiver run` command implementation
//!
//! Exports periods until the end date or until cancelled.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::catalog::TableCatalog;
use crate::config::ArchiverConfig;
use crate::error::Result;
use crate::export::Archiver;
use crate::lily::HttpConnector;
use crate::ArchiveArgs;

/// Run the archiver; cancellation is a clean exit
pub async fn run(args: &ArchiveArgs, cancel: CancellationToken) -> Result<()> {
    let catalog = Arc::new(TableCatalog::builtin());
    let config = ArchiverConfig::from_args(args, &catalog)?;

    let connector = HttpConnector::new(&config.lily.api_addr, config.lily.api_token.clone())?
        .with_timeout(config.lily.timeout);
    info!(
        network = %config.network,
        lily = connector.url(),
        storage = %config.storage.path.display(),
        archive = %config.archive_root.display(),
        tables = config.tables.len(),
        "starting archiver"
    );

    let archiver = Archiver::new(&config, catalog, Arc::new(connector), cancel);
    let start = archiver.start_period(&config)?;

    match archiver.run(start, config.end_date).await {
        Err(e) if e.is_cancelled() => {
            info!("archiver stopped");
            Ok(())
        }
        other => other,
    }
}
