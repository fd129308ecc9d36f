//! Period driver
//!
//! [`Archiver`] processes one period at a time in ascending date order:
//! wait for finality, run the walk, verify each task, ship what verified.
//! Any failure is logged and the period is retried on the next tick; the
//! driver never skips ahead of a period that is not fully shipped.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::calendar::{
    export_period_for_date, first_export_period_after, ChainParams, Date, ExportPeriod,
};
use crate::catalog::TableCatalog;
use crate::compression::{Compressor, GzipCompressor};
use crate::config::{ArchiverConfig, PollSettings};
use crate::error::{ExportError, Result};
use crate::lily::Connector;
use crate::manifest::{manifest_for_period, ExportManifest, ExportTarget};
use crate::poll::wait_until;
use crate::ship::{remove_export_file, ship_export_file};
use crate::verify::{ProcessingReportVerifier, TaskVerifier, VerificationReport};
use crate::walk::{tasks_for_manifest, WalkInfo, WalkPhase, WalkRunner, WalkStorage};

/// Exports periods until cancelled
pub struct Archiver {
    params: ChainParams,
    target: ExportTarget,
    storage: WalkStorage,
    catalog: Arc<TableCatalog>,
    connector: Arc<dyn Connector>,
    verifier: Arc<dyn TaskVerifier>,
    compressor: Arc<dyn Compressor>,
    poll: PollSettings,
    cancel: CancellationToken,
}

impl Archiver {
    pub fn new(
        config: &ArchiverConfig,
        catalog: Arc<TableCatalog>,
        connector: Arc<dyn Connector>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            params: config.chain,
            target: config.export_target(),
            storage: config.storage.clone(),
            catalog,
            connector,
            verifier: Arc::new(ProcessingReportVerifier),
            compressor: Arc::new(GzipCompressor::default()),
            poll: config.poll,
            cancel,
        }
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn TaskVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = compressor;
        self
    }

    pub fn chain_params(&self) -> &ChainParams {
        &self.params
    }

    /// Current manifest for `period`
    pub fn manifest(&self, period: ExportPeriod) -> Result<ExportManifest> {
        manifest_for_period(period, &self.target, &self.catalog)
    }

    /// Bring every file in the manifest into the archive.
    ///
    /// Returns once all files are shipped. Fails if a task did not verify or
    /// a file could not be shipped; files that did ship stay shipped.
    #[instrument(skip_all, fields(date = %manifest.period.date, from = manifest.period.start_height, to = manifest.period.end_height))]
    pub async fn process_export(&self, manifest: &mut ExportManifest) -> Result<()> {
        if !manifest.has_unshipped_files() {
            info!("all files shipped, nothing to do");
            return Ok(());
        }
        info!("preparing to export files for shipping");

        // one full finality must pass after the period ends
        let earliest = manifest.period.earliest_export_ts(&self.params);
        if Utc::now().timestamp() < earliest {
            let at = DateTime::<Utc>::from_timestamp(earliest, 0).unwrap_or_default();
            info!(earliest = %at.to_rfc3339(), "waiting for finality before export");
        }
        wait_until(&self.cancel, Duration::ZERO, self.poll.finality, || async move {
            Ok(Utc::now().timestamp() > earliest)
        })
        .await?;

        let walk = WalkRunner::new(
            self.connector.as_ref(),
            &self.storage,
            &self.catalog,
            &self.cancel,
            self.poll.walk,
        )
        .run(manifest)
        .await?;
        info!(walk = %walk.name, "export complete");

        let tasks = tasks_for_manifest(manifest, &self.catalog);
        let report = self.verifier.verify(&walk, &tasks).await?;

        self.ship_verified(manifest, &walk, &report).await
    }

    /// Ship the unshipped files of every task that verified
    pub async fn ship_verified(
        &self,
        manifest: &mut ExportManifest,
        walk: &WalkInfo,
        report: &VerificationReport,
    ) -> Result<()> {
        let failed_tasks = report.failed_tasks().count();
        for (task, status) in report.failed_tasks() {
            warn!(task, %status, phase = %status.phase(), walk = %walk.name, "skipping files of unverified task");
        }

        let mut failed_files = 0;
        for task in report.ok_tasks() {
            debug!(task, phase = %WalkPhase::Verified, walk = %walk.name, "shipping files of verified task");
            let pending: Vec<_> = manifest
                .files_for_task(task, &self.catalog)
                .into_iter()
                .filter(|f| !f.shipped)
                .cloned()
                .collect();

            for file in pending {
                let shipped = match ship_export_file(
                    &file,
                    walk,
                    &self.target.archive_root,
                    self.compressor.as_ref(),
                )
                .await
                {
                    Ok(shipped) => shipped,
                    Err(e) => {
                        error!(error = %e, file = %file, "failed to ship export file");
                        failed_files += 1;
                        continue;
                    }
                };
                info!(file = %file, content_id = %shipped.content_id, "shipped export file");
                manifest.mark_shipped(&file.table_name, Some(shipped.content_id));

                if let Err(e) = remove_export_file(&file, walk).await {
                    error!(error = %e, file = %walk.walk_file(&file.table_name).display(), "failed to remove export file");
                }
            }
        }

        if failed_tasks > 0 || failed_files > 0 {
            return Err(ExportError::ShipFailed {
                failed_tasks,
                failed_files,
            });
        }
        Ok(())
    }

    /// One attempt at fully processing `period`; `false` means retry
    pub async fn export_is_processed(&self, period: ExportPeriod) -> Result<bool> {
        let mut manifest = match self.manifest(period) {
            Ok(m) => m,
            Err(e) => {
                error!(error = %e, date = %period.date, "failed to create manifest");
                return Ok(false);
            }
        };

        match self.process_export(&mut manifest).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                error!(error = %e, date = %period.date, from = period.start_height, to = period.end_height, "failed to process export");
                Ok(false)
            }
        }
    }

    /// Retry `period` until all of its files are shipped
    pub async fn process_period(&self, period: ExportPeriod) -> Result<()> {
        wait_until(&self.cancel, Duration::ZERO, self.poll.period, || {
            self.export_is_processed(period)
        })
        .await
    }

    /// Period the driver starts from
    pub fn start_period(&self, config: &ArchiverConfig) -> Result<ExportPeriod> {
        match config.start_date {
            Some(date) => export_period_for_date(date, &self.params),
            None => Ok(first_export_period_after(config.min_height, &self.params)),
        }
    }

    /// Process periods from `start` in ascending order.
    ///
    /// Returns after the period for `end` when given, otherwise runs until
    /// cancelled and returns [`ExportError::Cancelled`].
    pub async fn run(&self, start: ExportPeriod, end: Option<Date>) -> Result<()> {
        let mut period = start;
        loop {
            if end.is_some_and(|end| period.date > end) {
                info!(date = %period.date, "reached end date");
                return Ok(());
            }

            info!(period = %period, "processing period");
            self.process_period(period).await?;
            info!(date = %period.date, "period exported");

            period = period.next(&self.params);
        }
    }
}
