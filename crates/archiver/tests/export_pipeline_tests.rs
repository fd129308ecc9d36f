//! End-to-end tests for the period driver
//!
//! These tests validate the full export workflow including:
//! - Partial failure: verified tasks ship, failed tasks wait for a rerun
//! - A file that fails to ship does not hold back its siblings
//! - Idempotency: a fully shipped period does no remote work
//! - Driving several periods up to an end date
//! - Cancellation while waiting for finality

mod common;

use archiver::calendar::{Date, ExportPeriod};
use archiver::catalog::TableCatalog;
use archiver::compression::{Compressor, GzipCompressor};
use archiver::lily::WalkConfig;
use archiver::{Archiver, ExportError};
use async_trait::async_trait;
use common::{all_ok_hook, genesis_period, write_report, MockLily, Workspace};
use flate2::read::GzDecoder;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn archiver_for(ws: &Workspace, tables: &[&str], lily: &MockLily) -> Archiver {
    Archiver::new(
        &ws.config(tables),
        Arc::new(TableCatalog::builtin()),
        Arc::new(lily.clone()),
        CancellationToken::new(),
    )
}

/// Walk output where the messages task fails while `messages_fail` is set
fn flaky_messages_hook(storage: PathBuf, messages_fail: Arc<AtomicBool>) -> common::WalkHook {
    Arc::new(move |cfg: &WalkConfig| {
        let rows: Vec<(&str, &str)> = cfg
            .tasks
            .iter()
            .map(|t| {
                let failed = t == "messages" && messages_fail.load(Ordering::SeqCst);
                (t.as_str(), if failed { "ERROR" } else { "OK" })
            })
            .collect();
        write_report(&storage, &cfg.name, &rows);

        if cfg.tasks.iter().any(|t| t == "blocks") {
            std::fs::write(
                storage.join(format!("{}-block_headers.csv", cfg.name)),
                "height,cid\n1,bafy\n",
            )
            .unwrap();
        }
    })
}

#[tokio::test]
async fn test_failed_task_is_skipped_and_rerun_ships_it() {
    let ws = Workspace::new();
    let messages_fail = Arc::new(AtomicBool::new(true));
    let lily = MockLily::new().with_hook(flaky_messages_hook(ws.storage.clone(), messages_fail.clone()));
    let archiver = archiver_for(&ws, &["block_headers", "messages"], &lily);
    let period = genesis_period();

    // first run: blocks verified, messages failed
    assert!(!archiver.export_is_processed(period).await.unwrap());

    let manifest = archiver.manifest(period).unwrap();
    let headers = &manifest.files[0];
    let messages = &manifest.files[1];
    assert_eq!(headers.table_name, "block_headers");
    assert!(headers.shipped);
    assert!(!messages.shipped);

    let first_walk = lily.submitted()[0].name.clone();
    let first_headers = ws.storage.join(format!("{first_walk}-block_headers.csv"));
    assert!(!first_headers.exists());
    assert!(ws.storage.join(format!("{first_walk}-messages.csv")).exists());

    let mut content = String::new();
    GzDecoder::new(std::fs::File::open(ws.archive.join(headers.path())).unwrap())
        .read_to_string(&mut content)
        .unwrap();
    assert_eq!(content, "height,cid\n1,bafy\n");

    // second run only asks for what is missing
    messages_fail.store(false, Ordering::SeqCst);
    assert!(archiver.export_is_processed(period).await.unwrap());

    let submitted = lily.submitted();
    assert_eq!(submitted.len(), 2);
    assert_eq!(submitted[1].tasks, vec!["consensus", "messages"]);
    assert_ne!(submitted[1].name, first_walk);

    let manifest = archiver.manifest(period).unwrap();
    assert!(!manifest.has_unshipped_files());
    assert!(ws.archived(&manifest.files[1].path()));
}

/// Gzip that refuses to write one table
struct RefuseTable(&'static str);

#[async_trait]
impl Compressor for RefuseTable {
    async fn compress(&self, src: &Path, dst: &Path) -> archiver::Result<u64> {
        let refused = src
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(&format!("-{}.csv", self.0)));
        if refused {
            return Err(ExportError::Compression {
                src: src.to_path_buf(),
                dst: dst.to_path_buf(),
                source: std::io::Error::other("no space left on device"),
            });
        }
        GzipCompressor::default().compress(src, dst).await
    }
}

#[tokio::test]
async fn test_ship_failure_does_not_block_other_files() {
    let ws = Workspace::new();
    let lily = MockLily::new().with_hook(all_ok_hook(ws.storage.clone()));
    let archiver = archiver_for(&ws, &["messages", "parsed_messages", "receipts"], &lily)
        .with_compressor(Arc::new(RefuseTable("receipts")));
    let period = genesis_period();

    let mut manifest = archiver.manifest(period).unwrap();
    let err = archiver.process_export(&mut manifest).await.unwrap_err();
    assert!(matches!(
        err,
        ExportError::ShipFailed {
            failed_tasks: 0,
            failed_files: 1
        }
    ));

    let shipped: Vec<_> = manifest
        .files
        .iter()
        .map(|f| (f.table_name.as_str(), f.shipped))
        .collect();
    assert_eq!(
        shipped,
        vec![("messages", true), ("parsed_messages", true), ("receipts", false)]
    );

    let walk = &lily.submitted()[0].name;
    assert!(ws.storage.join(format!("{walk}-receipts.csv")).exists());
    assert!(!ws.storage.join(format!("{walk}-messages.csv")).exists());

    let rebuilt = archiver.manifest(period).unwrap();
    let pending: Vec<_> = rebuilt.unshipped_files().map(|f| f.table_name.as_str()).collect();
    assert_eq!(pending, vec!["receipts"]);
}

#[tokio::test]
async fn test_shipped_period_does_no_remote_work() {
    let ws = Workspace::new();
    let lily = MockLily::new().with_hook(all_ok_hook(ws.storage.clone()));
    let archiver = archiver_for(&ws, &["block_headers", "receipts"], &lily);
    let period = genesis_period();

    assert!(archiver.export_is_processed(period).await.unwrap());
    let calls = lily.list_calls();

    assert!(archiver.export_is_processed(period).await.unwrap());
    assert_eq!(lily.list_calls(), calls);
    assert_eq!(lily.submitted().len(), 1);
}

#[tokio::test]
async fn test_process_export_records_content_ids() {
    let ws = Workspace::new();
    let lily = MockLily::new().with_hook(all_ok_hook(ws.storage.clone()));
    let archiver = archiver_for(&ws, &["chain_economics", "messages"], &lily);

    let mut manifest = archiver.manifest(genesis_period()).unwrap();
    archiver.process_export(&mut manifest).await.unwrap();

    for file in &manifest.files {
        assert!(file.shipped, "{file} not shipped");
        assert_eq!(file.content_id.as_deref().map(str::len), Some(64));
    }
    assert_eq!(
        lily.submitted()[0].tasks,
        vec!["chaineconomics", "consensus", "messages"]
    );
}

#[tokio::test]
async fn test_run_stops_after_end_date() {
    let ws = Workspace::new();
    let lily = MockLily::new().with_hook(all_ok_hook(ws.storage.clone()));
    let archiver = archiver_for(&ws, &["block_headers"], &lily);

    let start = genesis_period();
    let end = start.date.next();
    archiver.run(start, Some(end)).await.unwrap();

    let submitted = lily.submitted();
    assert_eq!(submitted.len(), 2);
    assert_eq!((submitted[0].from, submitted[0].to), (0, 239));
    assert_eq!((submitted[1].from, submitted[1].to), (240, 3119));

    for period in [start, start.next(archiver.chain_params())] {
        let manifest = archiver.manifest(period).unwrap();
        assert!(!manifest.has_unshipped_files(), "{} not exported", period.date);
    }
}

#[tokio::test]
async fn test_cancel_while_waiting_for_finality() {
    let ws = Workspace::new();
    let lily = MockLily::new();
    let cancel = CancellationToken::new();
    let archiver = Archiver::new(
        &ws.config(&["block_headers"]),
        Arc::new(TableCatalog::builtin()),
        Arc::new(lily.clone()),
        cancel.clone(),
    );

    // far beyond the chain head
    let period = ExportPeriod {
        date: Date::from_ymd_opt(2100, 1, 1).unwrap(),
        start_height: 100_000_000,
        end_height: 100_002_879,
    };

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let err = archiver.process_period(period).await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(lily.list_calls(), 0);
}
