//! Moving verified walk output into the archive

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

use archiver_common::checksum::content_id_for_file;

use crate::compression::Compressor;
use crate::error::{ExportError, Result};
use crate::manifest::ExportFile;
use crate::walk::WalkInfo;

/// Result of shipping one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShippedFile {
    pub destination: PathBuf,

    /// Hex SHA-256 of the archived artifact
    pub content_id: String,

    /// False when the destination was already present
    pub compressed: bool,
}

async fn try_exists(path: &Path) -> Result<bool> {
    match tokio::fs::metadata(path).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(ExportError::stat(path, e)),
    }
}

async fn content_id(path: &Path) -> Result<String> {
    let path = path.to_path_buf();
    Ok(tokio::task::spawn_blocking(move || content_id_for_file(&path)).await??)
}

/// Compress the walk's working file for `file` into its archive path.
///
/// If the archive path already exists the file counts as shipped and the
/// working copy is not touched.
#[instrument(skip_all, fields(table = %file.table_name, date = %file.date))]
pub async fn ship_export_file(
    file: &ExportFile,
    walk: &WalkInfo,
    archive_root: &Path,
    compressor: &dyn Compressor,
) -> Result<ShippedFile> {
    let destination = archive_root.join(file.path());

    if try_exists(&destination).await? {
        debug!(destination = %destination.display(), "already in archive");
        return Ok(ShippedFile {
            content_id: content_id(&destination).await?,
            destination,
            compressed: false,
        });
    }

    info!("shipping export file");
    let working = walk.walk_file(&file.table_name);
    let meta = tokio::fs::metadata(&working)
        .await
        .map_err(|e| ExportError::stat(&working, e))?;
    if !meta.is_file() {
        return Err(ExportError::NotRegularFile(working));
    }
    debug!(working = %working.display(), size = meta.len(), "found export file");

    if let Some(dir) = destination.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }

    let size = compressor.compress(&working, &destination).await?;
    if !try_exists(&destination).await? {
        return Err(ExportError::Compression {
            src: working,
            dst: destination.clone(),
            source: std::io::Error::new(ErrorKind::NotFound, "compressed file missing"),
        });
    }
    debug!(destination = %destination.display(), size, "compressed file");

    Ok(ShippedFile {
        content_id: content_id(&destination).await?,
        destination,
        compressed: true,
    })
}

/// Delete the walk's working copy of `file`
pub async fn remove_export_file(file: &ExportFile, walk: &WalkInfo) -> Result<()> {
    let working = walk.walk_file(&file.table_name);
    match tokio::fs::remove_file(&working).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::calendar::Date;
    use crate::compression::{Compression, GzipCompressor};
    use crate::manifest::EXPORT_FORMAT;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        archive: PathBuf,
        walk: WalkInfo,
        file: ExportFile,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("archive");
        let storage = dir.path().join("storage");
        std::fs::create_dir_all(&storage).unwrap();

        Fixture {
            walk: WalkInfo {
                name: "arch0307-2021-03-06".to_string(),
                path: storage,
                format: EXPORT_FORMAT.to_string(),
            },
            file: ExportFile {
                date: Date::from_ymd_opt(2021, 3, 6).unwrap(),
                schema: 1,
                network: "mainnet".to_string(),
                table_name: "messages".to_string(),
                format: EXPORT_FORMAT.to_string(),
                compression: Compression::GZIP,
                shipped: false,
                content_id: None,
            },
            archive,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_ship_compresses_into_archive_layout() {
        let f = fixture();
        std::fs::write(f.walk.walk_file("messages"), b"cid\nbafy\n").unwrap();

        let shipped = ship_export_file(&f.file, &f.walk, &f.archive, &GzipCompressor::default())
            .await
            .unwrap();

        assert!(shipped.compressed);
        assert_eq!(
            shipped.destination,
            f.archive.join("mainnet/csv/1/messages/2021/messages-2021-03-06.csv.gz")
        );
        assert_eq!(shipped.content_id.len(), 64);
        assert!(f.walk.walk_file("messages").exists());

        remove_export_file(&f.file, &f.walk).await.unwrap();
        assert!(!f.walk.walk_file("messages").exists());
    }

    #[tokio::test]
    async fn test_ship_is_idempotent() {
        let f = fixture();
        std::fs::write(f.walk.walk_file("messages"), b"cid\nbafy\n").unwrap();
        let compressor = GzipCompressor::default();

        let first = ship_export_file(&f.file, &f.walk, &f.archive, &compressor)
            .await
            .unwrap();
        remove_export_file(&f.file, &f.walk).await.unwrap();

        let second = ship_export_file(&f.file, &f.walk, &f.archive, &compressor)
            .await
            .unwrap();
        assert!(!second.compressed);
        assert_eq!(first.content_id, second.content_id);

        remove_export_file(&f.file, &f.walk).await.unwrap();
    }

    #[tokio::test]
    async fn test_ship_requires_regular_working_file() {
        let f = fixture();
        let compressor = GzipCompressor::default();

        let err = ship_export_file(&f.file, &f.walk, &f.archive, &compressor)
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::Stat { .. }));

        std::fs::create_dir(f.walk.walk_file("messages")).unwrap();
        let err = ship_export_file(&f.file, &f.walk, &f.archive, &compressor)
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::NotRegularFile(_)));
    }
}
