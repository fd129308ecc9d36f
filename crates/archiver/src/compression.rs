//! Compression schemes and the compressor used when shipping
//!
//! # Supported Schemes
//!
//! - **Gzip** (`gzip`, `gz`): in-process encoder from flate2, extension `gz`

use async_trait::async_trait;
use flate2::write::GzEncoder;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

use crate::error::{ExportError, Result};

/// A named compression scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Compression {
    /// Names accepted in configuration, canonical name first
    pub names: &'static [&'static str],

    /// Extension appended to shipped files, without a leading dot
    pub extension: &'static str,
}

impl Compression {
    pub const GZIP: Compression = Compression {
        names: &["gzip", "gz"],
        extension: "gz",
    };

    pub fn name(&self) -> &'static str {
        self.names.first().copied().unwrap_or(self.extension)
    }
}

impl Default for Compression {
    fn default() -> Self {
        Self::GZIP
    }
}

pub const COMPRESSIONS: &[Compression] = &[Compression::GZIP];

/// Look up a scheme by any of its names
pub fn compression_by_name(name: &str) -> Option<Compression> {
    COMPRESSIONS
        .iter()
        .find(|c| c.names.iter().any(|n| *n == name))
        .copied()
}

impl FromStr for Compression {
    type Err = ExportError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        compression_by_name(&s.to_lowercase())
            .ok_or_else(|| ExportError::UnknownCompression(s.to_string()))
    }
}

/// Compresses a working file into its archive location
#[async_trait]
pub trait Compressor: Send + Sync {
    /// Compress `src` into `dst`, returning the compressed size in bytes.
    ///
    /// A missing `src` is an error. `dst` either holds the complete output
    /// afterwards or does not exist.
    async fn compress(&self, src: &Path, dst: &Path) -> Result<u64>;
}

/// Gzip compressor that never leaves a truncated destination behind
#[derive(Debug, Clone, Copy, Default)]
pub struct GzipCompressor {
    level: flate2::Compression,
}

impl GzipCompressor {
    pub fn new(level: u32) -> Self {
        Self {
            level: flate2::Compression::new(level.min(9)),
        }
    }
}

#[async_trait]
impl Compressor for GzipCompressor {
    async fn compress(&self, src: &Path, dst: &Path) -> Result<u64> {
        let src = src.to_path_buf();
        let dst = dst.to_path_buf();
        let level = self.level;

        tokio::task::spawn_blocking(move || {
            gzip_file(&src, &dst, level).map_err(|source| ExportError::Compression {
                src: src.clone(),
                dst: dst.clone(),
                source,
            })
        })
        .await?
    }
}

fn partial_path(dst: &Path) -> PathBuf {
    let mut name = dst.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    dst.with_file_name(name)
}

fn gzip_file(src: &Path, dst: &Path, level: flate2::Compression) -> io::Result<u64> {
    let partial = partial_path(dst);

    match write_gzip(src, &partial, level).and_then(|()| std::fs::rename(&partial, dst)) {
        Ok(()) => {
            let size = std::fs::metadata(dst)?.len();
            debug!(src = %src.display(), dst = %dst.display(), size, "compressed file");
            Ok(size)
        }
        Err(e) => {
            let _ = std::fs::remove_file(&partial);
            Err(e)
        }
    }
}

fn write_gzip(src: &Path, out: &Path, level: flate2::Compression) -> io::Result<()> {
    let mut reader = BufReader::new(File::open(src)?);
    let mut encoder = GzEncoder::new(BufWriter::new(File::create(out)?), level);
    io::copy(&mut reader, &mut encoder)?;

    let mut writer = encoder.finish()?;
    writer.flush()?;
    writer.get_ref().sync_all()
}
