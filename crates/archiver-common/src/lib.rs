//! Chain Archiver Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared plumbing used by every archiver workspace member:
//!
//! - **Error Handling**: [`CommonError`] and the crate [`Result`] alias
//! - **Logging**: `tracing` subscriber setup driven by [`logging::LogConfig`]
//! - **Checksums**: content identifiers for archived artifacts
//!
//! # Example
//!
//! ```no_run
//! use archiver_common::checksum::content_id_for_file;
//!
//! fn describe(path: &str) -> archiver_common::Result<()> {
//!     let id = content_id_for_file(path)?;
//!     tracing::info!(%id, path, "artifact digest");
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;

pub use error::{CommonError, Result};
