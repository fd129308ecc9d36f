//! Content identifiers for archived artifacts
//!
//! A content id is the lowercase hex SHA-256 digest of the bytes written to
//! the archive. It is computed after shipping so downstream consumers can
//! detect truncated or replaced files.

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

const READ_BUFFER_SIZE: usize = 8192;

/// Compute the content id of a file on disk
pub fn content_id_for_file(path: impl AsRef<Path>) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    content_id(&mut file)
}

/// Compute the content id of any readable source
pub fn content_id<R: Read>(reader: &mut R) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; READ_BUFFER_SIZE];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}
