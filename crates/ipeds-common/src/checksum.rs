//! Checksum utilities for file verification
//!
//! Downloads are verified with both MD5 and SHA-256. Both digests are fed from
//! the same buffer so a file is read exactly once.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Hex-encoded digests of one byte stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDigests {
    pub md5: String,
    pub sha256: String,
    pub size: u64,
}

/// Compute MD5 and SHA-256 for any readable source
pub fn compute_digests<R: Read>(reader: &mut R, buffer_size: usize) -> Result<FileDigests> {
    let mut md5 = md5::Context::new();
    let mut sha256 = Sha256::new();
    let mut buffer = vec![0u8; buffer_size.max(1)];
    let mut size = 0u64;

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        md5.consume(&buffer[..bytes_read]);
        sha256.update(&buffer[..bytes_read]);
        size += bytes_read as u64;
    }

    Ok(FileDigests {
        md5: format!("{:x}", md5.compute()),
        sha256: hex::encode(sha256.finalize()),
        size,
    })
}

/// Compute MD5 and SHA-256 for a file on disk
pub fn compute_file_digests(path: impl AsRef<Path>, buffer_size: usize) -> Result<FileDigests> {
    let mut file = std::fs::File::open(path)?;
    compute_digests(&mut file, buffer_size)
}
