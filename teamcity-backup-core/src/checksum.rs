use std::path::Path;

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::error::BackupError;

const READ_BUF: usize = 64 * 1024;

/// Lowercase hex digests of one file, as Artifactory expects them in the
/// `X-Checksum-*` headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksums {
    pub md5: String,
    pub sha1: String,
    pub sha256: String,
}

impl Checksums {
    pub fn of_bytes(data: &[u8]) -> Self {
        Self {
            md5: format!("{:x}", Md5::digest(data)),
            sha1: format!("{:x}", Sha1::digest(data)),
            sha256: format!("{:x}", Sha256::digest(data)),
        }
    }
}

/// Hashes the file in a single streaming pass, never holding it in memory.
pub async fn file_checksums(path: &Path) -> Result<Checksums, BackupError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| BackupError::io(path, e))?;

    let mut md5 = Md5::new();
    let mut sha1 = Sha1::new();
    let mut sha256 = Sha256::new();
    let mut buf = vec![0u8; READ_BUF];
    loop {
        let n = file
            .read(&mut buf)
            .await
            .map_err(|e| BackupError::io(path, e))?;
        if n == 0 {
            break;
        }
        md5.update(&buf[..n]);
        sha1.update(&buf[..n]);
        sha256.update(&buf[..n]);
    }

    Ok(Checksums {
        md5: format!("{:x}", md5.finalize()),
        sha1: format!("{:x}", sha1.finalize()),
        sha256: format!("{:x}", sha256.finalize()),
    })
}
