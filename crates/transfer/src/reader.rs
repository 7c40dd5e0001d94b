use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::TransferError;

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes SHA-256 of an entire file and returns the hex-encoded digest.
pub fn checksum_file(path: &Path) -> Result<String, TransferError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Serves exact byte ranges of a source file.
///
/// Opened once per upload attempt; the session engine asks for one planned
/// chunk range at a time, in ascending order, skipping ranges already
/// acknowledged on a previous attempt.
pub struct ChunkReader {
    file: std::fs::File,
    file_size: u64,
}

impl ChunkReader {
    /// Opens `path` for range reads.
    pub fn open(path: &Path) -> Result<Self, TransferError> {
        let file = std::fs::File::open(path)?;
        let file_size = file.metadata()?.len();
        Ok(Self { file, file_size })
    }

    /// Total file size in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Reads exactly the bytes in `start..start + len`.
    ///
    /// A range past EOF or a short read both fail: the plan was computed
    /// from the file size, so either means the file changed underneath us.
    pub fn read_range(&mut self, start: u64, len: u64) -> Result<Vec<u8>, TransferError> {
        let end = start + len;
        if end > self.file_size {
            return Err(TransferError::RangeOutOfBounds {
                start,
                end,
                file_size: self.file_size,
            });
        }

        self.file.seek(SeekFrom::Start(start))?;
        let mut buf = vec![0u8; len as usize];
        let mut read = 0usize;
        while read < buf.len() {
            let n = self.file.read(&mut buf[read..])?;
            if n == 0 {
                return Err(TransferError::ShortRead {
                    offset: start,
                    expected: len,
                    actual: read as u64,
                });
            }
            read += n;
        }
        Ok(buf)
    }
}
