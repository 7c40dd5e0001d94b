//! Chunk planning and byte-range file access for resumable uploads.

mod planner;
mod reader;

pub use planner::{ChunkDescriptor, plan_chunks};
pub use reader::{ChunkReader, checksum_bytes, checksum_file};

/// Default chunk size: 1 MiB.
///
/// Small enough that a retry on a flaky mobile uplink wastes little work,
/// large enough that per-chunk overhead (SHA-256, request round-trip,
/// session persistence) stays negligible for document-sized files.
pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("range {start}..{end} out of bounds for file of {file_size} bytes")]
    RangeOutOfBounds {
        start: u64,
        end: u64,
        file_size: u64,
    },

    #[error("short read: expected {expected} bytes at offset {offset}, got {actual}")]
    ShortRead {
        offset: u64,
        expected: u64,
        actual: u64,
    },
}
