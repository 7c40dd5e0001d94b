//! Upload execution: chunk transport with retry, the per-file session
//! engine, and the single-request small-file path.
//!
//! The engine drives exactly one file at a time. Network access goes
//! through the [`UploadBackend`] capability trait so tests (and alternate
//! storage backends) substitute their own implementation.

mod backend;
mod config;
mod controls;
mod session_engine;
mod simple;
mod transport;

pub use backend::{BackendError, HttpBackend, MultipartProgress, UploadBackend};
pub use config::{DEFAULT_CHUNK_THRESHOLD, UploaderConfig};
pub use controls::UploadControls;
pub use session_engine::{ChunkProgressFn, SessionEngine, SessionOutcome};
pub use simple::{SimpleOutcome, SimpleTransport};
pub use transport::{ChunkOutcome, ChunkTransport};

use std::path::PathBuf;

/// Errors produced while executing an upload.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transfer error: {0}")]
    Transfer(#[from] docuferry_transfer::TransferError),

    #[error("store error: {0}")]
    Store(#[from] docuferry_store::StoreError),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("unsupported MIME type: {0}")]
    UnsupportedMime(String),

    #[error("source file missing: {0}")]
    SourceMissing(PathBuf),

    #[error("source file changed size: session says {expected} bytes, disk says {actual}")]
    SourceChanged { expected: u64, actual: u64 },

    #[error("no signed upload descriptor returned")]
    NoSignedUrl,

    #[error("upload rejected: {0}")]
    Rejected(String),

    #[error("cancelled")]
    Cancelled,
}
