//! Durable upload-session records.
//!
//! One [`UploadSession`] per in-flight chunked file, persisted after every
//! mutation so an interrupted upload resumes exactly where it left off.

mod session;
mod store;

pub use session::{SessionStatus, UploadSession};
pub use store::{FsSessionStore, MemorySessionStore, SessionStore};

/// Errors produced by session persistence.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
