//! Batch upload orchestration.
//!
//! The [`BatchUploadManager`] owns an ordered queue of files, routes each
//! file to the chunked session engine or the single-request simple
//! transport by size, aggregates byte progress across the batch, and
//! reacts to connectivity changes by auto-pausing and auto-resuming.

mod connectivity;
mod manager;
mod types;

pub use connectivity::{ConnectivityObserver, NoopConnectivity, WatchConnectivity};
pub use manager::{BatchUploadManager, SubscriptionId};
pub use types::{
    BatchStatus, BatchUploadProgress, BatchUploadResult, FailedFile, FileProgress,
    FileUploadItem, ItemStatus, NewUploadFile,
};

use uuid::Uuid;

/// Errors surfaced to the batch caller.
///
/// These are precondition violations; partial batch failure is reported
/// through [`BatchUploadResult`], not as an error.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("file {0} is currently uploading")]
    FileUploading(Uuid),

    #[error("file not found: {0}")]
    FileNotFound(Uuid),

    #[error("an upload run is already active")]
    AlreadyRunning,

    #[error("nothing is paused")]
    NothingPaused,

    #[error("nothing to retry")]
    NothingToRetry,

    #[error("store error: {0}")]
    Store(#[from] docuferry_store::StoreError),
}
