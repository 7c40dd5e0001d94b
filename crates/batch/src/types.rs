use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A file handed to the manager for upload.
#[derive(Debug, Clone)]
pub struct NewUploadFile {
    pub file_path: PathBuf,
    pub file_name: String,
    pub mime_type: String,
    pub file_size: u64,
    pub document_type: String,
}

/// Lifecycle state of one queued file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Uploading,
    Completed,
    Failed,
    Paused,
}

/// One entry in the batch queue. Owned and mutated exclusively by the
/// manager.
#[derive(Debug, Clone)]
pub struct FileUploadItem {
    pub id: Uuid,
    pub file_path: PathBuf,
    pub file_name: String,
    pub mime_type: String,
    pub file_size: u64,
    pub document_type: String,
    pub status: ItemStatus,
    pub progress_percent: f64,
    pub uploaded_bytes: u64,
    pub error: Option<String>,
    /// Set only for files on the chunked path.
    pub session_id: Option<Uuid>,
    pub remote_job_id: Option<String>,
}

impl FileUploadItem {
    pub fn new(file: NewUploadFile) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_path: file.file_path,
            file_name: file.file_name,
            mime_type: file.mime_type,
            file_size: file.file_size,
            document_type: file.document_type,
            status: ItemStatus::Pending,
            progress_percent: 0.0,
            uploaded_bytes: 0,
            error: None,
            session_id: None,
            remote_job_id: None,
        }
    }
}

/// Overall state of the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Idle,
    Uploading,
    Paused,
    Completed,
    Failed,
}

/// Aggregate progress, recomputed on every state change — never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchUploadProgress {
    pub total_files: usize,
    pub completed_files: usize,
    pub current_file_index: Option<usize>,
    pub total_bytes: u64,
    pub uploaded_bytes: u64,
    pub overall_percent: f64,
    pub status: BatchStatus,
    pub network_available: bool,
    pub resumable: bool,
}

/// Per-file progress event for file-level subscribers.
#[derive(Debug, Clone)]
pub struct FileProgress {
    pub id: Uuid,
    pub file_name: String,
    pub status: ItemStatus,
    pub uploaded_bytes: u64,
    pub total_bytes: u64,
    pub progress_percent: f64,
    pub error: Option<String>,
}

/// One terminally failed file in a batch run.
#[derive(Debug, Clone)]
pub struct FailedFile {
    pub id: Uuid,
    pub file_name: String,
    pub error: String,
    pub can_resume: bool,
}

/// What a `start`/`resume`/`retry` call accomplished.
#[derive(Debug, Clone, Default)]
pub struct BatchUploadResult {
    /// Files completed during this run, in queue order.
    pub completed: Vec<Uuid>,
    /// Files that failed terminally during this run.
    pub failed: Vec<FailedFile>,
    /// True when the run stopped at a resumable file (pause or recoverable
    /// failure) rather than draining the queue.
    pub resumable: bool,
}
