use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use docuferry_transfer::{ChunkDescriptor, plan_chunks};

/// Lifecycle state of an upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Uploading,
    Paused,
    Completed,
    Failed,
}

/// Durable record of one file's chunked-transfer progress.
///
/// Invariant: `uploaded_bytes` equals the summed size of chunks with
/// `uploaded == true`. Mutation goes through [`mark_chunk_uploaded`]
/// (Self::mark_chunk_uploaded) so the two never drift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    pub id: Uuid,
    pub file_path: PathBuf,
    pub file_name: String,
    pub mime_type: String,
    pub file_size: u64,
    pub chunk_size: u64,
    pub chunks: Vec<ChunkDescriptor>,
    pub uploaded_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_upload_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_job_id: Option<String>,
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl UploadSession {
    /// Creates a new pending session with a freshly planned chunk list.
    pub fn new(
        file_path: PathBuf,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        file_size: u64,
        chunk_size: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            file_path,
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            file_size,
            chunk_size,
            chunks: plan_chunks(file_size, chunk_size),
            uploaded_bytes: 0,
            created_at: now,
            last_updated_at: now,
            remote_upload_url: None,
            remote_job_id: None,
            status: SessionStatus::Pending,
            last_error: None,
        }
    }

    /// Total number of planned chunks.
    pub fn total_chunks(&self) -> u32 {
        self.chunks.len() as u32
    }

    /// Indices of chunks not yet acknowledged, in ascending order.
    pub fn pending_chunk_indices(&self) -> Vec<u32> {
        self.chunks
            .iter()
            .filter(|c| !c.uploaded)
            .map(|c| c.index)
            .collect()
    }

    /// Marks chunk `index` as uploaded and accounts its bytes.
    ///
    /// Idempotent: a chunk already marked uploaded is not double-counted,
    /// so a replayed acknowledgment cannot inflate `uploaded_bytes`.
    pub fn mark_chunk_uploaded(&mut self, index: u32, checksum: String) {
        let Some(chunk) = self.chunks.iter_mut().find(|c| c.index == index) else {
            return;
        };
        if chunk.uploaded {
            return;
        }
        chunk.uploaded = true;
        chunk.checksum = Some(checksum);
        self.uploaded_bytes += chunk.size;
        self.last_updated_at = Utc::now();
    }

    /// Transitions the session status and stamps the update time.
    pub fn set_status(&mut self, status: SessionStatus) {
        self.status = status;
        self.last_updated_at = Utc::now();
    }

    /// Records a terminal error message.
    pub fn set_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
        self.last_updated_at = Utc::now();
    }

    /// True once every planned chunk is uploaded (vacuously true for a
    /// zero-length file).
    pub fn is_complete(&self) -> bool {
        self.chunks.iter().all(|c| c.uploaded)
    }

    /// True when a failed or paused session may be resumed: some bytes were
    /// acknowledged, so the transfer picks up mid-file instead of starting
    /// over.
    pub fn can_resume(&self) -> bool {
        self.uploaded_bytes > 0
    }

    /// Recomputes `uploaded_bytes` from the chunk list.
    pub fn accounted_bytes(&self) -> u64 {
        self.chunks.iter().filter(|c| c.uploaded).map(|c| c.size).sum()
    }
}
