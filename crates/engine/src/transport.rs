use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use docuferry_api::{ChunkUploadRequest, FileKind};
use docuferry_store::UploadSession;
use docuferry_transfer::{ChunkDescriptor, checksum_bytes};

use crate::{EngineError, UploadBackend, UploaderConfig};

/// Result of successfully transporting one chunk.
#[derive(Debug, Clone)]
pub struct ChunkOutcome {
    /// SHA-256 hex digest of the chunk bytes that were acknowledged.
    pub checksum: String,
    /// Direct-write URL handed back by the mediated backend, if any.
    pub signed_url: Option<String>,
    /// Remote job id handed back by the mediated backend, if any.
    pub job_id: Option<String>,
}

/// Transports one chunk with bounded retry and linear backoff.
///
/// Strategy selection: a session that already holds a `remote_upload_url`
/// writes directly to storage; otherwise the chunk goes through the
/// mediated endpoint, whose response may carry the URL for the next chunks.
/// The transport never persists anything — the session engine owns that.
pub struct ChunkTransport {
    backend: Arc<dyn UploadBackend>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl ChunkTransport {
    pub fn new(backend: Arc<dyn UploadBackend>, config: &UploaderConfig) -> Self {
        Self {
            backend,
            max_attempts: config.max_chunk_attempts.max(1),
            retry_delay: config.retry_delay,
        }
    }

    /// Sends `bytes` (the content of `chunk`) for `session`.
    ///
    /// Returns the outcome of the first successful attempt, or the last
    /// error once attempts are exhausted — at that point the failure is
    /// terminal for this chunk and the engine decides what it means for the
    /// session.
    pub async fn send(
        &self,
        session: &UploadSession,
        chunk: &ChunkDescriptor,
        kind: FileKind,
        bytes: &[u8],
    ) -> Result<ChunkOutcome, EngineError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            // Recomputed per attempt: cheap, and the content never mutates
            // between retries.
            let checksum = checksum_bytes(bytes);

            let result = match &session.remote_upload_url {
                Some(url) => self
                    .backend
                    .put_chunk(
                        url,
                        chunk.start,
                        chunk.end,
                        session.file_size,
                        &checksum,
                        bytes.to_vec(),
                    )
                    .await
                    .map(|()| ChunkOutcome {
                        checksum: checksum.clone(),
                        signed_url: None,
                        job_id: None,
                    }),
                None => {
                    let request = ChunkUploadRequest {
                        session_id: session.id.to_string(),
                        chunk_index: chunk.index,
                        chunk_data: bytes.to_vec(),
                        chunk_checksum: checksum.clone(),
                        total_chunks: session.total_chunks(),
                        file_name: session.file_name.clone(),
                        file_type: kind.api_token().to_string(),
                        file_size: session.file_size,
                    };
                    self.backend
                        .post_chunk(&request)
                        .await
                        .map(|response| ChunkOutcome {
                            checksum: checksum.clone(),
                            signed_url: response.signed_url,
                            job_id: response.upload_job_id,
                        })
                }
            };

            match result {
                Ok(outcome) => {
                    debug!(
                        session = %session.id,
                        chunk = chunk.index,
                        attempt,
                        "chunk acknowledged"
                    );
                    return Ok(outcome);
                }
                Err(e) => {
                    warn!(
                        session = %session.id,
                        chunk = chunk.index,
                        attempt,
                        error = %e,
                        "chunk attempt failed"
                    );
                    if attempt >= self.max_attempts {
                        return Err(e.into());
                    }
                    tokio::time::sleep(self.retry_delay * attempt).await;
                }
            }
        }
    }
}
