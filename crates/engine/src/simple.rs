use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use docuferry_api::{FileKind, SignedUploadFile, SignedUploadRequest};

use crate::{BackendError, EngineError, MultipartProgress, UploadBackend};

/// Result of a successful simple (whole-file) upload.
#[derive(Debug, Clone)]
pub struct SimpleOutcome {
    pub remote_job_id: Option<String>,
    /// True when the storage response was opaque (status 0) but the body
    /// was fully sent — resolved as success per the soft-success rule.
    pub soft_success: bool,
}

/// Single-request upload path for files below the chunking threshold.
///
/// Two phases: request a signed descriptor for the whole file, then one
/// multipart-form POST against the signed URL. Resuming from zero is cheap
/// at these sizes, so no session record is kept.
pub struct SimpleTransport {
    backend: Arc<dyn UploadBackend>,
}

impl SimpleTransport {
    pub fn new(backend: Arc<dyn UploadBackend>) -> Self {
        Self { backend }
    }

    pub async fn upload(
        &self,
        file_path: &Path,
        file_name: &str,
        mime_type: &str,
        file_size: u64,
        document_type: &str,
        on_progress: MultipartProgress,
    ) -> Result<SimpleOutcome, EngineError> {
        let kind = FileKind::from_mime(mime_type)
            .ok_or_else(|| EngineError::UnsupportedMime(mime_type.to_string()))?;

        let request = SignedUploadRequest {
            files: vec![SignedUploadFile {
                filename: file_name.to_string(),
                file_type: kind.api_token().to_string(),
                file_size_bytes: file_size,
                document_type: document_type.to_string(),
            }],
            image_batches: Vec::new(),
        };

        let response = self.backend.request_signed_upload(&request).await?;
        let Some(entry) = response.signed_urls.into_iter().next() else {
            return Err(match response.errors.into_iter().next() {
                Some(error) => EngineError::Rejected(error),
                None => EngineError::NoSignedUrl,
            });
        };

        let body = match std::fs::read(file_path) {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EngineError::SourceMissing(file_path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };

        // Storage policy field order: `acl` first, remaining policy fields
        // next, file content last (the backend appends the file part after
        // these). `Content-Type` carries the storage-side token, which
        // disagrees with the API-side token for JPEG.
        let mut fields: Vec<(String, String)> = Vec::with_capacity(entry.fields.len() + 1);
        if let Some(acl) = entry.fields.get("acl") {
            fields.push(("acl".to_string(), acl.clone()));
        }
        for (name, value) in &entry.fields {
            if name != "acl" && name != "Content-Type" {
                fields.push((name.clone(), value.clone()));
            }
        }
        fields.push(("Content-Type".to_string(), kind.storage_token().to_string()));

        let status = self
            .backend
            .post_multipart(
                &entry.url,
                fields,
                file_name.to_string(),
                kind.content_type().to_string(),
                body,
                on_progress,
            )
            .await?;

        if (200..300).contains(&status) {
            info!(file = file_name, status, "whole-file upload accepted");
            Ok(SimpleOutcome {
                remote_job_id: response.upload_job_id,
                soft_success: false,
            })
        } else if status == 0 {
            // Opaque status after the body was fully received: a mobile
            // proxy dropped the response. The upload almost certainly
            // landed, so this resolves as success rather than failure.
            debug!(file = file_name, "opaque status resolved as soft success");
            Ok(SimpleOutcome {
                remote_job_id: response.upload_job_id,
                soft_success: true,
            })
        } else {
            Err(EngineError::Backend(BackendError::Status {
                status,
                body: "storage rejected upload".into(),
            }))
        }
    }
}
