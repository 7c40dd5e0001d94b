use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use reqwest::header::CONTENT_RANGE;
use tracing::debug;

use docuferry_api::{
    ChunkUploadRequest, ChunkUploadResponse, SignedUploadRequest, SignedUploadResponse,
};

use crate::UploaderConfig;

/// Header carrying the SHA-256 hex digest of a direct chunk write.
const CHECKSUM_HEADER: &str = "x-content-checksum";

/// Status code meaning "received, resume incomplete" from range-addressed
/// storage backends. Counts as chunk success.
const RESUME_INCOMPLETE: u16 = 308;

/// Byte-progress callback for a streaming multipart upload: `(sent, total)`.
pub type MultipartProgress = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Errors from the remote upload backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Abstract remote upload API.
///
/// The engine is written against this trait; [`HttpBackend`] is the real
/// implementation and tests substitute mocks.
pub trait UploadBackend: Send + Sync {
    /// Range-addressed write of one chunk to a signed URL.
    ///
    /// `end` is exclusive. Succeeds on 2xx and on 308 (resume incomplete).
    fn put_chunk(
        &self,
        url: &str,
        start: u64,
        end: u64,
        file_size: u64,
        checksum: &str,
        body: Vec<u8>,
    ) -> BoxFuture<'_, Result<(), BackendError>>;

    /// Backend-mediated chunk upload via `POST {api}/document/upload/chunk`.
    fn post_chunk(
        &self,
        request: &ChunkUploadRequest,
    ) -> BoxFuture<'_, Result<ChunkUploadResponse, BackendError>>;

    /// Requests a signed whole-file upload descriptor via
    /// `POST {api}/document/upload`.
    fn request_signed_upload(
        &self,
        request: &SignedUploadRequest,
    ) -> BoxFuture<'_, Result<SignedUploadResponse, BackendError>>;

    /// Multipart-form POST of a whole file to a signed URL.
    ///
    /// `fields` are sent in the given order, then the file part last.
    /// Returns the raw HTTP status; 0 means the response never arrived
    /// even though the body was fully sent (soft-success candidate — the
    /// caller decides).
    fn post_multipart(
        &self,
        url: &str,
        fields: Vec<(String, String)>,
        file_name: String,
        content_type: String,
        body: Vec<u8>,
        progress: MultipartProgress,
    ) -> BoxFuture<'_, Result<u16, BackendError>>;
}

// ---------------------------------------------------------------------------
// HttpBackend
// ---------------------------------------------------------------------------

/// `reqwest`-based implementation of [`UploadBackend`].
pub struct HttpBackend {
    client: reqwest::Client,
    api_base: String,
}

impl HttpBackend {
    pub fn new(config: &UploaderConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.api_base)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(BackendError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

impl UploadBackend for HttpBackend {
    fn put_chunk(
        &self,
        url: &str,
        start: u64,
        end: u64,
        file_size: u64,
        checksum: &str,
        body: Vec<u8>,
    ) -> BoxFuture<'_, Result<(), BackendError>> {
        let url = url.to_string();
        let checksum = checksum.to_string();
        Box::pin(async move {
            let range = format!("bytes {start}-{}/{file_size}", end - 1);
            let response = self
                .client
                .put(&url)
                .header(CONTENT_RANGE, range)
                .header(CHECKSUM_HEADER, checksum)
                .body(body)
                .send()
                .await?;

            let status = response.status();
            if status.is_success() || status.as_u16() == RESUME_INCOMPLETE {
                return Ok(());
            }
            let body = response.text().await.unwrap_or_default();
            Err(BackendError::Status {
                status: status.as_u16(),
                body,
            })
        })
    }

    fn post_chunk(
        &self,
        request: &ChunkUploadRequest,
    ) -> BoxFuture<'_, Result<ChunkUploadResponse, BackendError>> {
        let url = self.endpoint("/document/upload/chunk");
        let request = request.clone();
        Box::pin(async move {
            let response = self.client.post(&url).json(&request).send().await?;
            let response = Self::check_status(response).await?;
            Ok(response.json().await?)
        })
    }

    fn request_signed_upload(
        &self,
        request: &SignedUploadRequest,
    ) -> BoxFuture<'_, Result<SignedUploadResponse, BackendError>> {
        let url = self.endpoint("/document/upload");
        let request = request.clone();
        Box::pin(async move {
            let response = self.client.post(&url).json(&request).send().await?;
            let response = Self::check_status(response).await?;
            Ok(response.json().await?)
        })
    }

    fn post_multipart(
        &self,
        url: &str,
        fields: Vec<(String, String)>,
        file_name: String,
        content_type: String,
        body: Vec<u8>,
        progress: MultipartProgress,
    ) -> BoxFuture<'_, Result<u16, BackendError>> {
        let url = url.to_string();
        Box::pin(async move {
            let total = body.len() as u64;
            let sent = Arc::new(AtomicU64::new(0));

            // Stream the file part in 64 KiB slices so byte progress is
            // observable while the body goes out.
            let slices: Vec<Vec<u8>> = body.chunks(64 * 1024).map(<[u8]>::to_vec).collect();
            let counter = Arc::clone(&sent);
            let on_progress = Arc::clone(&progress);
            let stream = futures_util::stream::iter(slices).map(move |slice| {
                let so_far = counter.fetch_add(slice.len() as u64, Ordering::Relaxed)
                    + slice.len() as u64;
                on_progress(so_far, total);
                Ok::<Vec<u8>, std::io::Error>(slice)
            });

            let part = reqwest::multipart::Part::stream_with_length(
                reqwest::Body::wrap_stream(stream),
                total,
            )
            .file_name(file_name)
            .mime_str(&content_type)?;

            let mut form = reqwest::multipart::Form::new();
            for (name, value) in fields {
                form = form.text(name, value);
            }
            form = form.part("file", part);

            match self.client.post(&url).multipart(form).send().await {
                Ok(response) => Ok(response.status().as_u16()),
                Err(e) => {
                    // Mobile proxies sometimes swallow the response after the
                    // body was fully received. Surface that as status 0 so
                    // the caller can apply its soft-success rule.
                    let fully_sent = sent.load(Ordering::Relaxed) == total;
                    if fully_sent && !e.is_connect() && !e.is_timeout() {
                        debug!(error = %e, "response dropped after full body send, reporting opaque status");
                        Ok(0)
                    } else {
                        Err(e.into())
                    }
                }
            }
        })
    }
}
