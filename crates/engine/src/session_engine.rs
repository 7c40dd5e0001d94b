use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use docuferry_api::FileKind;
use docuferry_store::{SessionStatus, SessionStore, UploadSession};
use docuferry_transfer::ChunkReader;

use crate::{ChunkTransport, EngineError, UploadBackend, UploadControls, UploaderConfig};

/// Per-chunk progress callback: `(uploaded_bytes, chunk_index)`.
pub type ChunkProgressFn = dyn Fn(u64, u32) + Send + Sync;

/// Terminal state of one engine run.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub uploaded_bytes: u64,
    pub remote_job_id: Option<String>,
    /// Whether `resume()`/`retry()` can pick this file up mid-transfer.
    pub can_resume: bool,
    pub error: Option<String>,
}

/// Drives a single file's chunked upload to completion.
///
/// State machine: `Pending → Uploading → {Completed | Paused | Failed}`,
/// with `Paused → Uploading` on resume and `Failed → Uploading` on retry
/// when progress was made. The session record is persisted after every
/// chunk acknowledgment, so a process death at any point resumes from the
/// last acknowledged chunk.
pub struct SessionEngine {
    store: Arc<dyn SessionStore>,
    transport: ChunkTransport,
    chunk_size: u64,
}

impl SessionEngine {
    pub fn new(
        store: Arc<dyn SessionStore>,
        backend: Arc<dyn UploadBackend>,
        config: &UploaderConfig,
    ) -> Self {
        Self {
            store,
            transport: ChunkTransport::new(backend, config),
            chunk_size: config.chunk_size,
        }
    }

    /// Creates a fresh pending session for a file, planned with the
    /// configured chunk size.
    pub fn create_session(
        &self,
        file_path: PathBuf,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        file_size: u64,
    ) -> UploadSession {
        UploadSession::new(file_path, file_name, mime_type, file_size, self.chunk_size)
    }

    /// Loads a previously persisted session for resume.
    pub fn load_session(&self, id: &Uuid) -> Result<Option<UploadSession>, EngineError> {
        Ok(self.store.load(id)?)
    }

    /// Runs the session until completion, pause, or terminal failure.
    ///
    /// Chunks transport in ascending index order, skipping those already
    /// acknowledged. Pause is honored only at chunk boundaries; cancel
    /// aborts an in-flight chunk immediately and best-effort deletes the
    /// persisted record. `Err` is reserved for precondition violations
    /// (missing/changed source, unsupported MIME, store failures) and
    /// cancellation — transport failures fold into the returned outcome.
    pub async fn run(
        &self,
        mut session: UploadSession,
        controls: &UploadControls,
        on_progress: &ChunkProgressFn,
    ) -> Result<SessionOutcome, EngineError> {
        let kind = FileKind::from_mime(&session.mime_type)
            .ok_or_else(|| EngineError::UnsupportedMime(session.mime_type.clone()))?;

        // Zero-length file: trivially complete, no transport at all.
        if session.chunks.is_empty() {
            return self.finish(session);
        }

        let mut reader = match ChunkReader::open(&session.file_path) {
            Ok(reader) => reader,
            Err(docuferry_transfer::TransferError::Io(e))
                if e.kind() == std::io::ErrorKind::NotFound =>
            {
                return Err(EngineError::SourceMissing(session.file_path.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        if reader.file_size() != session.file_size {
            return Err(EngineError::SourceChanged {
                expected: session.file_size,
                actual: reader.file_size(),
            });
        }

        session.set_status(SessionStatus::Uploading);
        session.last_error = None;
        self.store.save(&session)?;
        info!(
            session = %session.id,
            file = %session.file_name,
            pending = session.pending_chunk_indices().len(),
            "session uploading"
        );

        for index in session.pending_chunk_indices() {
            if controls.is_cancelled() {
                return self.cancelled(&session);
            }
            if controls.is_paused() {
                session.set_status(SessionStatus::Paused);
                self.store.save(&session)?;
                debug!(session = %session.id, chunk = index, "paused at chunk boundary");
                return Ok(self.outcome(&session, true, None));
            }

            let chunk = session.chunks[index as usize].clone();
            let bytes = reader.read_range(chunk.start, chunk.size)?;

            let sent = tokio::select! {
                result = self.transport.send(&session, &chunk, kind, &bytes) => result,
                () = controls.cancel_token().cancelled_owned() => {
                    return self.cancelled(&session);
                }
            };

            match sent {
                Ok(outcome) => {
                    if session.remote_upload_url.is_none() && outcome.signed_url.is_some() {
                        debug!(session = %session.id, "backend handed off to direct storage writes");
                        session.remote_upload_url = outcome.signed_url;
                    }
                    if outcome.job_id.is_some() {
                        session.remote_job_id = outcome.job_id;
                    }
                    session.mark_chunk_uploaded(index, outcome.checksum);
                    self.store.save(&session)?;
                    on_progress(session.uploaded_bytes, index);
                }
                Err(e) => {
                    // First-chunk failure smells like bad credentials or an
                    // unsupported file; mid-transfer failure is a network
                    // hiccup worth resuming.
                    let status = if session.uploaded_bytes == 0 {
                        SessionStatus::Failed
                    } else {
                        SessionStatus::Paused
                    };
                    let message = e.to_string();
                    session.set_status(status);
                    session.set_error(&message);
                    self.store.save(&session)?;
                    warn!(
                        session = %session.id,
                        chunk = index,
                        status = ?status,
                        error = %message,
                        "chunk failed terminally"
                    );
                    return Ok(self.outcome(&session, session.can_resume(), Some(message)));
                }
            }
        }

        self.finish(session)
    }

    fn finish(&self, mut session: UploadSession) -> Result<SessionOutcome, EngineError> {
        session.set_status(SessionStatus::Completed);
        self.store.save(&session)?;
        // The durable record of success is the caller-visible job id, not
        // the local session, so completed records are removed.
        self.store.delete(&session.id)?;
        info!(session = %session.id, file = %session.file_name, "session completed");
        Ok(self.outcome(&session, false, None))
    }

    fn cancelled(&self, session: &UploadSession) -> Result<SessionOutcome, EngineError> {
        if let Err(e) = self.store.delete(&session.id) {
            warn!(session = %session.id, error = %e, "failed to delete cancelled session");
        }
        info!(session = %session.id, "session cancelled");
        Err(EngineError::Cancelled)
    }

    fn outcome(
        &self,
        session: &UploadSession,
        can_resume: bool,
        error: Option<String>,
    ) -> SessionOutcome {
        SessionOutcome {
            session_id: session.id,
            status: session.status,
            uploaded_bytes: session.uploaded_bytes,
            remote_job_id: session.remote_job_id.clone(),
            can_resume,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BackendError, MultipartProgress};
    use docuferry_api::{
        ChunkUploadRequest, ChunkUploadResponse, SignedUploadRequest, SignedUploadResponse,
    };
    use docuferry_store::MemorySessionStore;
    use futures_util::future::BoxFuture;
    use std::collections::VecDeque;
    use std::io::Write;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const MIB: u64 = 1024 * 1024;

    /// Scripted backend: pops one pre-queued chunk result per call; an
    /// empty queue means failure.
    #[derive(Default)]
    struct ScriptedBackend {
        post_results: Mutex<VecDeque<Result<ChunkUploadResponse, BackendError>>>,
        put_results: Mutex<VecDeque<Result<(), BackendError>>>,
        post_calls: Mutex<Vec<ChunkUploadRequest>>,
        put_calls: Mutex<Vec<(u64, u64)>>,
    }

    impl ScriptedBackend {
        fn queue_post_ok(&self, n: usize) {
            let mut results = self.post_results.lock().unwrap();
            for _ in 0..n {
                results.push_back(Ok(ChunkUploadResponse::default()));
            }
        }
    }

    fn status_error() -> BackendError {
        BackendError::Status {
            status: 503,
            body: "unavailable".into(),
        }
    }

    impl UploadBackend for ScriptedBackend {
        fn put_chunk(
            &self,
            _url: &str,
            start: u64,
            end: u64,
            _file_size: u64,
            _checksum: &str,
            _body: Vec<u8>,
        ) -> BoxFuture<'_, Result<(), BackendError>> {
            self.put_calls.lock().unwrap().push((start, end));
            Box::pin(async move {
                self.put_results
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or(Err(status_error()))
            })
        }

        fn post_chunk(
            &self,
            request: &ChunkUploadRequest,
        ) -> BoxFuture<'_, Result<ChunkUploadResponse, BackendError>> {
            self.post_calls.lock().unwrap().push(request.clone());
            Box::pin(async move {
                self.post_results
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or(Err(status_error()))
            })
        }

        fn request_signed_upload(
            &self,
            _request: &SignedUploadRequest,
        ) -> BoxFuture<'_, Result<SignedUploadResponse, BackendError>> {
            Box::pin(async { Ok(SignedUploadResponse::default()) })
        }

        fn post_multipart(
            &self,
            _url: &str,
            _fields: Vec<(String, String)>,
            _file_name: String,
            _content_type: String,
            _body: Vec<u8>,
            _progress: MultipartProgress,
        ) -> BoxFuture<'_, Result<u16, BackendError>> {
            Box::pin(async { Ok(200) })
        }
    }

    struct Harness {
        engine: SessionEngine,
        backend: Arc<ScriptedBackend>,
        store: Arc<MemorySessionStore>,
        _dir: TempDir,
        dir_path: std::path::PathBuf,
    }

    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(ScriptedBackend::default());
        let store = Arc::new(MemorySessionStore::new());
        let engine = SessionEngine::new(
            Arc::clone(&store) as Arc<dyn SessionStore>,
            Arc::clone(&backend) as Arc<dyn UploadBackend>,
            &UploaderConfig::default(),
        );
        let dir_path = dir.path().to_path_buf();
        Harness {
            engine,
            backend,
            store,
            _dir: dir,
            dir_path,
        }
    }

    fn write_file(dir: &Path, name: &str, size: u64) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        let block = vec![0xABu8; 64 * 1024];
        let mut remaining = size;
        while remaining > 0 {
            let n = remaining.min(block.len() as u64) as usize;
            f.write_all(&block[..n]).unwrap();
            remaining -= n as u64;
        }
        path
    }

    fn no_progress() -> Box<ChunkProgressFn> {
        Box::new(|_, _| {})
    }

    #[tokio::test]
    async fn completes_all_chunks_and_deletes_session() {
        let h = harness();
        let path = write_file(&h.dir_path, "doc.pdf", 10);
        h.backend.queue_post_ok(3);

        let session = UploadSession::new(path, "doc.pdf", "application/pdf", 10, 4);
        let id = session.id;
        let outcome = h
            .engine
            .run(session, &UploadControls::new(), &no_progress())
            .await
            .unwrap();

        assert_eq!(outcome.status, SessionStatus::Completed);
        assert_eq!(outcome.uploaded_bytes, 10);
        assert!(!outcome.can_resume);
        // Completed sessions leave no durable record behind.
        assert!(h.store.load(&id).unwrap().is_none());
        assert_eq!(h.backend.post_calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn zero_length_file_completes_without_transport() {
        let h = harness();
        let path = write_file(&h.dir_path, "empty.pdf", 0);

        let session = UploadSession::new(path, "empty.pdf", "application/pdf", 0, 4);
        let outcome = h
            .engine
            .run(session, &UploadControls::new(), &no_progress())
            .await
            .unwrap();

        assert_eq!(outcome.status, SessionStatus::Completed);
        assert!(h.backend.post_calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_mid_transfer_failure_pauses_with_progress() {
        // 12 MiB file, 1 MiB chunks; chunks 0-4 succeed, chunk 5 fails.
        let h = harness();
        let path = write_file(&h.dir_path, "big.pdf", 12 * MIB);
        h.backend.queue_post_ok(5);

        let session = UploadSession::new(path, "big.pdf", "application/pdf", 12 * MIB, MIB);
        assert_eq!(session.total_chunks(), 12);
        let id = session.id;

        let outcome = h
            .engine
            .run(session, &UploadControls::new(), &no_progress())
            .await
            .unwrap();

        assert_eq!(outcome.status, SessionStatus::Paused);
        assert_eq!(outcome.uploaded_bytes, 5 * MIB);
        assert!(outcome.can_resume);
        assert!(outcome.error.is_some());

        let persisted = h.store.load(&id).unwrap().unwrap();
        assert_eq!(persisted.status, SessionStatus::Paused);
        assert_eq!(persisted.uploaded_bytes, 5 * MIB);
        assert_eq!(persisted.pending_chunk_indices().len(), 7);
        // 5 acknowledged chunks + 3 attempts on the failing one.
        assert_eq!(h.backend.post_calls.lock().unwrap().len(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn first_chunk_failure_is_fatal() {
        let h = harness();
        let path = write_file(&h.dir_path, "doc.pdf", 10);
        // Nothing queued: the first chunk fails every attempt.

        let session = UploadSession::new(path, "doc.pdf", "application/pdf", 10, 4);
        let outcome = h
            .engine
            .run(session, &UploadControls::new(), &no_progress())
            .await
            .unwrap();

        assert_eq!(outcome.status, SessionStatus::Failed);
        assert_eq!(outcome.uploaded_bytes, 0);
        assert!(!outcome.can_resume);
    }

    #[tokio::test]
    async fn resume_transports_only_pending_chunks() {
        let h = harness();
        let path = write_file(&h.dir_path, "doc.pdf", 10);
        h.backend.queue_post_ok(1);

        let mut session = UploadSession::new(path, "doc.pdf", "application/pdf", 10, 4);
        session.mark_chunk_uploaded(0, "cs0".into());
        session.mark_chunk_uploaded(1, "cs1".into());

        let outcome = h
            .engine
            .run(session, &UploadControls::new(), &no_progress())
            .await
            .unwrap();

        assert_eq!(outcome.status, SessionStatus::Completed);
        let posts = h.backend.post_calls.lock().unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].chunk_index, 2);
    }

    #[tokio::test]
    async fn progress_is_monotonic() {
        let h = harness();
        let path = write_file(&h.dir_path, "doc.pdf", 10);
        h.backend.queue_post_ok(3);

        let session = UploadSession::new(path, "doc.pdf", "application/pdf", 10, 4);
        let seen = Arc::new(Mutex::new(Vec::<u64>::new()));
        let seen_cb = Arc::clone(&seen);

        h.engine
            .run(
                session,
                &UploadControls::new(),
                &move |bytes, _| seen_cb.lock().unwrap().push(bytes),
            )
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![4, 8, 10]);
    }

    #[tokio::test]
    async fn pause_takes_effect_at_chunk_boundary() {
        let h = harness();
        let path = write_file(&h.dir_path, "doc.pdf", 10);
        h.backend.queue_post_ok(3);

        let session = UploadSession::new(path, "doc.pdf", "application/pdf", 10, 4);
        let id = session.id;
        let controls = UploadControls::new();

        // Request pause from the first progress callback: the in-flight
        // chunk finishes, the next never starts.
        let pause_from = controls.clone();
        let outcome = h
            .engine
            .run(session, &controls, &move |_, _| pause_from.pause())
            .await
            .unwrap();

        assert_eq!(outcome.status, SessionStatus::Paused);
        assert_eq!(outcome.uploaded_bytes, 4);
        assert!(outcome.can_resume);
        assert_eq!(h.backend.post_calls.lock().unwrap().len(), 1);

        let persisted = h.store.load(&id).unwrap().unwrap();
        assert_eq!(persisted.pending_chunk_indices(), vec![1, 2]);
    }

    #[tokio::test]
    async fn cancel_deletes_session() {
        let h = harness();
        let path = write_file(&h.dir_path, "doc.pdf", 10);

        let session = UploadSession::new(path, "doc.pdf", "application/pdf", 10, 4);
        let id = session.id;
        h.store.save(&session).unwrap();

        let controls = UploadControls::new();
        controls.cancel();

        let result = h.engine.run(session, &controls, &no_progress()).await;
        assert!(matches!(result, Err(EngineError::Cancelled)));
        assert!(h.store.load(&id).unwrap().is_none());
        assert!(h.backend.post_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn mediated_handoff_switches_to_direct_writes() {
        let h = harness();
        let path = write_file(&h.dir_path, "doc.pdf", 10);
        // First chunk returns a signed URL; the rest must go direct.
        h.backend
            .post_results
            .lock()
            .unwrap()
            .push_back(Ok(ChunkUploadResponse {
                upload_job_id: Some("job-9".into()),
                signed_url: Some("https://bucket/handoff".into()),
            }));
        {
            let mut puts = h.backend.put_results.lock().unwrap();
            puts.push_back(Ok(()));
            puts.push_back(Ok(()));
        }

        let session = UploadSession::new(path, "doc.pdf", "application/pdf", 10, 4);
        let outcome = h
            .engine
            .run(session, &UploadControls::new(), &no_progress())
            .await
            .unwrap();

        assert_eq!(outcome.status, SessionStatus::Completed);
        assert_eq!(outcome.remote_job_id.as_deref(), Some("job-9"));
        assert_eq!(h.backend.post_calls.lock().unwrap().len(), 1);
        let puts = h.backend.put_calls.lock().unwrap();
        assert_eq!(*puts, vec![(4, 8), (8, 10)]);
    }

    #[tokio::test]
    async fn missing_source_is_explicit_error() {
        let h = harness();
        let session = UploadSession::new(
            h.dir_path.join("gone.pdf"),
            "gone.pdf",
            "application/pdf",
            10,
            4,
        );

        let result = h
            .engine
            .run(session, &UploadControls::new(), &no_progress())
            .await;
        assert!(matches!(result, Err(EngineError::SourceMissing(_))));
    }

    #[tokio::test]
    async fn changed_source_is_explicit_error() {
        let h = harness();
        let path = write_file(&h.dir_path, "doc.pdf", 6);

        // Session claims 10 bytes, disk has 6.
        let session = UploadSession::new(path, "doc.pdf", "application/pdf", 10, 4);
        let result = h
            .engine
            .run(session, &UploadControls::new(), &no_progress())
            .await;
        assert!(matches!(
            result,
            Err(EngineError::SourceChanged {
                expected: 10,
                actual: 6
            })
        ));
    }

    #[tokio::test]
    async fn unsupported_mime_is_explicit_error() {
        let h = harness();
        let path = write_file(&h.dir_path, "doc.gif", 10);
        let session = UploadSession::new(path, "doc.gif", "image/gif", 10, 4);

        let result = h
            .engine
            .run(session, &UploadControls::new(), &no_progress())
            .await;
        assert!(matches!(result, Err(EngineError::UnsupportedMime(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn retried_chunk_does_not_double_count() {
        let h = harness();
        let path = write_file(&h.dir_path, "doc.pdf", 10);
        {
            let mut results = h.backend.post_results.lock().unwrap();
            results.push_back(Ok(ChunkUploadResponse::default()));
            // Chunk 1 fails twice, then succeeds.
            results.push_back(Err(status_error()));
            results.push_back(Err(status_error()));
            results.push_back(Ok(ChunkUploadResponse::default()));
            results.push_back(Ok(ChunkUploadResponse::default()));
        }

        let session = UploadSession::new(path, "doc.pdf", "application/pdf", 10, 4);
        let outcome = h
            .engine
            .run(session, &UploadControls::new(), &no_progress())
            .await
            .unwrap();

        assert_eq!(outcome.status, SessionStatus::Completed);
        assert_eq!(outcome.uploaded_bytes, 10);
    }
}
