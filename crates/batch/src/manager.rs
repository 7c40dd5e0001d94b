use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use docuferry_engine::{
    EngineError, MultipartProgress, SessionEngine, SimpleTransport, UploadBackend,
    UploadControls, UploaderConfig,
};
use docuferry_store::{SessionStatus, SessionStore};

use crate::{
    BatchError, BatchStatus, BatchUploadProgress, BatchUploadResult, ConnectivityObserver,
    FailedFile, FileProgress, FileUploadItem, ItemStatus, NewUploadFile,
};

/// Handle returned by `subscribe*`; pass it back to the matching
/// `unsubscribe*` to stop receiving events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type BatchProgressFn = Box<dyn Fn(BatchUploadProgress) + Send + Sync>;
type FileProgressFn = Box<dyn Fn(FileProgress) + Send + Sync>;

/// Orchestrates an ordered queue of file uploads.
///
/// One file at a time, in queue order: files at or above the chunking
/// threshold go through the resumable session engine, smaller files through
/// the single-request simple transport. Progress from either path is
/// aggregated into a [`BatchUploadProgress`] stream. A connectivity
/// observer can auto-pause and auto-resume the whole batch.
///
/// Construct one per application context and inject every dependency; the
/// connectivity subscription runs between [`bind_connectivity`]
/// (Self::bind_connectivity) and [`shutdown`](Self::shutdown).
#[derive(Clone)]
pub struct BatchUploadManager {
    inner: Arc<Inner>,
}

struct Inner {
    items: Mutex<Vec<FileUploadItem>>,
    status: Mutex<BatchStatus>,
    current: Mutex<Option<Uuid>>,
    controls: Mutex<UploadControls>,
    running: AtomicBool,
    subscribers: Mutex<HashMap<u64, BatchProgressFn>>,
    file_subscribers: Mutex<HashMap<u64, FileProgressFn>>,
    next_subscription: AtomicU64,
    watcher: Mutex<Option<JoinHandle<()>>>,
    engine: SessionEngine,
    simple: SimpleTransport,
    store: Arc<dyn SessionStore>,
    connectivity: Arc<dyn ConnectivityObserver>,
    config: UploaderConfig,
}

/// Clears the running flag when a queue run exits by any path.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl BatchUploadManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        backend: Arc<dyn UploadBackend>,
        connectivity: Arc<dyn ConnectivityObserver>,
        config: UploaderConfig,
    ) -> Self {
        let engine = SessionEngine::new(Arc::clone(&store), Arc::clone(&backend), &config);
        let simple = SimpleTransport::new(backend);
        Self {
            inner: Arc::new(Inner {
                items: Mutex::new(Vec::new()),
                status: Mutex::new(BatchStatus::Idle),
                current: Mutex::new(None),
                controls: Mutex::new(UploadControls::new()),
                running: AtomicBool::new(false),
                subscribers: Mutex::new(HashMap::new()),
                file_subscribers: Mutex::new(HashMap::new()),
                next_subscription: AtomicU64::new(1),
                watcher: Mutex::new(None),
                engine,
                simple,
                store,
                connectivity,
                config,
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Queue management
    // -----------------------------------------------------------------------

    /// Appends files to the queue and returns the created items.
    pub fn add_files(&self, files: Vec<NewUploadFile>) -> Vec<FileUploadItem> {
        let created: Vec<FileUploadItem> =
            files.into_iter().map(FileUploadItem::new).collect();
        self.inner.items.lock().unwrap().extend(created.clone());
        debug!(added = created.len(), "files queued");
        self.notify_batch();
        created
    }

    /// Removes one file from the queue. Refused while that file uploads.
    pub fn remove_file(&self, id: &Uuid) -> Result<(), BatchError> {
        let session_id = {
            let mut items = self.inner.items.lock().unwrap();
            let Some(position) = items.iter().position(|item| item.id == *id) else {
                return Err(BatchError::FileNotFound(*id));
            };
            if items[position].status == ItemStatus::Uploading {
                return Err(BatchError::FileUploading(*id));
            }
            items.remove(position).session_id
        };
        if let Some(session_id) = session_id {
            self.delete_session_best_effort(&session_id);
        }
        self.notify_batch();
        Ok(())
    }

    /// Empties the queue. Refused while a run is active.
    pub fn clear(&self) -> Result<(), BatchError> {
        if self.inner.running.load(Ordering::SeqCst) {
            return Err(BatchError::AlreadyRunning);
        }
        let drained: Vec<FileUploadItem> =
            self.inner.items.lock().unwrap().drain(..).collect();
        for item in &drained {
            if let Some(session_id) = item.session_id {
                self.delete_session_best_effort(&session_id);
            }
        }
        *self.inner.status.lock().unwrap() = BatchStatus::Idle;
        self.notify_batch();
        Ok(())
    }

    /// Re-queues incomplete sessions persisted by a previous process run.
    ///
    /// Each recovered item arrives `Paused` with its session attached, so a
    /// batch-level `resume()` continues where the old process stopped.
    pub fn recover_sessions(&self) -> Result<Vec<FileUploadItem>, BatchError> {
        let sessions = self.inner.store.list_incomplete()?;
        let mut recovered = Vec::with_capacity(sessions.len());
        {
            let mut items = self.inner.items.lock().unwrap();
            for session in sessions {
                if items.iter().any(|i| i.session_id == Some(session.id)) {
                    continue;
                }
                let percent = if session.file_size == 0 {
                    0.0
                } else {
                    session.uploaded_bytes as f64 / session.file_size as f64 * 100.0
                };
                let item = FileUploadItem {
                    id: Uuid::new_v4(),
                    file_path: session.file_path.clone(),
                    file_name: session.file_name.clone(),
                    mime_type: session.mime_type.clone(),
                    file_size: session.file_size,
                    document_type: "document".to_string(),
                    status: ItemStatus::Paused,
                    progress_percent: percent,
                    uploaded_bytes: session.uploaded_bytes,
                    error: session.last_error.clone(),
                    session_id: Some(session.id),
                    remote_job_id: session.remote_job_id.clone(),
                };
                recovered.push(item.clone());
                items.push(item);
            }
        }
        if !recovered.is_empty() {
            info!(count = recovered.len(), "recovered resumable sessions");
            let mut status = self.inner.status.lock().unwrap();
            if *status == BatchStatus::Idle {
                *status = BatchStatus::Paused;
            }
            drop(status);
            self.notify_batch();
        }
        Ok(recovered)
    }

    // -----------------------------------------------------------------------
    // Run control
    // -----------------------------------------------------------------------

    /// Uploads all pending files in queue order.
    pub async fn start(&self) -> Result<BatchUploadResult, BatchError> {
        self.run_queue().await
    }

    /// Requests a pause. Cooperative: the in-flight chunk or file request
    /// finishes first; nothing is abandoned mid-transport.
    pub fn pause(&self) {
        self.inner.controls.lock().unwrap().pause();
        let mut status = self.inner.status.lock().unwrap();
        if *status == BatchStatus::Uploading {
            *status = BatchStatus::Paused;
        }
        drop(status);
        info!("batch pause requested");
        self.notify_batch();
    }

    /// Resumes paused files (and any still pending).
    pub async fn resume(&self) -> Result<BatchUploadResult, BatchError> {
        if self.inner.running.load(Ordering::SeqCst) {
            return Err(BatchError::AlreadyRunning);
        }
        let reactivated = self.reactivate(|status| status == ItemStatus::Paused);
        if reactivated == 0 {
            return Err(BatchError::NothingPaused);
        }
        self.run_queue().await
    }

    /// Retries failed files along with anything paused or pending.
    pub async fn retry(&self) -> Result<BatchUploadResult, BatchError> {
        if self.inner.running.load(Ordering::SeqCst) {
            return Err(BatchError::AlreadyRunning);
        }
        let reactivated = self
            .reactivate(|status| matches!(status, ItemStatus::Paused | ItemStatus::Failed));
        if reactivated == 0 {
            return Err(BatchError::NothingToRetry);
        }
        self.run_queue().await
    }

    /// Cancels immediately: aborts any in-flight transport, discards the
    /// queue and best-effort deletes persisted sessions. Bytes already
    /// delivered to storage are not undone.
    pub fn cancel(&self) {
        self.inner.controls.lock().unwrap().cancel();
        let drained: Vec<FileUploadItem> =
            self.inner.items.lock().unwrap().drain(..).collect();
        for item in &drained {
            if let Some(session_id) = item.session_id {
                self.delete_session_best_effort(&session_id);
            }
        }
        *self.inner.current.lock().unwrap() = None;
        *self.inner.status.lock().unwrap() = BatchStatus::Idle;
        info!(discarded = drained.len(), "batch cancelled");
        self.notify_batch();
    }

    // -----------------------------------------------------------------------
    // Progress
    // -----------------------------------------------------------------------

    /// Snapshot of the current queue.
    pub fn items(&self) -> Vec<FileUploadItem> {
        self.inner.items.lock().unwrap().clone()
    }

    /// Current aggregate progress, computed on demand.
    pub fn progress(&self) -> BatchUploadProgress {
        let items = self.inner.items.lock().unwrap();
        let total_bytes: u64 = items.iter().map(|i| i.file_size).sum();
        let uploaded_bytes: u64 = items.iter().map(|i| i.uploaded_bytes).sum();
        let completed_files = items
            .iter()
            .filter(|i| i.status == ItemStatus::Completed)
            .count();
        let current = *self.inner.current.lock().unwrap();
        let current_file_index =
            current.and_then(|id| items.iter().position(|i| i.id == id));
        let resumable = items.iter().any(|i| i.status == ItemStatus::Paused);
        let overall_percent = if total_bytes == 0 {
            0.0
        } else {
            uploaded_bytes as f64 / total_bytes as f64 * 100.0
        };
        BatchUploadProgress {
            total_files: items.len(),
            completed_files,
            current_file_index,
            total_bytes,
            uploaded_bytes,
            overall_percent,
            status: *self.inner.status.lock().unwrap(),
            network_available: self.inner.connectivity.is_available(),
            resumable,
        }
    }

    /// Subscribes to aggregate progress. Returns the id to unsubscribe with.
    pub fn subscribe(
        &self,
        callback: impl Fn(BatchUploadProgress) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.inner.next_subscription.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .lock()
            .unwrap()
            .insert(id, Box::new(callback));
        SubscriptionId(id)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.subscribers.lock().unwrap().remove(&id.0);
    }

    /// Subscribes to per-file progress events.
    pub fn subscribe_file_progress(
        &self,
        callback: impl Fn(FileProgress) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.inner.next_subscription.fetch_add(1, Ordering::Relaxed);
        self.inner
            .file_subscribers
            .lock()
            .unwrap()
            .insert(id, Box::new(callback));
        SubscriptionId(id)
    }

    pub fn unsubscribe_file_progress(&self, id: SubscriptionId) {
        self.inner.file_subscribers.lock().unwrap().remove(&id.0);
    }

    // -----------------------------------------------------------------------
    // Connectivity reactivity
    // -----------------------------------------------------------------------

    /// Starts reacting to connectivity changes: offline while uploading
    /// pauses the batch, back online while paused resumes it. Call once
    /// from the owning context; [`shutdown`](Self::shutdown) stops it.
    pub fn bind_connectivity(&self) {
        let mut rx = self.inner.connectivity.watch();
        let manager = self.clone();
        let handle = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let available = *rx.borrow();
                let status = *manager.inner.status.lock().unwrap();
                if available {
                    if status == BatchStatus::Paused {
                        info!("network restored, auto-resuming batch");
                        let resumer = manager.clone();
                        tokio::spawn(async move {
                            if let Err(e) = resumer.resume().await {
                                debug!(error = %e, "auto-resume skipped");
                            }
                        });
                    }
                } else if status == BatchStatus::Uploading {
                    info!("network lost, auto-pausing batch");
                    manager.pause();
                }
            }
        });
        let mut watcher = self.inner.watcher.lock().unwrap();
        if let Some(old) = watcher.replace(handle) {
            old.abort();
        }
    }

    /// Stops the connectivity subscription.
    pub fn shutdown(&self) {
        if let Some(handle) = self.inner.watcher.lock().unwrap().take() {
            handle.abort();
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn run_queue(&self) -> Result<BatchUploadResult, BatchError> {
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(BatchError::AlreadyRunning);
        }
        let _guard = RunGuard(&self.inner.running);

        let controls = UploadControls::new();
        *self.inner.controls.lock().unwrap() = controls.clone();
        *self.inner.status.lock().unwrap() = BatchStatus::Uploading;
        self.notify_batch();

        let ids: Vec<Uuid> = {
            let items = self.inner.items.lock().unwrap();
            items.iter().map(|i| i.id).collect()
        };

        let mut result = BatchUploadResult::default();
        let mut cancelled = false;

        for id in ids {
            let Some(item) = self.item_snapshot(&id) else {
                continue; // Removed from the queue meanwhile.
            };
            if item.status != ItemStatus::Pending {
                continue;
            }

            if controls.is_cancelled() {
                cancelled = true;
                break;
            }
            // A dead network is not an error: park here and let the
            // connectivity watcher (or the caller) resume later.
            if !self.inner.connectivity.is_available() {
                debug!(file = %item.file_name, "network unavailable, pausing batch");
                self.set_item_status(&id, ItemStatus::Paused, None);
                result.resumable = true;
                break;
            }
            if controls.is_paused() {
                self.set_item_status(&id, ItemStatus::Paused, None);
                result.resumable = true;
                break;
            }

            self.set_item_status(&id, ItemStatus::Uploading, None);
            *self.inner.current.lock().unwrap() = Some(id);
            self.notify_batch();

            let chunked = item.file_size >= self.inner.config.chunk_threshold;
            let outcome = if chunked {
                self.run_chunked(&id, &item, &controls).await
            } else {
                self.run_simple(&id, &item, &controls).await
            };

            match outcome {
                ItemOutcome::Completed => result.completed.push(id),
                ItemOutcome::Fatal(error) => {
                    result.failed.push(FailedFile {
                        id,
                        file_name: item.file_name.clone(),
                        error,
                        can_resume: false,
                    });
                    // Fatal and non-resumable: the rest of the queue still
                    // deserves its turn.
                }
                ItemOutcome::Resumable(error) => {
                    if let Some(error) = error {
                        result.failed.push(FailedFile {
                            id,
                            file_name: item.file_name.clone(),
                            error,
                            can_resume: true,
                        });
                    }
                    result.resumable = true;
                    break;
                }
                ItemOutcome::Cancelled => {
                    cancelled = true;
                    break;
                }
            }
        }

        *self.inner.current.lock().unwrap() = None;

        if !cancelled {
            let final_status = self.conclude();
            debug!(status = ?final_status, "batch run finished");
        }
        self.notify_batch();
        Ok(result)
    }

    async fn run_chunked(
        &self,
        id: &Uuid,
        item: &FileUploadItem,
        controls: &UploadControls,
    ) -> ItemOutcome {
        let session = match item.session_id {
            Some(session_id) => match self.inner.engine.load_session(&session_id) {
                Ok(Some(session)) => session,
                Ok(None) => self.fresh_session(item),
                Err(e) => {
                    warn!(file = %item.file_name, error = %e, "failed to load session");
                    self.fresh_session(item)
                }
            },
            None => self.fresh_session(item),
        };

        self.update_item(id, |i| {
            i.session_id = Some(session.id);
            i.uploaded_bytes = session.uploaded_bytes;
        });

        let progress_manager = self.clone();
        let progress_id = *id;
        let on_progress = move |uploaded_bytes: u64, _chunk_index: u32| {
            progress_manager.update_item(&progress_id, |i| i.uploaded_bytes = uploaded_bytes);
            progress_manager.notify_batch();
        };

        match self.inner.engine.run(session, controls, &on_progress).await {
            Ok(outcome) => match outcome.status {
                SessionStatus::Completed => {
                    self.complete_item(id, outcome.remote_job_id);
                    ItemOutcome::Completed
                }
                SessionStatus::Failed => {
                    let error = outcome
                        .error
                        .unwrap_or_else(|| "upload failed".to_string());
                    self.set_item_status(id, ItemStatus::Failed, Some(error.clone()));
                    ItemOutcome::Fatal(error)
                }
                // Paused covers both a cooperative pause and a recoverable
                // mid-transfer failure; the error tells them apart.
                _ => {
                    self.set_item_status(id, ItemStatus::Paused, outcome.error.clone());
                    ItemOutcome::Resumable(outcome.error)
                }
            },
            Err(EngineError::Cancelled) => ItemOutcome::Cancelled,
            Err(e) => {
                let error = e.to_string();
                self.set_item_status(id, ItemStatus::Failed, Some(error.clone()));
                ItemOutcome::Fatal(error)
            }
        }
    }

    async fn run_simple(
        &self,
        id: &Uuid,
        item: &FileUploadItem,
        controls: &UploadControls,
    ) -> ItemOutcome {
        // Zero-length files are trivially complete.
        if item.file_size == 0 {
            self.complete_item(id, None);
            return ItemOutcome::Completed;
        }

        let progress_manager = self.clone();
        let progress_id = *id;
        let on_progress: MultipartProgress = Arc::new(move |sent, _total| {
            progress_manager.update_item(&progress_id, |i| i.uploaded_bytes = sent);
            progress_manager.notify_batch();
        });

        let upload = self.inner.simple.upload(
            &item.file_path,
            &item.file_name,
            &item.mime_type,
            item.file_size,
            &item.document_type,
            on_progress,
        );

        let result = tokio::select! {
            result = upload => result,
            () = controls.cancel_token().cancelled_owned() => return ItemOutcome::Cancelled,
        };

        match result {
            Ok(outcome) => {
                self.complete_item(id, outcome.remote_job_id);
                ItemOutcome::Completed
            }
            Err(e) => {
                // The simple path keeps no session, so any failure restarts
                // from zero: always fatal, never resumable.
                let error = e.to_string();
                self.set_item_status(id, ItemStatus::Failed, Some(error.clone()));
                ItemOutcome::Fatal(error)
            }
        }
    }

    fn fresh_session(&self, item: &FileUploadItem) -> docuferry_store::UploadSession {
        self.inner.engine.create_session(
            item.file_path.clone(),
            item.file_name.clone(),
            item.mime_type.clone(),
            item.file_size,
        )
    }

    fn conclude(&self) -> BatchStatus {
        let items = self.inner.items.lock().unwrap();
        let any_paused = items.iter().any(|i| i.status == ItemStatus::Paused);
        let any_completed = items.iter().any(|i| i.status == ItemStatus::Completed);
        let any_failed = items.iter().any(|i| i.status == ItemStatus::Failed);
        let status = if items.is_empty() {
            BatchStatus::Idle
        } else if any_paused {
            BatchStatus::Paused
        } else if any_completed {
            // One success keeps the batch out of `Failed` even when other
            // files failed — per-file errors live in the result.
            BatchStatus::Completed
        } else if any_failed {
            BatchStatus::Failed
        } else {
            BatchStatus::Idle
        };
        drop(items);
        *self.inner.status.lock().unwrap() = status;
        status
    }

    fn reactivate(&self, eligible: impl Fn(ItemStatus) -> bool) -> usize {
        let mut items = self.inner.items.lock().unwrap();
        let mut count = 0;
        for item in items.iter_mut() {
            if eligible(item.status) {
                item.status = ItemStatus::Pending;
                item.error = None;
                count += 1;
            }
        }
        count
    }

    fn item_snapshot(&self, id: &Uuid) -> Option<FileUploadItem> {
        self.inner
            .items
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.id == *id)
            .cloned()
    }

    fn update_item(&self, id: &Uuid, mutate: impl FnOnce(&mut FileUploadItem)) {
        let mut notify: Option<FileProgress> = None;
        {
            let mut items = self.inner.items.lock().unwrap();
            if let Some(item) = items.iter_mut().find(|i| i.id == *id) {
                mutate(item);
                item.progress_percent = if item.file_size == 0 {
                    if item.status == ItemStatus::Completed { 100.0 } else { 0.0 }
                } else {
                    item.uploaded_bytes as f64 / item.file_size as f64 * 100.0
                };
                notify = Some(FileProgress {
                    id: item.id,
                    file_name: item.file_name.clone(),
                    status: item.status,
                    uploaded_bytes: item.uploaded_bytes,
                    total_bytes: item.file_size,
                    progress_percent: item.progress_percent,
                    error: item.error.clone(),
                });
            }
        }
        if let Some(progress) = notify {
            let subscribers = self.inner.file_subscribers.lock().unwrap();
            for callback in subscribers.values() {
                callback(progress.clone());
            }
        }
    }

    fn set_item_status(&self, id: &Uuid, status: ItemStatus, error: Option<String>) {
        self.update_item(id, |item| {
            item.status = status;
            item.error = error;
        });
    }

    fn complete_item(&self, id: &Uuid, remote_job_id: Option<String>) {
        self.update_item(id, |item| {
            item.status = ItemStatus::Completed;
            item.uploaded_bytes = item.file_size;
            item.remote_job_id = remote_job_id;
            item.error = None;
        });
        self.notify_batch();
    }

    fn delete_session_best_effort(&self, session_id: &Uuid) {
        if let Err(e) = self.inner.store.delete(session_id) {
            warn!(session = %session_id, error = %e, "failed to delete session");
        }
    }

    fn notify_batch(&self) {
        let progress = self.progress();
        let subscribers = self.inner.subscribers.lock().unwrap();
        for callback in subscribers.values() {
            callback(progress.clone());
        }
    }
}

enum ItemOutcome {
    Completed,
    /// Terminal failure with no resume path; the queue continues.
    Fatal(String),
    /// The run stops here; `resume()`/`retry()` re-enters at this file.
    /// Carries an error when a recoverable failure (rather than a pause
    /// request) stopped the file.
    Resumable(Option<String>),
    Cancelled,
}
