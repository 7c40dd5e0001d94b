use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;

/// Shared pause/cancel signals for an upload run.
///
/// Pause is cooperative: the engine checks the flag only at chunk and file
/// boundaries, so an in-flight chunk always finishes (or fails) before the
/// pause takes effect. Cancel is immediate at the next await point and does
/// not wait for in-flight work.
#[derive(Clone, Default)]
pub struct UploadControls {
    paused: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl UploadControls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn unpause(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token for select-style cancellation of in-flight awaits.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
