use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::warn;
use uuid::Uuid;

use crate::{SessionStatus, StoreError, UploadSession};

/// Durable persistence of upload sessions, keyed by session id.
///
/// `save` must be atomic from the caller's perspective: after a crash the
/// old record or the new record is visible, never a torn write.
pub trait SessionStore: Send + Sync {
    fn save(&self, session: &UploadSession) -> Result<(), StoreError>;
    fn load(&self, id: &Uuid) -> Result<Option<UploadSession>, StoreError>;
    fn delete(&self, id: &Uuid) -> Result<(), StoreError>;

    /// All persisted sessions except completed ones, most recently updated
    /// first. This doubles as the app-restart recovery index.
    fn list_incomplete(&self) -> Result<Vec<UploadSession>, StoreError>;
}

// ---------------------------------------------------------------------------
// FsSessionStore
// ---------------------------------------------------------------------------

/// Filesystem-backed store: one JSON file per session under a base
/// directory.
pub struct FsSessionStore {
    dir: PathBuf,
}

impl FsSessionStore {
    /// Creates a store rooted at `dir`, creating the directory if needed.
    pub fn new(dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn session_path(&self, id: &Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

impl SessionStore for FsSessionStore {
    fn save(&self, session: &UploadSession) -> Result<(), StoreError> {
        let target = self.session_path(&session.id);
        // Write to a temp file in the same directory, then rename over the
        // target. Rename within one filesystem is atomic, so a crash leaves
        // either the old record or the new one.
        let tmp = self.dir.join(format!(".{}.json.tmp", session.id));
        let json = serde_json::to_vec_pretty(session)?;
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, &target)?;
        Ok(())
    }

    fn load(&self, id: &Uuid) -> Result<Option<UploadSession>, StoreError> {
        let path = self.session_path(id);
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&data)?))
    }

    fn delete(&self, id: &Uuid) -> Result<(), StoreError> {
        match std::fs::remove_file(self.session_path(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list_incomplete(&self) -> Result<Vec<UploadSession>, StoreError> {
        let mut sessions = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let data = std::fs::read(&path)?;
            match serde_json::from_slice::<UploadSession>(&data) {
                Ok(session) => {
                    if session.status != SessionStatus::Completed {
                        sessions.push(session);
                    }
                }
                Err(e) => {
                    // A record from an older build or a partial manual edit.
                    // Skip it rather than poison the whole listing.
                    warn!(path = %path.display(), error = %e, "skipping unreadable session record");
                }
            }
        }
        sessions.sort_by(|a, b| b.last_updated_at.cmp(&a.last_updated_at));
        Ok(sessions)
    }
}

// ---------------------------------------------------------------------------
// MemorySessionStore
// ---------------------------------------------------------------------------

/// In-memory store for tests and ephemeral callers.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<Uuid, UploadSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn save(&self, session: &UploadSession) -> Result<(), StoreError> {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id, session.clone());
        Ok(())
    }

    fn load(&self, id: &Uuid) -> Result<Option<UploadSession>, StoreError> {
        Ok(self.sessions.lock().unwrap().get(id).cloned())
    }

    fn delete(&self, id: &Uuid) -> Result<(), StoreError> {
        self.sessions.lock().unwrap().remove(id);
        Ok(())
    }

    fn list_incomplete(&self) -> Result<Vec<UploadSession>, StoreError> {
        let mut sessions: Vec<UploadSession> = self
            .sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.status != SessionStatus::Completed)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.last_updated_at.cmp(&a.last_updated_at));
        Ok(sessions)
    }
}
