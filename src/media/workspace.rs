//! Per-chat scratch directories.
//!
//! Each chat gets `<downloads root>/<chat id>`. Holding a [`ChatWorkspace`]
//! means holding the chat's lock, so downloads for one chat never overlap.
//! Dropping the guard empties the directory.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

type ChatLocks = HashMap<i64, Arc<AsyncMutex<()>>>;

/// Hands out per-chat workspaces under one root directory
#[derive(Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
    locks: Arc<Mutex<ChatLocks>>,
}

impl WorkspaceManager {
    /// Create a manager rooted at `root`. Nothing is created on disk yet.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Downloads root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory used for `chat_id`
    #[must_use]
    pub fn chat_dir(&self, chat_id: i64) -> PathBuf {
        self.root.join(chat_id.to_string())
    }

    /// Wait for the chat's lock, then make sure its directory exists and is empty.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be created.
    pub async fn acquire(&self, chat_id: i64) -> io::Result<ChatWorkspace> {
        let lock = self.chat_lock(chat_id);
        let guard = lock.lock_owned().await;

        let dir = self.chat_dir(chat_id);
        tokio::fs::create_dir_all(&dir).await?;

        // Leftovers from an interrupted run
        let stale = {
            let dir = dir.clone();
            tokio::task::spawn_blocking(move || empty_dir(&dir))
                .await
                .map_err(io::Error::other)??
        };
        if stale > 0 {
            debug!(chat_id, removed = stale, "Removed stale workspace entries");
        }

        Ok(ChatWorkspace {
            chat_id,
            dir,
            _guard: guard,
        })
    }

    fn chat_lock(&self, chat_id: i64) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the table itself references idle locks
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(chat_id).or_default())
    }

    #[cfg(test)]
    fn tracked_chats(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Exclusive access to one chat's workspace directory
pub struct ChatWorkspace {
    chat_id: i64,
    dir: PathBuf,
    _guard: OwnedMutexGuard<()>,
}

impl ChatWorkspace {
    /// Workspace directory
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Owning chat
    #[must_use]
    pub const fn chat_id(&self) -> i64 {
        self.chat_id
    }

    /// Path of `file_name` inside the workspace
    #[must_use]
    pub fn file(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }
}

impl Drop for ChatWorkspace {
    fn drop(&mut self) {
        match empty_dir(&self.dir) {
            Ok(removed) => debug!(chat_id = self.chat_id, removed, "Workspace cleaned"),
            Err(e) => warn!(
                chat_id = self.chat_id,
                error = %e,
                path = %self.dir.display(),
                "Failed to clean workspace"
            ),
        }
    }
}

/// Remove everything inside `dir`, keeping `dir` itself.
///
/// Keeps going past entries that cannot be removed and reports the first
/// failure at the end. A missing directory counts as empty.
///
/// # Errors
///
/// Returns the first I/O error encountered.
pub fn empty_dir(dir: &Path) -> io::Result<usize> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut removed = 0;
    let mut first_error = None;
    for entry in entries {
        let result = entry.and_then(|entry| {
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            }
        });
        match result {
            Ok(()) => removed += 1,
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    first_error.map_or(Ok(removed), Err)
}
