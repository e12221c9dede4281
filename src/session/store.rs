//! Session record storage.
//!
//! The store is the only place that knows whether a kernel is running.
//! Every [`SessionStore::load`] re-validates the record and deletes it when
//! the kernel died without cleaning up, so callers never see a stale
//! session.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::SessionRecord;
use crate::error::QkernelError;
use crate::Result;

/// File name of the persisted record inside the state directory.
pub const STATE_FILE_NAME: &str = "state.json";

/// Storage for the single session record.
pub trait SessionStore: Send + Sync {
    /// Read and validate the record.
    ///
    /// Absent, malformed and stale records all yield `None`; the latter two
    /// are deleted as a side effect.
    fn load(&self) -> Result<Option<SessionRecord>>;

    /// Replace the record. Readers never observe a partial write.
    fn save(&self, record: &SessionRecord) -> Result<()>;

    /// Delete the record. Idempotent.
    fn clear(&self) -> Result<()>;
}

impl<S: SessionStore + ?Sized> SessionStore for std::sync::Arc<S> {
    fn load(&self) -> Result<Option<SessionRecord>> {
        (**self).load()
    }

    fn save(&self, record: &SessionRecord) -> Result<()> {
        (**self).save(record)
    }

    fn clear(&self) -> Result<()> {
        (**self).clear()
    }
}

/// Validate a freshly read record, clearing the store if it went stale.
fn validated<S: SessionStore + ?Sized>(
    store: &S,
    record: SessionRecord,
) -> Result<Option<SessionRecord>> {
    match record.staleness() {
        None => Ok(Some(record)),
        Some(reason) => {
            info!(pid = record.pid, %reason, "discarding stale session record");
            store.clear()?;
            Ok(None)
        }
    }
}

/// Session store backed by a JSON file.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    /// Create a store keeping its record in `state_dir/state.json`.
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            path: state_dir.as_ref().join(STATE_FILE_NAME),
        }
    }

    /// Path of the record file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<SessionRecord>> {
        let content = match fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        // Invalid UTF-8 surfaces here as a JSON error too.
        let record: SessionRecord = match serde_json::from_slice(&content) {
            Ok(record) => record,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "removing malformed session record");
                self.clear()?;
                return Ok(None);
            }
        };

        validated(self, record)
    }

    fn save(&self, record: &SessionRecord) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;

        // Write beside the target and rename over it.
        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer(&mut tmp, record)?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| QkernelError::Io(e.error))?;

        debug!(path = %self.path.display(), pid = record.pid, "session record saved");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory session store, for tests and embedding.
///
/// Applies the same liveness validation as [`FileSessionStore`].
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    record: RwLock<Option<SessionRecord>>,
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the stored record without validating it.
    pub fn peek(&self) -> Result<Option<SessionRecord>> {
        let record = self.record.read().map_err(|_| QkernelError::LockPoisoned)?;
        Ok(record.clone())
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<SessionRecord>> {
        match self.peek()? {
            Some(record) => validated(self, record),
            None => Ok(None),
        }
    }

    fn save(&self, record: &SessionRecord) -> Result<()> {
        let mut slot = self.record.write().map_err(|_| QkernelError::LockPoisoned)?;
        *slot = Some(record.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut slot = self.record.write().map_err(|_| QkernelError::LockPoisoned)?;
        *slot = None;
        Ok(())
    }
}
