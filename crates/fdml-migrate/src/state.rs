//! Persisted migration state.
//!
//! The state file is a JSON document listing applied migrations in
//! application order. It is only written while holding an exclusive
//! advisory lock on `<state file>.lock`, and every write goes to a temporary
//! file in the same directory that is then renamed over the state file.

use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fdml_core::ContentHash;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::error::{MigrationError, Result};

/// One applied migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedMigration {
    pub id: String,
    pub applied_at: DateTime<Utc>,
    /// Hash of the document right after this migration was applied.
    pub document_hash: ContentHash,
    /// Hash of the migration definition at apply time.
    pub definition_hash: ContentHash,
    /// The batch that applied this migration.
    pub batch_id: Uuid,
}

/// Applied migrations in application order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationState {
    pub applied: Vec<AppliedMigration>,
}

impl MigrationState {
    pub fn is_applied(&self, id: &str) -> bool {
        self.applied.iter().any(|a| a.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&AppliedMigration> {
        self.applied.iter().find(|a| a.id == id)
    }

    pub fn last(&self) -> Option<&AppliedMigration> {
        self.applied.last()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.applied.iter().map(|a| a.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.applied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }

    pub(crate) fn push(&mut self, entry: AppliedMigration) {
        self.applied.push(entry);
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<AppliedMigration> {
        let pos = self.applied.iter().position(|a| a.id == id)?;
        Some(self.applied.remove(pos))
    }

    fn check(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for entry in &self.applied {
            if !seen.insert(entry.id.as_str()) {
                return Err(MigrationError::State {
                    detail: format!("migration '{}' is recorded as applied twice", entry.id),
                });
            }
        }
        Ok(())
    }
}

/// Handle to a state file on disk.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Open a store at `path`. The file need not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        StateStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Read the state without locking. A missing file is an empty state.
    pub fn load(&self) -> Result<MigrationState> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(MigrationState::default());
            }
            Err(e) => return Err(MigrationError::io(&self.path, e)),
        };
        let state: MigrationState =
            serde_json::from_str(&text).map_err(|e| MigrationError::State {
                detail: format!("{}: {e}", self.path.display()),
            })?;
        state.check()?;
        Ok(state)
    }

    /// Take the exclusive lock and read the state. Fails fast with
    /// `StateLocked` if another handle holds the lock.
    pub fn lock(&self) -> Result<StateLock> {
        let lock_path = self.lock_path();
        if let Some(parent) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| MigrationError::io(parent, e))?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| MigrationError::io(&lock_path, e))?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                return Err(MigrationError::StateLocked {
                    path: self.path.clone(),
                });
            }
            Err(e) => return Err(MigrationError::io(&lock_path, e)),
        }
        tracing::debug!(path = %lock_path.display(), "acquired migration state lock");

        let state = self.load()?;
        Ok(StateLock {
            path: self.path.clone(),
            file,
            state,
        })
    }
}

/// Exclusive access to the state for one batch. The lock is released on
/// drop, whether or not the batch succeeded.
#[derive(Debug)]
pub struct StateLock {
    path: PathBuf,
    file: File,
    state: MigrationState,
}

impl StateLock {
    pub fn state(&self) -> &MigrationState {
        &self.state
    }

    pub(crate) fn state_mut(&mut self) -> &mut MigrationState {
        &mut self.state
    }

    /// Atomically replace the state file with the in-memory state.
    pub fn commit(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.state).map_err(|e| MigrationError::State {
            detail: format!("serializing state: {e}"),
        })?;
        write_atomic(&self.path, json.as_bytes())?;
        tracing::debug!(path = %self.path.display(), applied = self.state.len(), "persisted migration state");
        Ok(())
    }
}

/// Write `data` to a temporary file next to `path`, sync it, then rename it
/// over `path`.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(|e| MigrationError::io(&parent, e))?;

    let mut tmp = NamedTempFile::new_in(&parent).map_err(|e| MigrationError::io(&parent, e))?;
    tmp.write_all(data)
        .map_err(|e| MigrationError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| MigrationError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| MigrationError::io(path, e.error))?;
    Ok(())
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release migration state lock");
        }
    }
}
