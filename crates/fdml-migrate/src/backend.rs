//! Where the migrated document lives.
//!
//! The `DocumentBackend` trait abstracts over document storage. The engine
//! always works on an in-memory copy; a backend only loads the current
//! document, keeps a backup before each migration, and commits the result.

use std::path::{Path, PathBuf};

use chrono::Utc;
use fdml_core::Document;

use crate::error::{MigrationError, Result};
use crate::state::write_atomic;

/// Document storage used by the migration engine.
pub trait DocumentBackend {
    /// Read the current document.
    fn load(&self) -> Result<Document>;

    /// Keep a recoverable copy of `doc` before a migration runs. `label`
    /// names the migration and direction. Returns where the backup went, if
    /// the backend writes one.
    fn snapshot(&mut self, doc: &Document, label: &str) -> Result<Option<PathBuf>>;

    /// Replace the current document.
    fn commit(&mut self, doc: &Document) -> Result<()>;
}

/// A document held in memory, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    document: Document,
    snapshots: Vec<(String, Document)>,
}

impl MemoryBackend {
    pub fn new(document: Document) -> Self {
        MemoryBackend {
            document,
            snapshots: Vec::new(),
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Snapshots taken so far, oldest first.
    pub fn snapshots(&self) -> &[(String, Document)] {
        &self.snapshots
    }
}

impl DocumentBackend for MemoryBackend {
    fn load(&self) -> Result<Document> {
        Ok(self.document.clone())
    }

    fn snapshot(&mut self, doc: &Document, label: &str) -> Result<Option<PathBuf>> {
        self.snapshots.push((label.to_string(), doc.clone()));
        Ok(None)
    }

    fn commit(&mut self, doc: &Document) -> Result<()> {
        self.document = doc.clone();
        Ok(())
    }
}

/// A specification file on disk.
///
/// Backups are written as `<backup_dir>/<timestamp>-<label>.fdml` and never
/// deleted.
#[derive(Debug, Clone)]
pub struct FileBackend {
    spec_path: PathBuf,
    backup_dir: PathBuf,
}

impl FileBackend {
    pub fn new(spec_path: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        FileBackend {
            spec_path: spec_path.into(),
            backup_dir: backup_dir.into(),
        }
    }

    pub fn spec_path(&self) -> &Path {
        &self.spec_path
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }
}

impl DocumentBackend for FileBackend {
    fn load(&self) -> Result<Document> {
        let text = std::fs::read_to_string(&self.spec_path)
            .map_err(|e| MigrationError::io(&self.spec_path, e))?;
        fdml_parse::parse(&text).map_err(|source| MigrationError::Parse {
            path: self.spec_path.clone(),
            source,
        })
    }

    fn snapshot(&mut self, doc: &Document, label: &str) -> Result<Option<PathBuf>> {
        std::fs::create_dir_all(&self.backup_dir)
            .map_err(|e| MigrationError::io(&self.backup_dir, e))?;
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        let path = self.backup_dir.join(format!("{stamp}-{label}.fdml"));
        std::fs::write(&path, fdml_parse::to_text(doc)).map_err(|e| MigrationError::io(&path, e))?;
        tracing::info!(path = %path.display(), "wrote document backup");
        Ok(Some(path))
    }

    fn commit(&mut self, doc: &Document) -> Result<()> {
        write_atomic(&self.spec_path, fdml_parse::to_text(doc).as_bytes())
    }
}
