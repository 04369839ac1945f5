//! Migration engine error types.

use std::path::PathBuf;

use fdml_core::{CoreError, ElementKind};
use fdml_parse::ParseError;
use fdml_validate::ValidationReport;

use crate::lifecycle::MigrationPhase;

/// A single operation could not be applied to the working document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OperationError {
    #[error("{kind} '{id}' does not exist")]
    NotFound { kind: ElementKind, id: String },

    #[error("{kind} '{id}' already exists")]
    AlreadyExists { kind: ElementKind, id: String },
}

/// Errors that can occur while discovering, ordering, applying, or rolling
/// back migrations.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// A specification or migration file failed to parse.
    #[error("{}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The migration state file is unreadable or inconsistent.
    #[error("migration state error: {detail}")]
    State { detail: String },

    #[error("configuration error: {detail}")]
    Config { detail: String },

    /// Dependency graph has a cycle; nothing was applied.
    #[error("circular migration dependency: {}", .cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },

    #[error("migration '{id}' depends on unknown migration '{dependency}'")]
    UnknownDependency { id: String, dependency: String },

    #[error("unknown migration '{id}'")]
    UnknownMigration { id: String },

    #[error("migration id '{id}' is defined in both {} and {}", .first.display(), .second.display())]
    DuplicateMigration {
        id: String,
        first: PathBuf,
        second: PathBuf,
    },

    /// An applied migration's definition file is gone, so it cannot be
    /// rolled back.
    #[error("applied migration '{id}' has no definition")]
    MissingDefinition { id: String },

    #[error("migration '{id}' cannot go from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: MigrationPhase,
        to: MigrationPhase,
    },

    #[error("cannot roll back '{id}': applied migrations depend on it: {}", .blocking_ids.join(", "))]
    DependentMigrationsExist {
        id: String,
        blocking_ids: Vec<String>,
    },

    #[error("migration state {} is locked by another process", .path.display())]
    StateLocked { path: PathBuf },

    /// The migration's operations produced an invalid document. The
    /// document was restored to its state before this migration.
    #[error("migration '{id}' produced an invalid document:\n{report}")]
    MigrationFailed { id: String, report: ValidationReport },

    #[error("migration '{id}' operation {index} failed: {source}")]
    OperationFailed {
        id: String,
        index: usize,
        #[source]
        source: OperationError,
    },

    /// The batch stopped at a migration boundary on request.
    #[error("migration batch cancelled")]
    Cancelled,

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl MigrationError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MigrationError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrationError>;
