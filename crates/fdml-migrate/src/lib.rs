//! Reversible, dependency-ordered migrations over FDML documents.
//!
//! Migrations are discovered from a directory ([`MigrationSet::discover`]),
//! ordered by their declared dependencies, and applied by a [`Migrator`]
//! against a [`DocumentBackend`]. Every migration runs on a copy of the
//! document and is validated before it is committed, so a failing migration
//! never leaves a half-changed document. Applied migrations are recorded in a
//! JSON state file guarded by an advisory lock ([`StateStore`]).
//!
//! ```no_run
//! use fdml_migrate::{ProjectConfig, UpOptions};
//!
//! # fn main() -> fdml_migrate::Result<()> {
//! let config = ProjectConfig::find_and_load(std::path::Path::new("."))?
//!     .ok_or_else(|| fdml_migrate::MigrationError::Config {
//!         detail: "no fdml.toml found".into(),
//!     })?;
//! let mut migrator = config.migrator()?;
//! let outcome = migrator.up(&UpOptions::default())?;
//! for step in &outcome.steps {
//!     println!("applied {}\n{}", step.id, step.diff);
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod diff;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod operation;
pub mod resolve;
pub mod state;

pub use backend::{DocumentBackend, FileBackend, MemoryBackend};
pub use config::{ProjectConfig, CONFIG_FILE};
pub use diff::{Change, DiffEntry, DocumentDiff};
pub use discovery::{LoadedMigration, MigrationSet};
pub use engine::{
    BatchOutcome, CancelToken, Direction, DownOptions, MigrationStatus, Migrator, StatusReport,
    StepOutcome, UpOptions,
};
pub use error::{MigrationError, OperationError, Result};
pub use lifecycle::MigrationPhase;
pub use operation::{apply_operation, apply_operations};
pub use resolve::topological_order;
pub use state::{AppliedMigration, MigrationState, StateLock, StateStore};
