//! `fdml.toml` project configuration.
//!
//! ```toml
//! [project]
//! name = "shop"
//! spec = "spec/shop.fdml"
//!
//! [migrations]
//! dir = "migrations"
//! state_file = ".fdml/migration_state.json"
//! backup_dir = ".fdml/backups"
//!
//! [validation]
//! strict = false
//! ```
//!
//! Relative paths resolve against the directory holding `fdml.toml`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::backend::FileBackend;
use crate::discovery::MigrationSet;
use crate::engine::Migrator;
use crate::error::{MigrationError, Result};
use crate::state::StateStore;

pub const CONFIG_FILE: &str = "fdml.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub project: ProjectSection,
    #[serde(default)]
    pub migrations: MigrationsSection,
    #[serde(default)]
    pub validation: ValidationSection,
    /// Directory relative paths resolve against.
    #[serde(skip)]
    root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSection {
    pub name: String,
    /// The specification document migrations apply to.
    #[serde(default = "default_spec")]
    pub spec: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationsSection {
    #[serde(default = "default_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,
}

impl Default for MigrationsSection {
    fn default() -> Self {
        MigrationsSection {
            dir: default_dir(),
            state_file: default_state_file(),
            backup_dir: default_backup_dir(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationSection {
    /// Promote warnings to errors when validating the document directly.
    /// The migration engine always validates non-strict.
    #[serde(default)]
    pub strict: bool,
}

fn default_spec() -> PathBuf {
    PathBuf::from("spec.fdml")
}

fn default_dir() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_state_file() -> PathBuf {
    PathBuf::from(".fdml/migration_state.json")
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from(".fdml/backups")
}

impl ProjectConfig {
    /// Parse configuration text. Relative paths resolve against the current
    /// directory until [`ProjectConfig::with_root`] says otherwise.
    pub fn parse(text: &str) -> Result<Self> {
        let config: ProjectConfig = toml::from_str(text).map_err(|e| MigrationError::Config {
            detail: e.to_string(),
        })?;
        if config.project.name.trim().is_empty() {
            return Err(MigrationError::Config {
                detail: "[project].name must not be empty".to_string(),
            });
        }
        Ok(config)
    }

    /// Read and parse a config file; paths resolve against its directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| MigrationError::io(path, e))?;
        let root = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let config = Self::parse(&text).map_err(|e| match e {
            MigrationError::Config { detail } => MigrationError::Config {
                detail: format!("{}: {detail}", path.display()),
            },
            other => other,
        })?;
        Ok(config.with_root(root))
    }

    /// Search upward from `start_dir` for `fdml.toml`.
    pub fn find_and_load(start_dir: &Path) -> Result<Option<Self>> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let candidate = dir.join(CONFIG_FILE);
            if candidate.is_file() {
                return Self::load(&candidate).map(Some);
            }
            if !dir.pop() {
                return Ok(None);
            }
        }
    }

    /// Default `fdml.toml` for `fdml init`.
    pub fn template(name: &str) -> String {
        format!(
            r#"[project]
name = "{name}"
spec = "spec.fdml"

[migrations]
dir = "migrations"
state_file = ".fdml/migration_state.json"
backup_dir = ".fdml/backups"

[validation]
strict = false
"#
        )
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn spec_path(&self) -> PathBuf {
        self.resolve(&self.project.spec)
    }

    pub fn migrations_dir(&self) -> PathBuf {
        self.resolve(&self.migrations.dir)
    }

    pub fn state_file(&self) -> PathBuf {
        self.resolve(&self.migrations.state_file)
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.resolve(&self.migrations.backup_dir)
    }

    /// A migrator over the project's spec file, migrations, and state.
    pub fn migrator(&self) -> Result<Migrator<FileBackend>> {
        let migrations = MigrationSet::discover(&self.migrations_dir())?;
        Ok(Migrator::new(
            FileBackend::new(self.spec_path(), self.backup_dir()),
            StateStore::open(self.state_file()),
            migrations,
        ))
    }
}
