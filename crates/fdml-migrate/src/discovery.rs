//! Migration discovery.
//!
//! Every `*.yaml`, `*.yml`, and `*.fdml` file directly inside the migrations
//! directory holds one migration. File names carry no meaning; the `id`
//! inside the file is authoritative. Files that fail to parse are collected
//! as errors without affecting the others.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use fdml_core::{ContentHash, Migration};

use crate::error::{MigrationError, Result};
use crate::resolve::topological_order;

const EXTENSIONS: &[&str] = &["yaml", "yml", "fdml"];

/// A migration definition and where it came from.
#[derive(Debug, Clone)]
pub struct LoadedMigration {
    pub migration: Migration,
    pub path: PathBuf,
    /// Hash of the parsed definition, recorded at apply time to detect drift.
    pub definition_hash: ContentHash,
}

impl LoadedMigration {
    pub fn new(migration: Migration, path: impl Into<PathBuf>) -> Result<Self> {
        let definition_hash = ContentHash::of(&migration)?;
        Ok(LoadedMigration {
            migration,
            path: path.into(),
            definition_hash,
        })
    }

    pub fn id(&self) -> &str {
        &self.migration.id
    }
}

/// All migrations known to a project, keyed by id.
#[derive(Debug, Default)]
pub struct MigrationSet {
    migrations: BTreeMap<String, LoadedMigration>,
    /// Files that could not be read or parsed.
    errors: Vec<MigrationError>,
}

impl MigrationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every migration file in `dir`. A missing directory is an empty
    /// set. Two files declaring the same id is an error.
    pub fn discover(dir: &Path) -> Result<Self> {
        let mut set = MigrationSet::new();
        if !dir.is_dir() {
            tracing::debug!(dir = %dir.display(), "no migrations directory");
            return Ok(set);
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(|e| MigrationError::io(dir, e))? {
            let path = entry.map_err(|e| MigrationError::io(dir, e))?.path();
            let known = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| EXTENSIONS.contains(&e));
            if known && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        for path in paths {
            let text = match std::fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) => {
                    set.errors.push(MigrationError::io(&path, e));
                    continue;
                }
            };
            match fdml_parse::parse_migration(&text) {
                Ok(migration) => set.insert(LoadedMigration::new(migration, path)?)?,
                Err(source) => {
                    tracing::warn!(path = %path.display(), error = %source, "skipping unparsable migration");
                    set.errors.push(MigrationError::Parse { path, source });
                }
            }
        }

        tracing::debug!(
            dir = %dir.display(),
            migrations = set.len(),
            errors = set.errors.len(),
            "discovered migrations"
        );
        Ok(set)
    }

    /// Build a set from in-memory definitions.
    pub fn from_migrations(migrations: impl IntoIterator<Item = Migration>) -> Result<Self> {
        let mut set = MigrationSet::new();
        for m in migrations {
            let path = PathBuf::from(format!("<memory>/{}", m.id));
            set.insert(LoadedMigration::new(m, path)?)?;
        }
        Ok(set)
    }

    pub fn insert(&mut self, loaded: LoadedMigration) -> Result<()> {
        if let Some(existing) = self.migrations.get(loaded.id()) {
            return Err(MigrationError::DuplicateMigration {
                id: loaded.id().to_string(),
                first: existing.path.clone(),
                second: loaded.path,
            });
        }
        self.migrations.insert(loaded.id().to_string(), loaded);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&LoadedMigration> {
        self.migrations.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.migrations.contains_key(id)
    }

    /// Migrations in id order.
    pub fn iter(&self) -> impl Iterator<Item = &LoadedMigration> {
        self.migrations.values()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// Per-file failures from discovery.
    pub fn errors(&self) -> &[MigrationError] {
        &self.errors
    }

    /// Ids in dependency order, ties broken by id.
    pub fn resolve_order(&self) -> Result<Vec<String>> {
        let deps: BTreeMap<String, Vec<String>> = self
            .migrations
            .iter()
            .map(|(id, m)| (id.clone(), m.migration.depends_on.clone()))
            .collect();
        topological_order(&deps)
    }

    /// Applied-or-pending ids that declare a dependency on `id`.
    pub fn dependents_of(&self, id: &str) -> Vec<String> {
        self.migrations
            .values()
            .filter(|m| m.migration.depends_on.iter().any(|d| d == id))
            .map(|m| m.id().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, body: &str) {
        std::fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn discovers_by_extension_and_id() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "zz_first.yaml",
            "migration:\n  id: 001_users\n  up:\n    - add_entity:\n        id: user\n        fields: []\n  down:\n    - remove_entity: user\n",
        );
        write(
            dir.path(),
            "aa_second.fdml",
            "id: 002_orders\ndepends_on: [001_users]\nup:\n  - add_entity:\n      id: order\n      fields: []\n",
        );
        write(dir.path(), "notes.txt", "not a migration");

        let set = MigrationSet::discover(dir.path()).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.errors().is_empty());
        let ids: Vec<&str> = set.iter().map(|m| m.id()).collect();
        assert_eq!(ids, vec!["001_users", "002_orders"]);
        assert_eq!(set.resolve_order().unwrap(), vec!["001_users", "002_orders"]);
        assert_eq!(set.dependents_of("001_users"), vec!["002_orders"]);
    }

    #[test]
    fn broken_file_does_not_hide_others() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "good.yml", "id: 001_ok\nup: []\n");
        write(dir.path(), "bad.yml", "id: 002_bad\nup:\n  - frobnicate: x\n");
        let set = MigrationSet::discover(dir.path()).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.errors().len(), 1);
        assert!(matches!(set.errors()[0], MigrationError::Parse { .. }));
    }

    #[test]
    fn duplicate_ids_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.yaml", "id: 001_same\nup: []\n");
        write(dir.path(), "b.yaml", "id: 001_same\nup: []\n");
        let err = MigrationSet::discover(dir.path()).unwrap_err();
        assert!(matches!(err, MigrationError::DuplicateMigration { ref id, .. } if id == "001_same"));
    }

    #[test]
    fn missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let set = MigrationSet::discover(&dir.path().join("nope")).unwrap();
        assert!(set.is_empty());
    }
}
