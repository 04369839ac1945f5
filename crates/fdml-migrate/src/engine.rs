//! The migration engine.
//!
//! A batch resolves the dependency order, takes the state lock, and then
//! runs migrations one at a time. Each migration runs its operations on a
//! copy of the document and validates the copy. If validation finds an
//! error the copy is dropped and the batch stops; the document and state
//! stay exactly as the previous migration left them. Otherwise the copy is
//! committed to the backend and the state file is rewritten before the next
//! migration starts.

use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fdml_core::{ContentHash, Document};
use fdml_validate::{RuleSet, ValidationReport, Validator};
use uuid::Uuid;

use crate::backend::DocumentBackend;
use crate::diff::DocumentDiff;
use crate::discovery::{LoadedMigration, MigrationSet};
use crate::error::{MigrationError, Result};
use crate::lifecycle::MigrationPhase;
use crate::operation::apply_operations;
use crate::state::{AppliedMigration, MigrationState, StateLock, StateStore};

/// Requests that a running batch stop before its next migration.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// Options for `up`.
#[derive(Debug, Clone, Default)]
pub struct UpOptions {
    /// Stop after this migration in dependency order.
    pub to: Option<String>,
    /// Run and validate without committing anything.
    pub dry_run: bool,
}

/// Options for `down`.
#[derive(Debug, Clone)]
pub struct DownOptions {
    /// How many of the most recently applied migrations to roll back.
    pub count: usize,
    /// Roll back this migration (and, with `force`, its dependents) instead
    /// of the last `count`.
    pub target: Option<String>,
    /// Roll back applied dependents first instead of refusing.
    pub force: bool,
    pub dry_run: bool,
}

impl Default for DownOptions {
    fn default() -> Self {
        DownOptions {
            count: 1,
            target: None,
            force: false,
            dry_run: false,
        }
    }
}

/// One migration that ran to completion (or would have, in a dry run).
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub id: String,
    pub direction: Direction,
    pub diff: DocumentDiff,
    /// Hash of the document after this step.
    pub document_hash: ContentHash,
    /// Non-fatal findings on the resulting document.
    pub report: ValidationReport,
    pub backup: Option<PathBuf>,
}

/// Result of a batch. Completed steps stay applied even when a later
/// migration halts the batch.
#[derive(Debug)]
pub struct BatchOutcome {
    pub batch_id: Uuid,
    pub direction: Direction,
    pub dry_run: bool,
    pub steps: Vec<StepOutcome>,
    /// The error that stopped the batch, if any.
    pub halted: Option<MigrationError>,
    pub cancelled: bool,
}

impl BatchOutcome {
    fn new(direction: Direction, dry_run: bool) -> Self {
        BatchOutcome {
            batch_id: Uuid::new_v4(),
            direction,
            dry_run,
            steps: Vec::new(),
            halted: None,
            cancelled: false,
        }
    }

    /// Every planned migration ran.
    pub fn is_complete(&self) -> bool {
        self.halted.is_none() && !self.cancelled
    }

    pub fn ids(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.id.as_str()).collect()
    }

    /// The completed steps, or the error that stopped the batch.
    pub fn into_result(self) -> Result<Vec<StepOutcome>> {
        if let Some(err) = self.halted {
            return Err(err);
        }
        if self.cancelled {
            return Err(MigrationError::Cancelled);
        }
        Ok(self.steps)
    }
}

/// Status of one migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub id: String,
    pub phase: MigrationPhase,
    pub applied_at: Option<DateTime<Utc>>,
    /// Applied, but the definition changed since.
    pub drifted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    pub migrations: Vec<MigrationStatus>,
    /// Applied ids with no definition on disk.
    pub orphans: Vec<String>,
}

impl StatusReport {
    pub fn get(&self, id: &str) -> Option<&MigrationStatus> {
        self.migrations.iter().find(|m| m.id == id)
    }

    pub fn pending(&self) -> impl Iterator<Item = &MigrationStatus> {
        self.migrations
            .iter()
            .filter(|m| m.phase == MigrationPhase::Pending)
    }

    pub fn drifted(&self) -> impl Iterator<Item = &MigrationStatus> {
        self.migrations.iter().filter(|m| m.drifted)
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Migration Status ===")?;
        for m in &self.migrations {
            write!(f, "  [{}] {}", m.phase, m.id)?;
            if let Some(at) = m.applied_at {
                write!(f, " ({})", at.format("%Y-%m-%d %H:%M:%S UTC"))?;
            }
            if m.drifted {
                write!(f, " DRIFTED")?;
            }
            writeln!(f)?;
        }
        for id in &self.orphans {
            writeln!(f, "  [ORPHAN] {id}")?;
        }
        Ok(())
    }
}

/// State for one batch: the locked state file, or a private copy in a dry
/// run.
struct Session {
    lock: Option<StateLock>,
    preview: MigrationState,
}

impl Session {
    fn open(store: &StateStore, dry_run: bool) -> Result<Self> {
        if dry_run {
            return Ok(Session {
                lock: None,
                preview: store.load()?,
            });
        }
        Ok(Session {
            lock: Some(store.lock()?),
            preview: MigrationState::default(),
        })
    }

    fn is_dry_run(&self) -> bool {
        self.lock.is_none()
    }

    fn state(&self) -> &MigrationState {
        match &self.lock {
            Some(lock) => lock.state(),
            None => &self.preview,
        }
    }

    /// Change the state and persist it. A failed persist leaves the
    /// in-memory state as it was.
    fn update(&mut self, change: impl FnOnce(&mut MigrationState)) -> Result<()> {
        match &mut self.lock {
            Some(lock) => {
                let before = lock.state().clone();
                change(lock.state_mut());
                if let Err(e) = lock.commit() {
                    *lock.state_mut() = before;
                    return Err(e);
                }
                Ok(())
            }
            None => {
                change(&mut self.preview);
                Ok(())
            }
        }
    }
}

/// Applies and rolls back migrations against one document backend and one
/// state file.
pub struct Migrator<B: DocumentBackend> {
    backend: B,
    store: StateStore,
    migrations: MigrationSet,
    validator: Validator,
    cancel: CancelToken,
}

impl<B: DocumentBackend> Migrator<B> {
    pub fn new(backend: B, store: StateStore, migrations: MigrationSet) -> Self {
        Migrator {
            backend,
            store,
            migrations,
            validator: Validator::new(RuleSet::all()),
            cancel: CancelToken::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn migrations(&self) -> &MigrationSet {
        &self.migrations
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// A token that stops running batches at the next migration boundary.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn document(&self) -> Result<Document> {
        self.backend.load()
    }

    /// Apply pending migrations in dependency order, up to and including
    /// `options.to` if given.
    pub fn up(&mut self, options: &UpOptions) -> Result<BatchOutcome> {
        let order = self.migrations.resolve_order()?;
        let limit = match &options.to {
            Some(target) => {
                let pos = order.iter().position(|id| id == target).ok_or_else(|| {
                    MigrationError::UnknownMigration { id: target.clone() }
                })?;
                pos + 1
            }
            None => order.len(),
        };

        let session = Session::open(&self.store, options.dry_run)?;
        let plan: Vec<String> = order
            .into_iter()
            .take(limit)
            .filter(|id| !session.state().is_applied(id))
            .collect();
        self.run(Direction::Up, plan, session)
    }

    /// Apply one migration together with any of its dependencies that are
    /// still pending.
    pub fn apply(&mut self, id: &str) -> Result<BatchOutcome> {
        if !self.migrations.contains(id) {
            return Err(MigrationError::UnknownMigration { id: id.to_string() });
        }
        let order = self.migrations.resolve_order()?;
        let session = Session::open(&self.store, false)?;
        if session.state().is_applied(id) {
            return Err(MigrationError::InvalidTransition {
                id: id.to_string(),
                from: MigrationPhase::Applied,
                to: MigrationPhase::Applying,
            });
        }

        let needed = self.dependencies_of(id);
        let plan: Vec<String> = order
            .into_iter()
            .filter(|m| m == id || needed.contains(m))
            .filter(|m| !session.state().is_applied(m))
            .collect();
        self.run(Direction::Up, plan, session)
    }

    /// Roll back applied migrations in reverse application order.
    pub fn down(&mut self, options: &DownOptions) -> Result<BatchOutcome> {
        let session = Session::open(&self.store, options.dry_run)?;
        let state = session.state();

        let requested: Vec<String> = match &options.target {
            Some(target) => {
                if !state.is_applied(target) {
                    if !self.migrations.contains(target) {
                        return Err(MigrationError::UnknownMigration { id: target.clone() });
                    }
                    return Err(MigrationError::InvalidTransition {
                        id: target.clone(),
                        from: MigrationPhase::Pending,
                        to: MigrationPhase::RollingBack,
                    });
                }
                vec![target.clone()]
            }
            None => state
                .applied
                .iter()
                .rev()
                .take(options.count)
                .map(|a| a.id.clone())
                .collect(),
        };

        let mut selected: BTreeSet<String> = requested.iter().cloned().collect();
        for id in &requested {
            let blocking: Vec<String> = self
                .applied_dependents(state, id)
                .into_iter()
                .filter(|d| !selected.contains(d))
                .collect();
            if blocking.is_empty() {
                continue;
            }
            if !options.force {
                return Err(MigrationError::DependentMigrationsExist {
                    id: id.clone(),
                    blocking_ids: blocking,
                });
            }
            tracing::warn!(migration = %id, dependents = ?blocking, "rolling back dependents first");
            selected.extend(blocking);
        }

        let plan: Vec<String> = state
            .applied
            .iter()
            .rev()
            .filter(|a| selected.contains(&a.id))
            .map(|a| a.id.clone())
            .collect();
        if let Some(id) = plan.iter().find(|id| !self.migrations.contains(id)) {
            return Err(MigrationError::MissingDefinition { id: id.clone() });
        }
        self.run(Direction::Down, plan, session)
    }

    /// Applied and pending migrations, with drift and orphans. Reads the
    /// state without locking.
    pub fn status(&self) -> Result<StatusReport> {
        let state = self.store.load()?;
        let order = self
            .migrations
            .resolve_order()
            .unwrap_or_else(|_| self.migrations.iter().map(|m| m.id().to_string()).collect());

        let mut report = StatusReport::default();
        for id in order {
            let Some(loaded) = self.migrations.get(&id) else {
                continue;
            };
            let status = match state.get(&id) {
                Some(applied) => MigrationStatus {
                    drifted: applied.definition_hash != loaded.definition_hash,
                    id,
                    phase: MigrationPhase::Applied,
                    applied_at: Some(applied.applied_at),
                },
                None => MigrationStatus {
                    id,
                    phase: MigrationPhase::Pending,
                    applied_at: None,
                    drifted: false,
                },
            };
            if status.drifted {
                tracing::warn!(migration = %status.id, "applied migration definition has changed");
            }
            report.migrations.push(status);
        }
        report.orphans = state
            .ids()
            .filter(|id| !self.migrations.contains(id))
            .map(str::to_string)
            .collect();
        Ok(report)
    }

    fn run(&mut self, direction: Direction, plan: Vec<String>, mut session: Session) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::new(direction, session.is_dry_run());
        if plan.is_empty() {
            tracing::info!(%direction, "no migrations to run");
            return Ok(outcome);
        }

        let mut doc = self.backend.load()?;
        tracing::info!(
            batch = %outcome.batch_id,
            %direction,
            migrations = plan.len(),
            dry_run = outcome.dry_run,
            "starting migration batch"
        );

        for id in &plan {
            if self.cancel.is_cancelled() {
                tracing::warn!(batch = %outcome.batch_id, next = %id, "migration batch cancelled");
                outcome.cancelled = true;
                break;
            }
            let Some(loaded) = self.migrations.get(id).cloned() else {
                outcome.halted = Some(MigrationError::MissingDefinition { id: id.clone() });
                break;
            };
            match self.step(&loaded, direction, &mut doc, &mut session, outcome.batch_id) {
                Ok(step) => {
                    tracing::info!(
                        migration = %id,
                        %direction,
                        changes = step.diff.len(),
                        hash = %step.document_hash.short(),
                        "migration step complete"
                    );
                    outcome.steps.push(step);
                }
                Err(e) => {
                    tracing::warn!(migration = %id, %direction, error = %e, "migration failed, document left as before it");
                    outcome.halted = Some(e);
                    break;
                }
            }
        }

        tracing::info!(
            batch = %outcome.batch_id,
            completed = outcome.steps.len(),
            halted = outcome.halted.is_some(),
            "finished migration batch"
        );
        Ok(outcome)
    }

    fn step(
        &mut self,
        loaded: &LoadedMigration,
        direction: Direction,
        doc: &mut Document,
        session: &mut Session,
        batch_id: Uuid,
    ) -> Result<StepOutcome> {
        let id = loaded.id();
        let (at_rest, active, done) = match direction {
            Direction::Up => (
                MigrationPhase::Pending,
                MigrationPhase::Applying,
                MigrationPhase::Applied,
            ),
            Direction::Down => (
                MigrationPhase::Applied,
                MigrationPhase::RollingBack,
                MigrationPhase::Pending,
            ),
        };
        let current = if session.state().is_applied(id) {
            MigrationPhase::Applied
        } else {
            MigrationPhase::Pending
        };
        if current != at_rest || !current.can_transition_to(active) {
            return Err(MigrationError::InvalidTransition {
                id: id.to_string(),
                from: current,
                to: active,
            });
        }
        tracing::debug!(migration = %id, from = %current, to = %active, "migration transition");

        let dry_run = session.is_dry_run();
        let backup = if dry_run {
            None
        } else {
            self.backend.snapshot(doc, &format!("{id}-{direction}"))?
        };

        let ops = match direction {
            Direction::Up => &loaded.migration.up,
            Direction::Down => &loaded.migration.down,
        };
        let mut working = doc.clone();
        apply_operations(&mut working, ops).map_err(|(index, source)| {
            MigrationError::OperationFailed {
                id: id.to_string(),
                index,
                source,
            }
        })?;

        let report = self.validator.validate(&working);
        if report.has_errors() {
            return Err(MigrationError::MigrationFailed {
                id: id.to_string(),
                report,
            });
        }

        let diff = DocumentDiff::between(doc, &working);
        let document_hash = ContentHash::of(&working)?;

        if !dry_run {
            self.backend.commit(&working)?;
        }
        let recorded = match direction {
            Direction::Up => {
                let entry = AppliedMigration {
                    id: id.to_string(),
                    applied_at: Utc::now(),
                    document_hash: document_hash.clone(),
                    definition_hash: loaded.definition_hash.clone(),
                    batch_id,
                };
                session.update(|state| state.push(entry))
            }
            Direction::Down => session.update(|state| {
                state.remove(id);
            }),
        };
        if let Err(e) = recorded {
            // The state file still describes the old document.
            if !dry_run {
                if let Err(restore) = self.backend.commit(doc) {
                    tracing::error!(migration = %id, error = %restore, "failed to restore document after state write failure");
                }
            }
            return Err(e);
        }
        tracing::debug!(migration = %id, from = %active, to = %done, "migration transition");

        *doc = working;
        Ok(StepOutcome {
            id: id.to_string(),
            direction,
            diff,
            document_hash,
            report,
            backup,
        })
    }

    /// Transitive dependencies of `id` according to the definitions.
    fn dependencies_of(&self, id: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<String> = VecDeque::from([id.to_string()]);
        while let Some(next) = queue.pop_front() {
            if let Some(loaded) = self.migrations.get(&next) {
                for dep in &loaded.migration.depends_on {
                    if seen.insert(dep.clone()) {
                        queue.push_back(dep.clone());
                    }
                }
            }
        }
        seen
    }

    /// Applied migrations that depend on `id`, directly or transitively, in
    /// application order.
    fn applied_dependents(&self, state: &MigrationState, id: &str) -> Vec<String> {
        let mut found = BTreeSet::new();
        let mut queue: VecDeque<String> = VecDeque::from([id.to_string()]);
        while let Some(next) = queue.pop_front() {
            for dependent in self.migrations.dependents_of(&next) {
                if state.is_applied(&dependent) && found.insert(dependent.clone()) {
                    queue.push_back(dependent);
                }
            }
        }
        state
            .ids()
            .filter(|a| found.contains(*a))
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use fdml_core::{DataType, Entity, Field, Migration, Operation};

    fn add_entity(id: &str, name: &str) -> Migration {
        Migration::new(id)
            .up(Operation::AddEntity {
                entity: Entity::new(name).with_field(Field::new("id", DataType::Uuid)),
            })
            .down(Operation::RemoveEntity { id: name.into() })
    }

    fn migrator(dir: &std::path::Path, migrations: Vec<Migration>) -> Migrator<MemoryBackend> {
        Migrator::new(
            MemoryBackend::new(Document::new()),
            StateStore::open(dir.join("state.json")),
            MigrationSet::from_migrations(migrations).unwrap(),
        )
    }

    #[test]
    fn up_applies_in_order_and_records_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = migrator(
            dir.path(),
            vec![add_entity("002_orders", "order").depends_on("001_users"), add_entity("001_users", "user")],
        );
        let outcome = m.up(&UpOptions::default()).unwrap();
        assert!(outcome.is_complete());
        assert_eq!(outcome.ids(), vec!["001_users", "002_orders"]);

        let state = m.store().load().unwrap();
        assert_eq!(state.ids().collect::<Vec<_>>(), vec!["001_users", "002_orders"]);
        assert!(state.applied.iter().all(|a| a.batch_id == outcome.batch_id));
        assert_eq!(
            state.applied[1].document_hash,
            ContentHash::of(m.backend().document()).unwrap()
        );

        // nothing left
        assert!(m.up(&UpOptions::default()).unwrap().steps.is_empty());
    }

    #[test]
    fn up_to_target() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = migrator(
            dir.path(),
            vec![add_entity("001_a", "a"), add_entity("002_b", "b"), add_entity("003_c", "c")],
        );
        let outcome = m
            .up(&UpOptions {
                to: Some("002_b".into()),
                dry_run: false,
            })
            .unwrap();
        assert_eq!(outcome.ids(), vec!["001_a", "002_b"]);
        assert!(matches!(
            m.up(&UpOptions { to: Some("999".into()), dry_run: false }),
            Err(MigrationError::UnknownMigration { .. })
        ));
    }

    #[test]
    fn apply_pulls_in_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = migrator(
            dir.path(),
            vec![
                add_entity("001_a", "a"),
                add_entity("002_b", "b"),
                add_entity("003_c", "c").depends_on("001_a"),
            ],
        );
        let outcome = m.apply("003_c").unwrap();
        assert_eq!(outcome.ids(), vec!["001_a", "003_c"]);
        let err = m.apply("003_c").unwrap_err();
        assert!(matches!(
            err,
            MigrationError::InvalidTransition { from: MigrationPhase::Applied, to: MigrationPhase::Applying, .. }
        ));
    }

    #[test]
    fn operation_failure_halts_batch() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = migrator(
            dir.path(),
            vec![add_entity("001_a", "a"), add_entity("002_again", "a"), add_entity("003_c", "c")],
        );
        let outcome = m.up(&UpOptions::default()).unwrap();
        assert_eq!(outcome.ids(), vec!["001_a"]);
        assert!(matches!(
            outcome.halted,
            Some(MigrationError::OperationFailed { ref id, index: 0, .. }) if id == "002_again"
        ));
        assert_eq!(m.backend().document().entities.len(), 1);
        assert_eq!(m.store().load().unwrap().len(), 1);
    }

    #[test]
    fn cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = migrator(dir.path(), vec![add_entity("001_a", "a")]);
        m.cancel_token().cancel();
        let outcome = m.up(&UpOptions::default()).unwrap();
        assert!(outcome.cancelled);
        assert!(outcome.steps.is_empty());
        assert!(matches!(outcome.into_result(), Err(MigrationError::Cancelled)));
        assert!(m.store().load().unwrap().is_empty());
    }

    #[test]
    fn down_default_is_last_one() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = migrator(dir.path(), vec![add_entity("001_a", "a"), add_entity("002_b", "b")]);
        m.up(&UpOptions::default()).unwrap();
        let outcome = m.down(&DownOptions::default()).unwrap();
        assert_eq!(outcome.ids(), vec!["002_b"]);
        assert!(m.backend().document().entity("b").is_none());
        assert!(m.backend().document().entity("a").is_some());
    }

    #[test]
    fn down_pending_target_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = migrator(dir.path(), vec![add_entity("001_a", "a")]);
        let err = m
            .down(&DownOptions {
                target: Some("001_a".into()),
                ..DownOptions::default()
            })
            .unwrap_err();
        assert!(matches!(
            err,
            MigrationError::InvalidTransition { from: MigrationPhase::Pending, to: MigrationPhase::RollingBack, .. }
        ));
    }

    #[test]
    fn status_reports_orphans() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = migrator(dir.path(), vec![add_entity("001_a", "a"), add_entity("002_b", "b")]);
        m.up(&UpOptions { to: Some("001_a".into()), dry_run: false }).unwrap();

        let status = m.status().unwrap();
        assert_eq!(status.get("001_a").map(|s| s.phase), Some(MigrationPhase::Applied));
        assert!(status.get("001_a").unwrap().applied_at.is_some());
        assert_eq!(status.pending().count(), 1);

        let other = Migrator::new(
            MemoryBackend::new(Document::new()),
            StateStore::open(dir.path().join("state.json")),
            MigrationSet::from_migrations(vec![add_entity("002_b", "b")]).unwrap(),
        );
        let status = other.status().unwrap();
        assert_eq!(status.orphans, vec!["001_a".to_string()]);
        assert!(status.to_string().contains("[ORPHAN] 001_a"));
    }
}
