//! `fdml migrate` subcommands.

use anyhow::{bail, Result};
use fdml_migrate::{BatchOutcome, DownOptions, Migrator, ProjectConfig, UpOptions};
use fdml_migrate::{Direction, FileBackend, MigrationError};

/// Open the project's migrator, reporting files that failed to parse.
fn open(config: &ProjectConfig) -> Result<Migrator<FileBackend>> {
    let migrator = config.migrator()?;
    for err in migrator.migrations().errors() {
        eprintln!("warning: {err}");
    }
    Ok(migrator)
}

/// `fdml migrate up [--to <id>] [--dry-run]`
pub fn up(config: &ProjectConfig, to: Option<&str>, dry_run: bool) -> Result<()> {
    let mut migrator = open(config)?;
    let outcome = migrator.up(&UpOptions {
        to: to.map(str::to_string),
        dry_run,
    })?;
    finish(outcome)
}

/// `fdml migrate down [--count <n>] [--target <id>] [--force] [--dry-run]`
pub fn down(
    config: &ProjectConfig,
    count: usize,
    target: Option<&str>,
    force: bool,
    dry_run: bool,
) -> Result<()> {
    let mut migrator = open(config)?;
    let outcome = migrator.down(&DownOptions {
        count,
        target: target.map(str::to_string),
        force,
        dry_run,
    })?;
    finish(outcome)
}

/// `fdml migrate apply <id>`
pub fn apply(config: &ProjectConfig, id: &str) -> Result<()> {
    let mut migrator = open(config)?;
    let outcome = migrator.apply(id)?;
    finish(outcome)
}

/// `fdml migrate status`
pub fn status(config: &ProjectConfig) -> Result<()> {
    let migrator = open(config)?;
    let report = migrator.status()?;
    if report.migrations.is_empty() && report.orphans.is_empty() {
        println!(
            "No migrations found in {}.",
            config.migrations_dir().display()
        );
        return Ok(());
    }
    print!("{report}");

    let pending = report.pending().count();
    let drifted = report.drifted().count();
    println!();
    println!(
        "{} applied, {pending} pending, {drifted} drifted",
        report.migrations.len() - pending
    );
    Ok(())
}

/// `fdml migrate check`: definitions parse, ids are unique, and
/// dependencies are known and acyclic.
pub fn check(config: &ProjectConfig) -> Result<()> {
    let migrator = open(config)?;
    let definitions: Vec<_> = migrator
        .migrations()
        .iter()
        .map(|m| m.migration.clone())
        .collect();
    let report = fdml_validate::validate_migrations(&definitions);
    print!("{report}");

    let unparsed = migrator.migrations().errors().len();
    if report.has_errors() || unparsed > 0 {
        bail!(
            "{} error(s) in migration definitions, {unparsed} file(s) failed to parse",
            report.errors().count()
        );
    }
    Ok(())
}

fn finish(outcome: BatchOutcome) -> Result<()> {
    let verb = match (outcome.direction, outcome.dry_run) {
        (Direction::Up, false) => "Applied",
        (Direction::Up, true) => "Would apply",
        (Direction::Down, false) => "Rolled back",
        (Direction::Down, true) => "Would roll back",
    };

    if outcome.steps.is_empty() && outcome.is_complete() {
        println!("Nothing to do.");
        return Ok(());
    }
    for step in &outcome.steps {
        println!("{verb} {}", step.id);
        print!("{}", step.diff);
        for warning in step.report.warnings() {
            println!("  warning: [{}] {}: {}", warning.rule, warning.element_id, warning.message);
        }
        if let Some(backup) = &step.backup {
            println!("  backup: {}", backup.display());
        }
    }

    if let Some(MigrationError::MigrationFailed { id, report }) = &outcome.halted {
        eprintln!("migration '{id}' produced an invalid document; it was not applied");
        eprint!("{report}");
    }
    outcome.into_result()?;
    Ok(())
}
