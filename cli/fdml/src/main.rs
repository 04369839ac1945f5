//! `fdml`: command-line front end for FDML specifications and their migrations.

mod commands;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use fdml_migrate::ProjectConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "fdml", version, about = "FDML specification tooling")]
struct Cli {
    /// Log engine activity to stderr (repeat for more detail)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new FDML project
    Init {
        /// Project name
        name: String,
    },
    /// Parse a specification and print its canonical form
    Parse {
        /// Specification file
        file: PathBuf,
        /// Print the parsed document as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate specification files (default: the project spec)
    Validate {
        /// Specification files
        files: Vec<PathBuf>,
        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,
        /// Report format (human, json)
        #[arg(long)]
        report: Option<String>,
        /// Rule to skip (e.g., constraint-applicability); repeatable
        #[arg(long)]
        skip: Vec<String>,
    },
    /// Apply, roll back, and inspect migrations
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
}

#[derive(Subcommand)]
enum MigrateAction {
    /// Apply pending migrations in dependency order
    Up {
        /// Stop after this migration
        #[arg(long)]
        to: Option<String>,
        /// Show what would change without writing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Roll back applied migrations, most recent first
    Down {
        /// Number of migrations to roll back
        #[arg(long, default_value_t = 1)]
        count: usize,
        /// Roll back this migration instead of the last <count>
        #[arg(long)]
        target: Option<String>,
        /// Roll back applied dependents first
        #[arg(long)]
        force: bool,
        /// Show what would change without writing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Apply one migration and any pending dependencies
    Apply {
        /// Migration ID
        id: String,
    },
    /// Show applied and pending migrations
    Status,
    /// Check migration definitions without applying them
    Check,
}

/// Route engine logs to stderr so stdout stays clean for reports.
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "fdml_migrate=info,fdml_validate=info",
        _ => "fdml_migrate=debug,fdml_validate=debug,fdml_parse=debug",
    };
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default.into()),
    );
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = run(cli.command);
    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn run(command: Commands) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;

    match command {
        Commands::Init { name } => commands::init::run(&name),

        Commands::Parse { file, json } => commands::parse::run(&file, json),

        Commands::Validate {
            files,
            strict,
            report,
            skip,
        } => {
            let config = ProjectConfig::find_and_load(&cwd)?;
            commands::validate::run(
                config.as_ref(),
                &files,
                strict,
                report.as_deref(),
                &skip,
            )
        }

        Commands::Migrate { action } => {
            let config = load_config_required(&cwd)?;
            match action {
                MigrateAction::Up { to, dry_run } => {
                    commands::migrate::up(&config, to.as_deref(), dry_run)
                }
                MigrateAction::Down {
                    count,
                    target,
                    force,
                    dry_run,
                } => commands::migrate::down(&config, count, target.as_deref(), force, dry_run),
                MigrateAction::Apply { id } => commands::migrate::apply(&config, &id),
                MigrateAction::Status => commands::migrate::status(&config),
                MigrateAction::Check => commands::migrate::check(&config),
            }
        }
    }
}

/// Load fdml.toml from the current directory or an ancestor, or fail.
fn load_config_required(cwd: &Path) -> anyhow::Result<ProjectConfig> {
    match ProjectConfig::find_and_load(cwd)? {
        Some(config) => Ok(config),
        None => anyhow::bail!(
            "no {} found in {} or any parent directory\nRun `fdml init <name>` to create a project.",
            fdml_migrate::CONFIG_FILE,
            cwd.display()
        ),
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;

    /// Full workflow: init, validate, migrate up, status, migrate down.
    #[test]
    fn init_validate_migrate_workflow() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("shop");

        commands::init::create_project(&project, "shop").unwrap();
        let config = load_config_required(&project).unwrap();
        assert_eq!(config.project.name, "shop");

        commands::validate::run(Some(&config), &[], false, None, &[]).unwrap();

        std::fs::write(
            config.migrations_dir().join("001_orders.yaml"),
            "id: 001_orders\nup:\n  - add_entity:\n      id: order\n      fields:\n        - {name: total, type: float}\ndown:\n  - remove_entity: order\n",
        )
        .unwrap();
        commands::migrate::check(&config).unwrap();
        commands::migrate::up(&config, None, true).unwrap();
        assert!(!config.state_file().exists());

        commands::migrate::up(&config, None, false).unwrap();
        let text = std::fs::read_to_string(config.spec_path()).unwrap();
        assert!(fdml_parse::parse(&text).unwrap().entity("order").is_some());
        commands::migrate::status(&config).unwrap();

        commands::migrate::down(&config, 1, None, false, false).unwrap();
        let text = std::fs::read_to_string(config.spec_path()).unwrap();
        assert!(fdml_parse::parse(&text).unwrap().entity("order").is_none());
    }

    #[test]
    fn migrate_requires_project() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config_required(dir.path()).unwrap_err();
        assert!(err.to_string().contains("fdml.toml"));
    }
}
