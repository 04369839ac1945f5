//! `fdml init`: project scaffolding.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use fdml_migrate::{ProjectConfig, CONFIG_FILE};

const STARTER_SPEC: &str = "\
metadata:
  version: 0.1.0
entities:
  - id: user
    fields:
      - name: email
        type: string
        required: true
        constraints: [unique]
";

/// Create a new FDML project in directory `name` relative to cwd.
pub fn run(name: &str) -> Result<()> {
    create_project(Path::new(name), name)
}

pub(crate) fn create_project(project_dir: &Path, name: &str) -> Result<()> {
    if project_dir.exists() {
        bail!("directory '{}' already exists", project_dir.display());
    }

    fs::create_dir_all(project_dir.join("migrations"))
        .context("creating migrations/ directory")?;
    fs::write(project_dir.join(CONFIG_FILE), ProjectConfig::template(name))
        .with_context(|| format!("writing {CONFIG_FILE}"))?;
    fs::write(project_dir.join("spec.fdml"), STARTER_SPEC).context("writing spec.fdml")?;
    fs::write(project_dir.join(".gitignore"), ".fdml/\n").context("writing .gitignore")?;

    println!("Created project '{name}'");
    println!("  {name}/{CONFIG_FILE}");
    println!("  {name}/spec.fdml");
    println!("  {name}/migrations/");
    println!("  {name}/.gitignore");

    Ok(())
}
