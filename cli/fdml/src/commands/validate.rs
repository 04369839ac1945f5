//! `fdml validate`: parse and validate specification files.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use fdml_migrate::ProjectConfig;
use fdml_validate::{RuleCode, RuleSet, ValidationReport, Validator};

pub fn run(
    config: Option<&ProjectConfig>,
    files: &[PathBuf],
    strict: bool,
    report_format: Option<&str>,
    skip: &[String],
) -> Result<()> {
    let files: Vec<PathBuf> = match (files.is_empty(), config) {
        (false, _) => files.to_vec(),
        (true, Some(config)) => vec![config.spec_path()],
        (true, None) => bail!(
            "no files given and no {} found",
            fdml_migrate::CONFIG_FILE
        ),
    };
    let strict = strict || config.is_some_and(|c| c.validation.strict);
    let json = match report_format.unwrap_or("human") {
        "human" => false,
        "json" => true,
        other => bail!("unknown report format '{other}' (expected human or json)"),
    };

    let mut rules = RuleSet::all();
    for name in skip {
        rules = rules.without(rule_by_name(name)?);
    }
    let validator = Validator::new(rules).strict(strict);

    let sources = files
        .iter()
        .map(|path| {
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
        })
        .collect::<Result<Vec<String>>>()?;

    let mut failed = 0;
    for (path, parsed) in files.iter().zip(fdml_parse::parse_many(&sources)) {
        let report = match parsed {
            Ok(doc) => validator.validate(&doc),
            Err(e) => {
                eprintln!("{}:{e}", path.display());
                failed += 1;
                continue;
            }
        };
        print_report(path, &report, json)?;
        if report.has_errors() {
            failed += 1;
        }
    }

    if failed > 0 {
        bail!("{failed} of {} file(s) failed validation", files.len());
    }
    Ok(())
}

fn print_report(path: &Path, report: &ValidationReport, json: bool) -> Result<()> {
    if json {
        println!("{}", report.to_json()?);
    } else {
        println!("{}", path.display());
        print!("{report}");
    }
    Ok(())
}

fn rule_by_name(name: &str) -> Result<RuleCode> {
    match RuleCode::ALL.iter().find(|r| r.as_str() == name) {
        Some(rule) => Ok(*rule),
        None => {
            let known: Vec<&str> = RuleCode::ALL.iter().map(|r| r.as_str()).collect();
            bail!("unknown rule '{name}' (known: {})", known.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUPLICATES: &str = "\
entities:
  - id: user
  - id: user
";

    #[test]
    fn duplicate_ids_fail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dup.fdml");
        std::fs::write(&path, DUPLICATES).unwrap();

        let err = run(None, &[path], false, Some("json"), &[]).unwrap_err();
        assert!(err.to_string().contains("1 of 1"));
    }

    #[test]
    fn skipped_rule_is_not_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dup.fdml");
        std::fs::write(&path, DUPLICATES).unwrap();

        run(None, &[path], false, None, &["unique-id".to_string()]).unwrap();
    }

    #[test]
    fn unknown_rule_and_format() {
        assert!(rule_by_name("no-such-rule").is_err());
        assert_eq!(rule_by_name("type-consistency").unwrap(), RuleCode::TypeConsistency);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.fdml");
        std::fs::write(&path, "entities:\n  - id: user\n").unwrap();
        assert!(run(None, &[path], false, Some("xml"), &[]).is_err());
    }

    #[test]
    fn needs_files_or_project() {
        assert!(run(None, &[], false, None, &[]).is_err());
    }
}
