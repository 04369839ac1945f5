//! Semantic validation for FDML documents.
//!
//! A [`Validator`] runs a [`RuleSet`] over a [`Document`] and returns a
//! [`ValidationReport`]. Rules only read the document, so they run
//! concurrently; the report orders findings by rule code, then element id,
//! so the outcome never depends on scheduling.
//!
//! ```ignore
//! let report = fdml_validate::validate(&doc, &RuleSet::all());
//! if report.has_errors() {
//!     eprintln!("{report}");
//! }
//! ```

pub mod graph;
pub mod report;

mod index;
mod rules;

use std::collections::{BTreeMap, BTreeSet};

use fdml_core::{Document, Migration};
use rayon::prelude::*;

use crate::index::ElementIndex;
pub use crate::report::{Finding, RuleCode, Severity, ValidationReport};

/// The set of rule categories to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSet(BTreeSet<RuleCode>);

impl RuleSet {
    pub fn all() -> Self {
        RuleSet(RuleCode::ALL.into_iter().collect())
    }

    pub fn none() -> Self {
        RuleSet(BTreeSet::new())
    }

    pub fn with(mut self, rule: RuleCode) -> Self {
        self.0.insert(rule);
        self
    }

    pub fn without(mut self, rule: RuleCode) -> Self {
        self.0.remove(&rule);
        self
    }

    pub fn contains(&self, rule: RuleCode) -> bool {
        self.0.contains(&rule)
    }

    /// Rules in priority order.
    pub fn iter(&self) -> impl Iterator<Item = RuleCode> + '_ {
        self.0.iter().copied()
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        RuleSet::all()
    }
}

impl FromIterator<RuleCode> for RuleSet {
    fn from_iter<I: IntoIterator<Item = RuleCode>>(iter: I) -> Self {
        RuleSet(iter.into_iter().collect())
    }
}

/// Runs a rule set over documents. `strict` promotes warnings to errors.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    rules: RuleSet,
    strict: bool,
}

impl Validator {
    pub fn new(rules: RuleSet) -> Self {
        Validator {
            rules,
            strict: false,
        }
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn validate(&self, doc: &Document) -> ValidationReport {
        let index = ElementIndex::build(doc);
        let codes: Vec<RuleCode> = self.rules.iter().collect();
        let findings: Vec<Finding> = codes
            .par_iter()
            .flat_map_iter(|rule| rules::run(*rule, doc, &index))
            .collect();

        let mut report = ValidationReport::from_findings(findings);
        if self.strict {
            report.promote_warnings();
        }
        tracing::debug!(
            elements = doc.element_count(),
            errors = report.errors().count(),
            warnings = report.warnings().count(),
            strict = self.strict,
            "validated document"
        );
        report
    }

    /// One report per document, in input order.
    pub fn validate_batch(&self, docs: &[Document]) -> Vec<ValidationReport> {
        docs.par_iter().map(|doc| self.validate(doc)).collect()
    }
}

/// Validate with a rule set in non-strict mode.
pub fn validate(doc: &Document, rules: &RuleSet) -> ValidationReport {
    Validator::new(rules.clone()).validate(doc)
}

pub fn validate_batch(docs: &[Document], rules: &RuleSet) -> Vec<ValidationReport> {
    Validator::new(rules.clone()).validate_batch(docs)
}

/// Check a set of migration definitions on their own: unique ids, known
/// dependencies, and an acyclic dependency graph.
pub fn validate_migrations(migrations: &[Migration]) -> ValidationReport {
    let mut findings = Vec::new();

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for m in migrations {
        *counts.entry(m.id.as_str()).or_default() += 1;
    }
    for (id, n) in &counts {
        if *n > 1 {
            findings.push(Finding::error(
                RuleCode::UniqueId,
                *id,
                format!("migration id `{id}` is declared {n} times"),
            ));
        }
    }

    let mut edges: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for m in migrations {
        for dep in &m.depends_on {
            if !counts.contains_key(dep.as_str()) {
                findings.push(Finding::error(
                    RuleCode::ReferenceIntegrity,
                    &m.id,
                    format!("migration `{}` depends on unknown migration `{dep}`", m.id),
                ));
            }
        }
        edges
            .entry(m.id.clone())
            .or_default()
            .extend(m.depends_on.iter().cloned());
    }

    for cycle in graph::find_cycles(&edges) {
        let first = cycle.first().cloned().unwrap_or_default();
        findings.push(Finding::error(
            RuleCode::CircularDependency,
            first,
            format!("migration dependency cycle: {}", graph::describe(&cycle)),
        ));
    }

    ValidationReport::from_findings(findings)
}
