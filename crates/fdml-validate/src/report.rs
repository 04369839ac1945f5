//! Validation report with deterministic finding order.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Severity level for findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Warning => write!(f, "WARN"),
        }
    }
}

/// Stable rule codes. Declaration order is report priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleCode {
    UniqueId,
    ReferenceIntegrity,
    TypeConsistency,
    CircularDependency,
    ConstraintApplicability,
}

impl RuleCode {
    pub const ALL: [RuleCode; 5] = [
        RuleCode::UniqueId,
        RuleCode::ReferenceIntegrity,
        RuleCode::TypeConsistency,
        RuleCode::CircularDependency,
        RuleCode::ConstraintApplicability,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleCode::UniqueId => "unique-id",
            RuleCode::ReferenceIntegrity => "reference-integrity",
            RuleCode::TypeConsistency => "type-consistency",
            RuleCode::CircularDependency => "circular-dependency",
            RuleCode::ConstraintApplicability => "constraint-applicability",
        }
    }
}

impl fmt::Display for RuleCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One semantic finding about one element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    #[serde(rename = "rule_code")]
    pub rule: RuleCode,
    pub element_id: String,
    pub message: String,
}

impl Finding {
    pub fn error(rule: RuleCode, element_id: impl Into<String>, message: impl Into<String>) -> Self {
        Finding {
            severity: Severity::Error,
            rule,
            element_id: element_id.into(),
            message: message.into(),
        }
    }

    pub fn warning(
        rule: RuleCode,
        element_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Finding {
            severity: Severity::Warning,
            ..Finding::error(rule, element_id, message)
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// The complete set of findings from one validator run.
///
/// Findings are grouped by rule code in priority order, then sorted by
/// element id. Findings with the same rule and element keep the order in
/// which the rule produced them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationReport {
    findings: Vec<Finding>,
}

impl ValidationReport {
    pub fn from_findings(mut findings: Vec<Finding>) -> Self {
        findings.sort_by(|a, b| (a.rule, &a.element_id).cmp(&(b.rule, &b.element_id)));
        Self { findings }
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn errors(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(|f| f.severity == Severity::Warning)
    }

    pub fn has_errors(&self) -> bool {
        self.findings.iter().any(Finding::is_error)
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }

    /// Findings for one rule, in report order.
    pub fn by_rule(&self, rule: RuleCode) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.rule == rule)
    }

    /// Turn every warning into an error.
    pub fn promote_warnings(&mut self) {
        for finding in &mut self.findings {
            finding.severity = Severity::Error;
        }
    }

    /// Pretty JSON list of `{severity, rule_code, element_id, message}`.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Validation Report ===")?;
        writeln!(
            f,
            "Errors: {} | Warnings: {}",
            self.errors().count(),
            self.warnings().count()
        )?;
        if self.findings.is_empty() {
            writeln!(f, "No findings.")?;
        } else {
            writeln!(f, "--- Findings ---")?;
            for finding in &self.findings {
                writeln!(
                    f,
                    "[{}] {} {}: {}",
                    finding.severity, finding.rule, finding.element_id, finding.message
                )?;
            }
        }
        Ok(())
    }
}
