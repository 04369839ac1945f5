//! Type consistency of field and parameter declarations.

use std::collections::BTreeSet;

use fdml_core::{DataType, Document, FieldConstraint, Value};
use regex::Regex;

use crate::report::{Finding, RuleCode};

const RULE: RuleCode = RuleCode::TypeConsistency;

pub(crate) fn check(doc: &Document) -> Vec<Finding> {
    let mut findings = Vec::new();

    for entity in &doc.entities {
        for field in &entity.fields {
            let owner = format!("field `{}.{}`", entity.id, field.name);
            data_type(&mut findings, &entity.id, &owner, &field.data_type);
            constraints(&mut findings, &entity.id, &owner, &field.data_type, &field.constraints);
            if let Some(default) = &field.default {
                default_value(&mut findings, &entity.id, &owner, &field.data_type, default);
            }
        }
    }

    for action in &doc.actions {
        for (role, params) in [("input", &action.inputs), ("output", &action.outputs)] {
            for param in params {
                let owner = format!("{role} `{}.{}`", action.id, param.name);
                data_type(&mut findings, &action.id, &owner, &param.data_type);
            }
        }
    }

    findings
}

/// Enum well-formedness, recursing through arrays and objects.
fn data_type(findings: &mut Vec<Finding>, element: &str, owner: &str, ty: &DataType) {
    match ty {
        DataType::Enum(values) if values.is_empty() => {
            findings.push(Finding::error(
                RULE,
                element,
                format!("{owner} declares an enum with no values"),
            ));
        }
        DataType::Enum(values) => {
            let mut seen = BTreeSet::new();
            let dupes: BTreeSet<&str> = values
                .iter()
                .filter(|v| !seen.insert(v.as_str()))
                .map(String::as_str)
                .collect();
            for v in dupes {
                findings.push(Finding::warning(
                    RULE,
                    element,
                    format!("{owner} lists enum value `{v}` more than once"),
                ));
            }
        }
        DataType::Array(inner) => data_type(findings, element, owner, inner),
        DataType::Object(fields) => {
            for inner in fields.values() {
                data_type(findings, element, owner, inner);
            }
        }
        _ => {}
    }
}

fn constraints(
    findings: &mut Vec<Finding>,
    element: &str,
    owner: &str,
    ty: &DataType,
    constraints: &[FieldConstraint],
) {
    let mut min_length = None;
    let mut max_length = None;
    let mut min_value = None;
    let mut max_value = None;

    for c in constraints {
        if !ty.supports(c) {
            findings.push(Finding::error(
                RULE,
                element,
                format!(
                    "{owner} has type `{ty}`, which does not support `{}`",
                    c.keyword()
                ),
            ));
            continue;
        }
        match c {
            FieldConstraint::Pattern(p) => {
                if let Err(e) = Regex::new(p) {
                    findings.push(Finding::error(
                        RULE,
                        element,
                        format!("{owner} has an invalid pattern `{p}`: {e}"),
                    ));
                }
            }
            FieldConstraint::MinLength(n) => min_length = Some(*n),
            FieldConstraint::MaxLength(n) => max_length = Some(*n),
            FieldConstraint::MinValue(n) => min_value = Some(*n),
            FieldConstraint::MaxValue(n) => max_value = Some(*n),
            FieldConstraint::Unique | FieldConstraint::Nullable => {}
        }
    }

    if let (Some(min), Some(max)) = (min_length, max_length) {
        if min > max {
            findings.push(Finding::warning(
                RULE,
                element,
                format!("{owner} has min_length {min} greater than max_length {max}"),
            ));
        }
    }
    if let (Some(min), Some(max)) = (min_value, max_value) {
        if min > max {
            findings.push(Finding::warning(
                RULE,
                element,
                format!("{owner} has min_value {min} greater than max_value {max}"),
            ));
        }
    }
}

fn default_value(findings: &mut Vec<Finding>, element: &str, owner: &str, ty: &DataType, value: &Value) {
    if !ty.accepts(value) {
        findings.push(Finding::error(
            RULE,
            element,
            format!(
                "{owner} has type `{ty}` but its default is a {}",
                value.kind()
            ),
        ));
    }
}
