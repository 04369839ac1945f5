//! Constraint applicability: a constraint's condition may only talk about
//! members of the elements it applies to.

use std::collections::BTreeSet;

use fdml_core::{Document, ElementKind};

use crate::index::ElementIndex;
use crate::report::{Finding, RuleCode};

const RULE: RuleCode = RuleCode::ConstraintApplicability;

pub(crate) fn check(doc: &Document, index: &ElementIndex) -> Vec<Finding> {
    let mut findings = Vec::new();

    for constraint in &doc.constraints {
        let id = constraint.id.as_str();
        if constraint.applies_to.is_empty() {
            findings.push(Finding::warning(
                RULE,
                id,
                format!("constraint `{id}` does not apply to any element"),
            ));
        }

        for (head, member) in references(&constraint.condition) {
            let resolved = if let Some(entity) = index.entity(&head) {
                if entity.field(&member).is_none() {
                    findings.push(Finding::error(
                        RULE,
                        id,
                        format!("condition of `{id}` references `{head}.{member}`, but entity `{head}` has no field `{member}`"),
                    ));
                }
                true
            } else if let Some(action) = index.action(&head) {
                if action.parameter(&member).is_none() {
                    findings.push(Finding::error(
                        RULE,
                        id,
                        format!("condition of `{id}` references `{head}.{member}`, but action `{head}` has no parameter `{member}`"),
                    ));
                }
                true
            } else if let Some(kind) = index.kind_of(&head) {
                findings.push(Finding::warning(
                    RULE,
                    id,
                    format!("condition of `{id}` references `{head}.{member}`, but `{head}` is a {kind}"),
                ));
                false
            } else {
                findings.push(Finding::warning(
                    RULE,
                    id,
                    format!("condition of `{id}` references `{head}.{member}`, but `{head}` is not a declared element"),
                ));
                false
            };

            if resolved && !constraint.applies_to.iter().any(|t| *t == head) {
                let kind = index.kind_of(&head).unwrap_or(ElementKind::Entity);
                findings.push(Finding::warning(
                    RULE,
                    id,
                    format!("condition of `{id}` references {kind} `{head}`, which is not in applies_to"),
                ));
            }
        }
    }

    findings
}

/// Distinct `head.member` identifier pairs in a condition, in order of
/// first appearance. Quoted strings and numbers are skipped.
fn references(condition: &str) -> Vec<(String, String)> {
    let chars: Vec<char> = condition.chars().collect();
    let mut seen = BTreeSet::new();
    let mut refs = Vec::new();
    let mut i = 0;

    let ident_start = |c: char| c.is_alphabetic() || c == '_';
    let ident_char = |c: char| c.is_alphanumeric() || c == '_';

    while i < chars.len() {
        let c = chars[i];
        if c == '"' || c == '\'' {
            i += 1;
            while i < chars.len() && chars[i] != c {
                if chars[i] == '\\' {
                    i += 1;
                }
                i += 1;
            }
            i += 1;
        } else if c.is_ascii_digit() {
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '.' || chars[i] == '_') {
                i += 1;
            }
        } else if ident_start(c) {
            let start = i;
            while i < chars.len() && ident_char(chars[i]) {
                i += 1;
            }
            let head: String = chars[start..i].iter().collect();
            if i + 1 < chars.len() && chars[i] == '.' && ident_start(chars[i + 1]) {
                let m = i + 1;
                i = m;
                while i < chars.len() && ident_char(chars[i]) {
                    i += 1;
                }
                let member: String = chars[m..i].iter().collect();
                // a.b.c: only the first hop is checked
                while i + 1 < chars.len() && chars[i] == '.' && ident_start(chars[i + 1]) {
                    i += 1;
                    while i < chars.len() && ident_char(chars[i]) {
                        i += 1;
                    }
                }
                if seen.insert((head.clone(), member.clone())) {
                    refs.push((head, member));
                }
            }
        } else {
            i += 1;
        }
    }
    refs
}

#[cfg(test)]
mod tests {
    use super::*;
    use fdml_core::{Action, Constraint, DataType, Entity, Feature, Field, Parameter};

    fn doc_with(constraint: Constraint) -> Document {
        let mut doc = Document::new();
        doc.entities.push(
            Entity::new("user")
                .with_field(Field::new("age", DataType::Integer))
                .with_field(Field::new("email", DataType::String)),
        );
        let mut transfer = Action::new("transfer");
        transfer.inputs.push(Parameter::new("amount", DataType::Float));
        doc.actions.push(transfer);
        doc.features.push(Feature::new("signup", "Signup"));
        doc.constraints.push(constraint);
        doc
    }

    fn run(doc: &Document) -> Vec<Finding> {
        check(doc, &ElementIndex::build(doc))
    }

    fn applies(id: &str, condition: &str, targets: &[&str]) -> Constraint {
        let mut c = Constraint::new(id, condition);
        c.applies_to = targets.iter().map(|t| t.to_string()).collect();
        c
    }

    #[test]
    fn extracts_member_references() {
        let refs = references(r#"user.age >= 18 && user.email != "a.b" && 1.5 < transfer.amount && user.age > 0"#);
        assert_eq!(
            refs,
            vec![
                ("user".to_string(), "age".to_string()),
                ("user".to_string(), "email".to_string()),
                ("transfer".to_string(), "amount".to_string()),
            ]
        );
    }

    #[test]
    fn resolved_references_are_clean() {
        let doc = doc_with(applies("adult", "user.age >= 18", &["user"]));
        assert!(run(&doc).is_empty());
    }

    #[test]
    fn missing_field_is_error() {
        let doc = doc_with(applies("c", "user.height > 0 && transfer.fee < 1", &["user", "transfer"]));
        let findings = run(&doc);
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().all(Finding::is_error));
        assert!(findings[0].message.contains("no field `height`"));
        assert!(findings[1].message.contains("no parameter `fee`"));
    }

    #[test]
    fn outside_applies_to_warns() {
        let doc = doc_with(applies("c", "transfer.amount > 0", &["user"]));
        let findings = run(&doc);
        assert_eq!(findings.len(), 1);
        assert!(!findings[0].is_error());
        assert!(findings[0].message.contains("not in applies_to"));
    }

    #[test]
    fn unresolvable_heads_warn() {
        let doc = doc_with(applies("c", "signup.done && config.limit > 3", &["user"]));
        let findings = run(&doc);
        assert_eq!(findings.len(), 2);
        assert!(findings[0].message.contains("is a feature"));
        assert!(findings[1].message.contains("not a declared element"));
        assert!(findings.iter().all(|f| !f.is_error()));
    }

    #[test]
    fn empty_applies_to_warns() {
        let doc = doc_with(applies("c", "true", &[]));
        let findings = run(&doc);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("does not apply"));
    }
}
