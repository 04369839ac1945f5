//! Identifier uniqueness.

use std::collections::BTreeMap;

use fdml_core::{Document, ElementKind};

use crate::report::{Finding, RuleCode};

const RULE: RuleCode = RuleCode::UniqueId;

pub(crate) fn check(doc: &Document) -> Vec<Finding> {
    let mut findings = Vec::new();
    collection(&mut findings, ElementKind::System, doc.systems.iter().map(|s| s.id.as_str()));
    collection(&mut findings, ElementKind::Entity, doc.entities.iter().map(|e| e.id.as_str()));
    collection(&mut findings, ElementKind::Action, doc.actions.iter().map(|a| a.id.as_str()));
    collection(&mut findings, ElementKind::Feature, doc.features.iter().map(|f| f.id.as_str()));
    collection(&mut findings, ElementKind::Flow, doc.flows.iter().map(|f| f.id.as_str()));
    collection(
        &mut findings,
        ElementKind::Constraint,
        doc.constraints.iter().map(|c| c.id.as_str()),
    );

    for entity in &doc.entities {
        for (name, n) in repeated(entity.fields.iter().map(|f| f.name.as_str())) {
            findings.push(Finding::error(
                RULE,
                &entity.id,
                format!("field `{name}` is declared {n} times in entity `{}`", entity.id),
            ));
        }
    }

    for action in &doc.actions {
        for (name, n) in repeated(action.inputs.iter().map(|p| p.name.as_str())) {
            findings.push(Finding::error(
                RULE,
                &action.id,
                format!("input `{name}` is declared {n} times in action `{}`", action.id),
            ));
        }
        for (name, n) in repeated(action.outputs.iter().map(|p| p.name.as_str())) {
            findings.push(Finding::error(
                RULE,
                &action.id,
                format!("output `{name}` is declared {n} times in action `{}`", action.id),
            ));
        }
        for (code, n) in repeated(action.exceptions.iter().map(|e| e.code.as_str())) {
            findings.push(Finding::error(
                RULE,
                &action.id,
                format!(
                    "exception code `{code}` is declared {n} times in action `{}`",
                    action.id
                ),
            ));
        }
    }

    for feature in &doc.features {
        for (name, n) in repeated(feature.scenarios.iter().map(|s| s.name.as_str())) {
            findings.push(Finding::warning(
                RULE,
                &feature.id,
                format!("scenario `{name}` appears {n} times in feature `{}`", feature.id),
            ));
        }
    }

    let keys: Vec<String> = doc.traceability.iter().map(|l| l.key()).collect();
    for (key, n) in repeated(keys.iter().map(String::as_str)) {
        let from = key.split("->").next().unwrap_or(key);
        findings.push(Finding::warning(
            RULE,
            from,
            format!("traceability link `{key}` appears {n} times"),
        ));
    }

    findings
}

fn collection<'a>(findings: &mut Vec<Finding>, kind: ElementKind, ids: impl Iterator<Item = &'a str>) {
    let ids: Vec<&str> = ids.collect();
    let empty = ids.iter().filter(|id| id.trim().is_empty()).count();
    if empty > 0 {
        findings.push(Finding::error(
            RULE,
            "",
            format!("{empty} {kind} element(s) have an empty id"),
        ));
    }
    for (id, n) in repeated(ids.into_iter().filter(|id| !id.trim().is_empty())) {
        findings.push(Finding::error(
            RULE,
            id,
            format!("{kind} id `{id}` is declared {n} times"),
        ));
    }
}

/// Values occurring more than once, with their counts, in sorted order.
fn repeated<'a>(values: impl Iterator<Item = &'a str>) -> Vec<(&'a str, usize)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for v in values {
        *counts.entry(v).or_default() += 1;
    }
    counts.into_iter().filter(|(_, n)| *n > 1).collect()
}
