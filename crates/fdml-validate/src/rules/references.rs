//! Reference integrity: every id an element points at must resolve to an
//! element of the expected kind.

use fdml_core::{Document, ElementKind};

use crate::index::ElementIndex;
use crate::report::{Finding, RuleCode};

const RULE: RuleCode = RuleCode::ReferenceIntegrity;

pub(crate) fn check(doc: &Document, index: &ElementIndex) -> Vec<Finding> {
    let mut findings = Vec::new();

    for flow in &doc.flows {
        for (i, step) in flow.steps.iter().enumerate() {
            let targets = [
                ("action", Some(&step.action)),
                ("on_success", step.on_success.as_ref()),
                ("on_failure", step.on_failure.as_ref()),
            ];
            for (role, target) in targets {
                let Some(target) = target else { continue };
                if !index.has_action(target) {
                    findings.push(Finding::error(
                        RULE,
                        &flow.id,
                        format!(
                            "step {} of flow `{}` has {role} `{target}`, which is not a declared action{}",
                            i + 1,
                            flow.id,
                            kind_hint(index, target, ElementKind::Action)
                        ),
                    ));
                }
            }
        }
    }

    for constraint in &doc.constraints {
        for target in &constraint.applies_to {
            let resolves = index.entity(target).is_some() || index.has_action(target);
            if !resolves {
                findings.push(Finding::error(
                    RULE,
                    &constraint.id,
                    format!(
                        "constraint `{}` applies to `{target}`, which is not a declared entity or action{}",
                        constraint.id,
                        kind_hint(index, target, ElementKind::Action)
                    ),
                ));
            }
        }
    }

    for link in &doc.traceability {
        for (end, id) in [("source", &link.from), ("target", &link.to)] {
            if !index.contains(id) {
                findings.push(Finding::error(
                    RULE,
                    &link.from,
                    format!(
                        "traceability link `{}` has unknown {end} `{id}`",
                        link.key()
                    ),
                ));
            }
        }
    }

    for feature in &doc.features {
        for scenario in &feature.scenarios {
            if let Some(action) = &scenario.action {
                if !index.has_action(action) {
                    findings.push(Finding::error(
                        RULE,
                        &feature.id,
                        format!(
                            "scenario `{}` of feature `{}` links to `{action}`, which is not a declared action{}",
                            scenario.name,
                            feature.id,
                            kind_hint(index, action, ElementKind::Action)
                        ),
                    ));
                }
            }
        }
        for dep in &feature.depends_on {
            if !index.has_feature(dep) {
                findings.push(Finding::error(
                    RULE,
                    &feature.id,
                    format!(
                        "feature `{}` depends on `{dep}`, which is not a declared feature",
                        feature.id
                    ),
                ));
            }
        }
    }

    for entity in &doc.entities {
        for idx in &entity.indexes {
            for field in &idx.fields {
                if entity.field(field).is_none() {
                    findings.push(Finding::error(
                        RULE,
                        &entity.id,
                        format!(
                            "index on entity `{}` names unknown field `{field}`",
                            entity.id
                        ),
                    ));
                }
            }
        }
        for rel in &entity.relationships {
            if index.entity(&rel.entity).is_none() {
                findings.push(Finding::error(
                    RULE,
                    &entity.id,
                    format!(
                        "entity `{}` has a `{}` relationship to `{}`, which is not a declared entity{}",
                        entity.id,
                        rel.kind,
                        rel.entity,
                        kind_hint(index, &rel.entity, ElementKind::Entity)
                    ),
                ));
            }
        }
    }

    for system in &doc.systems {
        for rel in &system.relationships {
            for end in [&rel.from, &rel.to] {
                let known = system.components.contains(end) || index.contains(end);
                if !known {
                    findings.push(Finding::warning(
                        RULE,
                        &system.id,
                        format!(
                            "relationship `{} -> {}` in system `{}` names `{end}`, which is neither a component nor a declared element",
                            rel.from, rel.to, system.id
                        ),
                    ));
                }
            }
        }
    }

    findings
}

/// ` (it is a feature)` when the id exists under another kind.
fn kind_hint(index: &ElementIndex, id: &str, expected: ElementKind) -> String {
    match index.kind_of(id) {
        Some(kind) if kind != expected => {
            let kind = kind.to_string();
            let article = if kind.starts_with(['a', 'e', 'i', 'o', 'u']) { "an" } else { "a" };
            format!(" (it is {article} {kind})")
        }
        _ => String::new(),
    }
}
