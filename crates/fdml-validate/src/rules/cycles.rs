//! Circular dependencies in flow transitions and feature dependencies.

use std::collections::BTreeMap;

use fdml_core::Document;

use crate::graph::{describe, find_cycles};
use crate::report::{Finding, RuleCode};

const RULE: RuleCode = RuleCode::CircularDependency;

pub(crate) fn check(doc: &Document) -> Vec<Finding> {
    let mut findings = Vec::new();

    for flow in &doc.flows {
        let mut edges: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for step in &flow.steps {
            let targets = edges.entry(step.action.clone()).or_default();
            for next in [&step.on_success, &step.on_failure].into_iter().flatten() {
                if !targets.contains(next) {
                    targets.push(next.clone());
                }
            }
        }
        for cycle in find_cycles(&edges) {
            findings.push(Finding::error(
                RULE,
                &flow.id,
                format!("flow `{}` has a transition cycle: {}", flow.id, describe(&cycle)),
            ));
        }
    }

    let deps: BTreeMap<String, Vec<String>> = doc
        .features
        .iter()
        .map(|f| (f.id.clone(), f.depends_on.clone()))
        .collect();
    for cycle in find_cycles(&deps) {
        let first = cycle.first().cloned().unwrap_or_default();
        findings.push(Finding::error(
            RULE,
            first,
            format!("feature dependency cycle: {}", describe(&cycle)),
        ));
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use fdml_core::{Feature, Flow, FlowStep};

    #[test]
    fn flow_transition_cycle() {
        let mut doc = Document::new();
        doc.flows.push(Flow {
            id: "checkout".into(),
            name: None,
            description: None,
            steps: vec![
                FlowStep {
                    action: "charge".into(),
                    on_success: Some("ship".into()),
                    on_failure: Some("retry".into()),
                },
                FlowStep {
                    action: "retry".into(),
                    on_success: None,
                    on_failure: Some("charge".into()),
                },
            ],
        });
        let findings = check(&doc);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].element_id, "checkout");
        assert!(findings[0].message.ends_with("charge -> retry -> charge"));
    }

    #[test]
    fn linear_flow_is_fine() {
        let mut doc = Document::new();
        doc.flows.push(Flow {
            id: "f".into(),
            name: None,
            description: None,
            steps: vec![FlowStep::new("a"), FlowStep::new("b")],
        });
        assert!(check(&doc).is_empty());
    }

    #[test]
    fn feature_cycle() {
        let mut doc = Document::new();
        let mut a = Feature::new("billing", "Billing");
        a.depends_on.push("accounts".into());
        let mut b = Feature::new("accounts", "Accounts");
        b.depends_on.push("billing".into());
        doc.features.extend([a, b]);
        let findings = check(&doc);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].element_id, "accounts");
        assert!(findings[0].message.contains("accounts -> billing -> accounts"));
    }
}
