//! Operation interpreter.
//!
//! Operations are applied optimistically: each one checks only that its
//! target exists (or does not, for adds). Whether the resulting document
//! still makes sense is the validator's job, run after the whole list.
//!
//! Added elements are appended to the end of their collection. A patch that
//! removes or alters a field, parameter, exception, or scenario that is not
//! there skips that part with a warning; the rest of the patch still applies.
//! A patch that adds a name already present appends it anyway, leaving a
//! duplicate for the validator to reject.

use fdml_core::{
    ActionPatch, ConstraintPatch, Document, ElementKind, EntityPatch, FeaturePatch,
    FieldAlteration, Operation, Parameter,
};

use crate::error::OperationError;

type Result<T> = std::result::Result<T, OperationError>;

/// Apply one operation in place.
pub fn apply_operation(doc: &mut Document, op: &Operation) -> Result<()> {
    match op {
        Operation::AddFeature { feature } => {
            absent(doc.feature(&feature.id).is_some(), ElementKind::Feature, &feature.id)?;
            doc.features.push(feature.clone());
        }
        Operation::RemoveFeature { id } => {
            let pos = position(doc.features.iter().map(|f| &f.id), ElementKind::Feature, id)?;
            doc.features.remove(pos);
        }
        Operation::ModifyFeature { id, patch } => {
            let feature = doc.feature_mut(id).ok_or_else(|| missing(ElementKind::Feature, id))?;
            patch_feature(feature, patch);
        }

        Operation::AddEntity { entity } => {
            absent(doc.entity(&entity.id).is_some(), ElementKind::Entity, &entity.id)?;
            doc.entities.push(entity.clone());
        }
        Operation::RemoveEntity { id } => {
            let pos = position(doc.entities.iter().map(|e| &e.id), ElementKind::Entity, id)?;
            doc.entities.remove(pos);
        }
        Operation::ModifyEntity { id, patch } => {
            let entity = doc.entity_mut(id).ok_or_else(|| missing(ElementKind::Entity, id))?;
            patch_entity(entity, patch);
        }

        Operation::AddAction { action } => {
            absent(doc.action(&action.id).is_some(), ElementKind::Action, &action.id)?;
            doc.actions.push(action.clone());
        }
        Operation::RemoveAction { id } => {
            let pos = position(doc.actions.iter().map(|a| &a.id), ElementKind::Action, id)?;
            doc.actions.remove(pos);
        }
        Operation::ModifyAction { id, patch } => {
            let action = doc.action_mut(id).ok_or_else(|| missing(ElementKind::Action, id))?;
            patch_action(action, patch);
        }

        Operation::AddConstraint { constraint } => {
            absent(
                doc.constraint(&constraint.id).is_some(),
                ElementKind::Constraint,
                &constraint.id,
            )?;
            doc.constraints.push(constraint.clone());
        }
        Operation::RemoveConstraint { id } => {
            let pos = position(
                doc.constraints.iter().map(|c| &c.id),
                ElementKind::Constraint,
                id,
            )?;
            doc.constraints.remove(pos);
        }
        Operation::ModifyConstraint { id, patch } => {
            let constraint = doc
                .constraint_mut(id)
                .ok_or_else(|| missing(ElementKind::Constraint, id))?;
            patch_constraint(constraint, patch);
        }

        Operation::AddTraceabilityLink { link } => {
            let exists = doc
                .traceability
                .iter()
                .any(|l| l.matches(&link.from, &link.to, link.relation));
            absent(exists, ElementKind::Traceability, &link.key())?;
            doc.traceability.push(link.clone());
        }
        Operation::RemoveTraceabilityLink { from, to, relation } => {
            let pos = doc
                .traceability
                .iter()
                .position(|l| l.matches(from, to, *relation))
                .ok_or_else(|| missing(ElementKind::Traceability, &op.target()))?;
            doc.traceability.remove(pos);
        }
    }
    Ok(())
}

/// Apply operations in order, stopping at the first failure. On failure the
/// document holds the effects of the operations before it, so callers work
/// on a copy.
pub fn apply_operations(
    doc: &mut Document,
    ops: &[Operation],
) -> std::result::Result<(), (usize, OperationError)> {
    ops.iter()
        .enumerate()
        .try_for_each(|(i, op)| apply_operation(doc, op).map_err(|e| (i, e)))
}

fn missing(kind: ElementKind, id: &str) -> OperationError {
    OperationError::NotFound {
        kind,
        id: id.to_string(),
    }
}

fn absent(exists: bool, kind: ElementKind, id: &str) -> Result<()> {
    if exists {
        return Err(OperationError::AlreadyExists {
            kind,
            id: id.to_string(),
        });
    }
    Ok(())
}

fn position<'a>(
    mut ids: impl Iterator<Item = &'a String>,
    kind: ElementKind,
    id: &str,
) -> Result<usize> {
    ids.position(|x| x == id).ok_or_else(|| missing(kind, id))
}

fn patch_entity(entity: &mut fdml_core::Entity, patch: &EntityPatch) {
    if let Some(name) = &patch.name {
        entity.name = Some(name.clone());
    }
    if let Some(description) = &patch.description {
        entity.description = Some(description.clone());
    }
    for name in &patch.remove_fields {
        let before = entity.fields.len();
        entity.fields.retain(|f| &f.name != name);
        if entity.fields.len() == before {
            tracing::warn!(entity = %entity.id, field = %name, "field to remove not found, skipped");
        }
    }
    for alteration in &patch.alter_fields {
        alter_field(entity, alteration);
    }
    entity.fields.extend(patch.add_fields.iter().cloned());
}

fn alter_field(entity: &mut fdml_core::Entity, alteration: &FieldAlteration) {
    let Some(field) = entity.fields.iter_mut().find(|f| f.name == alteration.name) else {
        tracing::warn!(
            entity = %entity.id,
            field = %alteration.name,
            "field to alter not found, skipped"
        );
        return;
    };
    if let Some(name) = &alteration.rename {
        field.name = name.clone();
    }
    if let Some(data_type) = &alteration.data_type {
        field.data_type = data_type.clone();
    }
    if let Some(required) = alteration.required {
        field.required = required;
    }
    if let Some(default) = &alteration.default {
        field.default = Some(default.clone());
    }
    if let Some(description) = &alteration.description {
        field.description = Some(description.clone());
    }
    if let Some(constraints) = &alteration.constraints {
        field.constraints = constraints.clone();
    }
}

fn patch_action(action: &mut fdml_core::Action, patch: &ActionPatch) {
    if let Some(name) = &patch.name {
        action.name = Some(name.clone());
    }
    if let Some(description) = &patch.description {
        action.description = Some(description.clone());
    }
    if let Some(logic) = &patch.logic {
        action.logic = Some(logic.clone());
    }
    let id = action.id.clone();
    params(&id, "input", &mut action.inputs, &patch.remove_inputs, &patch.add_inputs);
    params(&id, "output", &mut action.outputs, &patch.remove_outputs, &patch.add_outputs);

    for code in &patch.remove_exceptions {
        let before = action.exceptions.len();
        action.exceptions.retain(|e| &e.code != code);
        if action.exceptions.len() == before {
            tracing::warn!(action = %id, code = %code, "exception to remove not found, skipped");
        }
    }
    action.exceptions.extend(patch.add_exceptions.iter().cloned());
}

fn params(action: &str, role: &str, list: &mut Vec<Parameter>, remove: &[String], add: &[Parameter]) {
    for name in remove {
        let before = list.len();
        list.retain(|p| &p.name != name);
        if list.len() == before {
            tracing::warn!(action, role, parameter = %name, "parameter to remove not found, skipped");
        }
    }
    list.extend(add.iter().cloned());
}

fn patch_feature(feature: &mut fdml_core::Feature, patch: &FeaturePatch) {
    if let Some(title) = &patch.title {
        feature.title = title.clone();
    }
    if let Some(description) = &patch.description {
        feature.description = Some(description.clone());
    }
    for name in &patch.remove_scenarios {
        let before = feature.scenarios.len();
        feature.scenarios.retain(|s| &s.name != name);
        if feature.scenarios.len() == before {
            tracing::warn!(feature = %feature.id, scenario = %name, "scenario to remove not found, skipped");
        }
    }
    feature.scenarios.extend(patch.add_scenarios.iter().cloned());
}

fn patch_constraint(constraint: &mut fdml_core::Constraint, patch: &ConstraintPatch) {
    if let Some(name) = &patch.name {
        constraint.name = Some(name.clone());
    }
    if let Some(description) = &patch.description {
        constraint.description = Some(description.clone());
    }
    if let Some(applies_to) = &patch.applies_to {
        constraint.applies_to = applies_to.clone();
    }
    if let Some(condition) = &patch.condition {
        constraint.condition = condition.clone();
    }
    if let Some(message) = &patch.message {
        constraint.message = Some(message.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fdml_core::{
        Action, ActionException, Constraint, DataType, Entity, Feature, Field, Relation,
        TraceabilityLink,
    };

    fn base() -> Document {
        let mut doc = Document::new();
        doc.entities.push(
            Entity::new("user")
                .with_field(Field::new("email", DataType::String))
                .with_field(Field::new("age", DataType::Integer)),
        );
        doc.actions.push(Action::new("login"));
        doc
    }

    #[test]
    fn add_and_remove_entity() {
        let mut doc = base();
        apply_operation(&mut doc, &Operation::AddEntity { entity: Entity::new("order") }).unwrap();
        assert_eq!(doc.entities.last().map(|e| e.id.as_str()), Some("order"));

        let err = apply_operation(&mut doc, &Operation::AddEntity { entity: Entity::new("order") })
            .unwrap_err();
        assert_eq!(
            err,
            OperationError::AlreadyExists {
                kind: ElementKind::Entity,
                id: "order".into()
            }
        );

        apply_operation(&mut doc, &Operation::RemoveEntity { id: "order".into() }).unwrap();
        let err = apply_operation(&mut doc, &Operation::RemoveEntity { id: "order".into() })
            .unwrap_err();
        assert!(matches!(err, OperationError::NotFound { .. }));
    }

    #[test]
    fn modify_entity_patch() {
        let mut doc = base();
        let patch = EntityPatch {
            add_fields: vec![Field::new("name", DataType::String)],
            remove_fields: vec!["age".into(), "missing".into()],
            alter_fields: vec![FieldAlteration {
                name: "email".into(),
                rename: Some("email_address".into()),
                required: Some(true),
                ..FieldAlteration::default()
            }],
            ..EntityPatch::default()
        };
        apply_operation(&mut doc, &Operation::ModifyEntity { id: "user".into(), patch }).unwrap();
        let names: Vec<&str> = doc.entities[0].fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["email_address", "name"]);
        assert!(doc.entities[0].fields[0].required);
    }

    #[test]
    fn conflicting_adds_are_kept_for_validation() {
        let mut doc = base();
        doc.actions[0].inputs.push(Parameter::new("email", DataType::String));
        doc.actions[0].exceptions.push(ActionException {
            code: "LOCKED".into(),
            message: None,
        });
        let ops = vec![
            Operation::ModifyEntity {
                id: "user".into(),
                patch: EntityPatch {
                    add_fields: vec![Field::new("email", DataType::Integer)],
                    ..EntityPatch::default()
                },
            },
            Operation::ModifyAction {
                id: "login".into(),
                patch: ActionPatch {
                    add_inputs: vec![Parameter::new("email", DataType::Uuid)],
                    add_exceptions: vec![ActionException {
                        code: "LOCKED".into(),
                        message: Some("again".into()),
                    }],
                    ..ActionPatch::default()
                },
            },
        ];
        apply_operations(&mut doc, &ops).unwrap();

        let emails: Vec<&DataType> = doc.entities[0]
            .fields
            .iter()
            .filter(|f| f.name == "email")
            .map(|f| &f.data_type)
            .collect();
        assert_eq!(emails, vec![&DataType::String, &DataType::Integer]);
        assert_eq!(doc.actions[0].inputs.len(), 2);
        assert_eq!(doc.actions[0].exceptions.len(), 2);

        let report = fdml_validate::validate(&doc, &fdml_validate::RuleSet::all());
        let flagged: Vec<&str> = report
            .errors()
            .map(|f| f.element_id.as_str())
            .collect();
        assert!(flagged.contains(&"user"), "{report}");
        assert!(flagged.contains(&"login"), "{report}");
    }

    #[test]
    fn modify_missing_target_fails() {
        let mut doc = base();
        let err = apply_operation(
            &mut doc,
            &Operation::ModifyEntity {
                id: "ghost".into(),
                patch: EntityPatch::default(),
            },
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "entity 'ghost' does not exist");
    }

    #[test]
    fn action_and_constraint_patches() {
        let mut doc = base();
        doc.constraints.push(Constraint::new("adult", "user.age >= 18"));
        let ops = vec![
            Operation::ModifyAction {
                id: "login".into(),
                patch: ActionPatch {
                    add_inputs: vec![Parameter::new("email", DataType::String)],
                    logic: Some("check password".into()),
                    ..ActionPatch::default()
                },
            },
            Operation::ModifyConstraint {
                id: "adult".into(),
                patch: ConstraintPatch {
                    applies_to: Some(vec!["user".into()]),
                    ..ConstraintPatch::default()
                },
            },
        ];
        apply_operations(&mut doc, &ops).unwrap();
        assert_eq!(doc.actions[0].inputs.len(), 1);
        assert_eq!(doc.actions[0].logic.as_deref(), Some("check password"));
        assert_eq!(doc.constraints[0].applies_to, vec!["user".to_string()]);
    }

    #[test]
    fn traceability_links() {
        let mut doc = base();
        let link = TraceabilityLink::new("login", "user", Relation::DependsOn);
        apply_operation(&mut doc, &Operation::AddTraceabilityLink { link: link.clone() }).unwrap();
        assert!(apply_operation(&mut doc, &Operation::AddTraceabilityLink { link }).is_err());
        let remove = Operation::RemoveTraceabilityLink {
            from: "login".into(),
            to: "user".into(),
            relation: Relation::DependsOn,
        };
        apply_operation(&mut doc, &remove).unwrap();
        assert!(doc.traceability.is_empty());
        assert!(apply_operation(&mut doc, &remove).is_err());
    }

    #[test]
    fn failure_reports_index() {
        let mut doc = base();
        let ops = vec![
            Operation::AddFeature {
                feature: Feature::new("signup", "Signup"),
            },
            Operation::RemoveAction { id: "ghost".into() },
            Operation::RemoveEntity { id: "user".into() },
        ];
        let (index, err) = apply_operations(&mut doc, &ops).unwrap_err();
        assert_eq!(index, 1);
        assert!(matches!(err, OperationError::NotFound { kind: ElementKind::Action, .. }));
        // later operations never ran
        assert!(doc.entity("user").is_some());
    }
}
