//! Migration definitions: versioned, reversible change-sets over a document.
//!
//! Migrations and their operations are immutable once loaded. Applying them
//! is the migration engine's job; this module only describes them.

use serde::{Deserialize, Serialize};

use crate::model::{
    Action, ActionException, Constraint, Entity, Feature, Field, Parameter, Relation, Scenario,
    TraceabilityLink,
};
use crate::types::{DataType, FieldConstraint, Value};

/// A change-set with forward (`up`) and inverse (`down`) operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Migration {
    /// Ordering key, typically timestamp-prefixed.
    pub id: String,
    pub author: Option<String>,
    pub date: Option<String>,
    pub description: Option<String>,
    pub up: Vec<Operation>,
    pub down: Vec<Operation>,
    /// Ids of migrations that must be applied first.
    pub depends_on: Vec<String>,
}

impl Migration {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            author: None,
            date: None,
            description: None,
            up: Vec::new(),
            down: Vec::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn up(mut self, op: Operation) -> Self {
        self.up.push(op);
        self
    }

    pub fn down(mut self, op: Operation) -> Self {
        self.down.push(op);
        self
    }

    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.depends_on.push(id.into());
        self
    }
}

/// A primitive change to a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    AddFeature { feature: Feature },
    RemoveFeature { id: String },
    ModifyFeature { id: String, patch: FeaturePatch },
    AddEntity { entity: Entity },
    RemoveEntity { id: String },
    ModifyEntity { id: String, patch: EntityPatch },
    AddAction { action: Action },
    RemoveAction { id: String },
    ModifyAction { id: String, patch: ActionPatch },
    AddConstraint { constraint: Constraint },
    RemoveConstraint { id: String },
    ModifyConstraint { id: String, patch: ConstraintPatch },
    AddTraceabilityLink { link: TraceabilityLink },
    RemoveTraceabilityLink {
        from: String,
        to: String,
        relation: Relation,
    },
}

impl Operation {
    /// The keyword naming this operation in migration files.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::AddFeature { .. } => "add_feature",
            Operation::RemoveFeature { .. } => "remove_feature",
            Operation::ModifyFeature { .. } => "modify_feature",
            Operation::AddEntity { .. } => "add_entity",
            Operation::RemoveEntity { .. } => "remove_entity",
            Operation::ModifyEntity { .. } => "modify_entity",
            Operation::AddAction { .. } => "add_action",
            Operation::RemoveAction { .. } => "remove_action",
            Operation::ModifyAction { .. } => "modify_action",
            Operation::AddConstraint { .. } => "add_constraint",
            Operation::RemoveConstraint { .. } => "remove_constraint",
            Operation::ModifyConstraint { .. } => "modify_constraint",
            Operation::AddTraceabilityLink { .. } => "add_traceability_link",
            Operation::RemoveTraceabilityLink { .. } => "remove_traceability_link",
        }
    }

    /// The id of the element this operation targets.
    pub fn target(&self) -> String {
        match self {
            Operation::AddFeature { feature } => feature.id.clone(),
            Operation::AddEntity { entity } => entity.id.clone(),
            Operation::AddAction { action } => action.id.clone(),
            Operation::AddConstraint { constraint } => constraint.id.clone(),
            Operation::AddTraceabilityLink { link } => link.key(),
            Operation::RemoveTraceabilityLink { from, to, relation } => {
                format!("{from}->{to}:{relation}")
            }
            Operation::RemoveFeature { id }
            | Operation::ModifyFeature { id, .. }
            | Operation::RemoveEntity { id }
            | Operation::ModifyEntity { id, .. }
            | Operation::RemoveAction { id }
            | Operation::ModifyAction { id, .. }
            | Operation::RemoveConstraint { id }
            | Operation::ModifyConstraint { id, .. } => id.clone(),
        }
    }
}

/// Every operation keyword, for diagnostics.
pub const OPERATION_NAMES: &[&str] = &[
    "add_feature",
    "remove_feature",
    "modify_feature",
    "add_entity",
    "remove_entity",
    "modify_entity",
    "add_action",
    "remove_action",
    "modify_action",
    "add_constraint",
    "remove_constraint",
    "modify_constraint",
    "add_traceability_link",
    "remove_traceability_link",
];

/// Partial update of an entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub add_fields: Vec<Field>,
    pub remove_fields: Vec<String>,
    pub alter_fields: Vec<FieldAlteration>,
}

/// In-place change to one existing field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldAlteration {
    pub name: String,
    pub rename: Option<String>,
    pub data_type: Option<DataType>,
    pub required: Option<bool>,
    pub default: Option<Value>,
    pub description: Option<String>,
    pub constraints: Option<Vec<FieldConstraint>>,
}

/// Partial update of an action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub logic: Option<String>,
    pub add_inputs: Vec<Parameter>,
    pub remove_inputs: Vec<String>,
    pub add_outputs: Vec<Parameter>,
    pub remove_outputs: Vec<String>,
    pub add_exceptions: Vec<ActionException>,
    pub remove_exceptions: Vec<String>,
}

/// Partial update of a feature.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeaturePatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub add_scenarios: Vec<Scenario>,
    pub remove_scenarios: Vec<String>,
}

/// Partial update of a top-level constraint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub applies_to: Option<Vec<String>>,
    pub condition: Option<String>,
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_names_cover_every_variant() {
        let ops = vec![
            Operation::AddEntity {
                entity: Entity::new("order"),
            },
            Operation::RemoveEntity { id: "order".into() },
            Operation::RemoveTraceabilityLink {
                from: "a".into(),
                to: "b".into(),
                relation: Relation::Tests,
            },
        ];
        for op in &ops {
            assert!(OPERATION_NAMES.contains(&op.name()));
        }
        assert_eq!(ops[0].target(), "order");
        assert_eq!(ops[2].target(), "a->b:tests");
    }

    #[test]
    fn builder_methods() {
        let m = Migration::new("002_orders")
            .depends_on("001_users")
            .up(Operation::AddEntity {
                entity: Entity::new("order"),
            })
            .down(Operation::RemoveEntity { id: "order".into() });
        assert_eq!(m.depends_on, vec!["001_users".to_string()]);
        assert_eq!(m.up.len(), 1);
        assert_eq!(m.down.len(), 1);
    }

    #[test]
    fn operations_serialize_with_tag() {
        let op = Operation::RemoveFeature { id: "login".into() };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["op"], "remove_feature");
        let back: Operation = serde_json::from_value(json).unwrap();
        assert_eq!(back, op);
    }
}
