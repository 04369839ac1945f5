//! The specification document model.
//!
//! A [`Document`] owns every element. Elements refer to each other only by
//! string identifier, so a document can be cloned, diffed, and hashed
//! without any pointer fix-up. Identifiers are unique per collection; the
//! validator checks that, not the model.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DataType, FieldConstraint, Value};

/// Root aggregate of a parsed specification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub metadata: Option<Metadata>,
    pub systems: Vec<System>,
    pub entities: Vec<Entity>,
    pub actions: Vec<Action>,
    pub features: Vec<Feature>,
    pub flows: Vec<Flow>,
    pub constraints: Vec<Constraint>,
    pub traceability: Vec<TraceabilityLink>,
}

/// Document-level metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub version: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub created: Option<String>,
    pub updated: Option<String>,
}

/// A system boundary with named components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct System {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub components: Vec<String>,
    pub relationships: Vec<Relationship>,
}

/// A directed relationship between two system components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub from: String,
    pub to: String,
    pub kind: String,
    pub description: Option<String>,
}

/// A data entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub fields: Vec<Field>,
    pub indexes: Vec<Index>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<EntityRelationship>,
}

impl Entity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            description: None,
            fields: Vec::new(),
            indexes: Vec::new(),
            relationships: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// An association from one entity to another, such as `has_many`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRelationship {
    /// Id of the related entity.
    pub entity: String,
    pub kind: String,
    pub description: Option<String>,
}

impl EntityRelationship {
    pub fn new(entity: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            kind: kind.into(),
            description: None,
        }
    }
}

/// A typed field of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
    pub required: bool,
    pub default: Option<Value>,
    pub description: Option<String>,
    pub constraints: Vec<FieldConstraint>,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            required: false,
            default: None,
            description: None,
            constraints: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_constraint(mut self, constraint: FieldConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }
}

/// A secondary index over entity fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    pub name: Option<String>,
    pub fields: Vec<String>,
    pub unique: bool,
}

/// A behavioral unit with typed inputs and outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub inputs: Vec<Parameter>,
    pub outputs: Vec<Parameter>,
    pub logic: Option<String>,
    pub preconditions: Vec<String>,
    pub postconditions: Vec<String>,
    pub exceptions: Vec<ActionException>,
}

impl Action {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            description: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            logic: None,
            preconditions: Vec::new(),
            postconditions: Vec::new(),
            exceptions: Vec::new(),
        }
    }

    /// Look up an input or output parameter by name.
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.inputs
            .iter()
            .chain(self.outputs.iter())
            .find(|p| p.name == name)
    }
}

/// An action input or output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub data_type: DataType,
    pub required: bool,
}

impl Parameter {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            required: false,
        }
    }
}

/// A declared failure of an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionException {
    pub code: String,
    pub message: Option<String>,
}

/// A user-facing feature described by scenarios.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub scenarios: Vec<Scenario>,
    pub acceptance_criteria: Vec<String>,
    pub depends_on: Vec<String>,
}

impl Feature {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            scenarios: Vec::new(),
            acceptance_criteria: Vec::new(),
            depends_on: Vec::new(),
        }
    }
}

/// A Gherkin-style scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub action: Option<String>,
    pub steps: Vec<Step>,
}

/// One line of a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub keyword: StepKeyword,
    pub text: String,
}

impl Step {
    pub fn new(keyword: StepKeyword, text: impl Into<String>) -> Self {
        Self {
            keyword,
            text: text.into(),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.keyword, self.text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKeyword {
    Given,
    When,
    Then,
    And,
}

impl StepKeyword {
    /// Match a step keyword case-insensitively.
    pub fn from_word(word: &str) -> Option<Self> {
        match word.to_ascii_lowercase().as_str() {
            "given" => Some(StepKeyword::Given),
            "when" => Some(StepKeyword::When),
            "then" => Some(StepKeyword::Then),
            "and" => Some(StepKeyword::And),
            _ => None,
        }
    }
}

impl fmt::Display for StepKeyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepKeyword::Given => write!(f, "Given"),
            StepKeyword::When => write!(f, "When"),
            StepKeyword::Then => write!(f, "Then"),
            StepKeyword::And => write!(f, "And"),
        }
    }
}

/// An ordered chain of actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub steps: Vec<FlowStep>,
}

/// A flow step: run an action, then optionally branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStep {
    pub action: String,
    pub on_success: Option<String>,
    pub on_failure: Option<String>,
}

impl FlowStep {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            on_success: None,
            on_failure: None,
        }
    }
}

/// A business rule over entities and actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub applies_to: Vec<String>,
    /// Opaque condition expression.
    pub condition: String,
    /// Message reported when the condition is violated.
    pub message: Option<String>,
}

impl Constraint {
    pub fn new(id: impl Into<String>, condition: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            description: None,
            applies_to: Vec::new(),
            condition: condition.into(),
            message: None,
        }
    }
}

/// A directed traceability edge between two elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceabilityLink {
    pub from: String,
    pub to: String,
    pub relation: Relation,
    pub description: Option<String>,
}

impl TraceabilityLink {
    pub fn new(from: impl Into<String>, to: impl Into<String>, relation: Relation) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            relation,
            description: None,
        }
    }

    /// Stable identity of the link, used in reports and diffs.
    pub fn key(&self) -> String {
        format!("{}->{}:{}", self.from, self.to, self.relation)
    }

    pub fn matches(&self, from: &str, to: &str, relation: Relation) -> bool {
        self.from == from && self.to == to && self.relation == relation
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    Implements,
    Verifies,
    Tests,
    Blocks,
    DependsOn,
}

impl Relation {
    pub const ALL: [Relation; 5] = [
        Relation::Implements,
        Relation::Verifies,
        Relation::Tests,
        Relation::Blocks,
        Relation::DependsOn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Implements => "implements",
            Relation::Verifies => "verifies",
            Relation::Tests => "tests",
            Relation::Blocks => "blocks",
            Relation::DependsOn => "depends_on",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Relation {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Relation::ALL
            .into_iter()
            .find(|r| r.as_str() == normalized)
            .ok_or_else(|| CoreError::UnknownRelation(s.to_string()))
    }
}

/// The collections of a document that hold identified elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    System,
    Entity,
    Action,
    Feature,
    Flow,
    Constraint,
    Traceability,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ElementKind::System => "system",
            ElementKind::Entity => "entity",
            ElementKind::Action => "action",
            ElementKind::Feature => "feature",
            ElementKind::Flow => "flow",
            ElementKind::Constraint => "constraint",
            ElementKind::Traceability => "traceability link",
        };
        f.write_str(s)
    }
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn system(&self, id: &str) -> Option<&System> {
        self.systems.iter().find(|s| s.id == id)
    }

    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id == id)
    }

    pub fn entity_mut(&mut self, id: &str) -> Option<&mut Entity> {
        self.entities.iter_mut().find(|e| e.id == id)
    }

    pub fn action(&self, id: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.id == id)
    }

    pub fn action_mut(&mut self, id: &str) -> Option<&mut Action> {
        self.actions.iter_mut().find(|a| a.id == id)
    }

    pub fn feature(&self, id: &str) -> Option<&Feature> {
        self.features.iter().find(|f| f.id == id)
    }

    pub fn feature_mut(&mut self, id: &str) -> Option<&mut Feature> {
        self.features.iter_mut().find(|f| f.id == id)
    }

    pub fn flow(&self, id: &str) -> Option<&Flow> {
        self.flows.iter().find(|f| f.id == id)
    }

    pub fn constraint(&self, id: &str) -> Option<&Constraint> {
        self.constraints.iter().find(|c| c.id == id)
    }

    pub fn constraint_mut(&mut self, id: &str) -> Option<&mut Constraint> {
        self.constraints.iter_mut().find(|c| c.id == id)
    }

    /// Identifiers of every element in a collection, in document order.
    pub fn ids(&self, kind: ElementKind) -> Vec<String> {
        match kind {
            ElementKind::System => self.systems.iter().map(|e| e.id.clone()).collect(),
            ElementKind::Entity => self.entities.iter().map(|e| e.id.clone()).collect(),
            ElementKind::Action => self.actions.iter().map(|e| e.id.clone()).collect(),
            ElementKind::Feature => self.features.iter().map(|e| e.id.clone()).collect(),
            ElementKind::Flow => self.flows.iter().map(|e| e.id.clone()).collect(),
            ElementKind::Constraint => self.constraints.iter().map(|e| e.id.clone()).collect(),
            ElementKind::Traceability => self.traceability.iter().map(|l| l.key()).collect(),
        }
    }

    /// Total number of identified elements across all collections.
    pub fn element_count(&self) -> usize {
        self.systems.len()
            + self.entities.len()
            + self.actions.len()
            + self.features.len()
            + self.flows.len()
            + self.constraints.len()
            + self.traceability.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_none() && self.element_count() == 0
    }
}
