//! Specification documents read through serde_yaml.
//!
//! Element keywords may be written singular (`entity:`) or plural
//! (`entities:`), each holding one element or a list of them, and may
//! repeat. Keys inside an element are checked: unknown keys are rejected
//! with the closest known key as a hint, so typos never silently drop data.

use std::fmt;

use fdml_core::{
    Action, ActionException, Constraint, Document, Entity, EntityRelationship, Feature, Field,
    FieldConstraint, Flow, FlowStep, Index, Metadata, Parameter, Relationship, Scenario,
    StepKeyword, System, TraceabilityLink, Value,
};
use serde::de::value::MapAccessDeserializer;
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::Deserialize;

use crate::de::{present, ConstraintItem, Many, RelationName, TypeLiteral};
use crate::error::{closest, Problem};
use crate::gherkin::{self, StepsSource};

const KEYWORDS: &[&str] = &[
    "metadata",
    "system",
    "systems",
    "entity",
    "entities",
    "action",
    "actions",
    "feature",
    "features",
    "flow",
    "flows",
    "constraint",
    "constraints",
    "traceability",
];

/// A whole specification document.
pub(crate) struct DocumentSource(pub Document);

impl<'de> Deserialize<'de> for DocumentSource {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DocumentVisitor)
    }
}

struct DocumentVisitor;

impl<'de> Visitor<'de> for DocumentVisitor {
    type Value = DocumentSource;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("element keywords such as `entity:` or `feature:` at the top level")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(DocumentSource(Document::default()))
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(DocumentSource(Document::default()))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut doc = Document::default();
        while let Some(keyword) = map.next_key::<Keyword>()? {
            match keyword {
                Keyword::Metadata => {
                    if doc.metadata.is_some() {
                        return Err(de::Error::custom(
                            Problem::new("duplicate `metadata` block")
                                .with_suggestion("merge both blocks into one"),
                        ));
                    }
                    doc.metadata = Some(map.next_value::<MetadataSource>()?.into());
                }
                Keyword::Systems => doc
                    .systems
                    .append(&mut map.next_value::<Many<SystemSource>>()?.into_vec()),
                Keyword::Entities => doc
                    .entities
                    .append(&mut map.next_value::<Many<EntitySource>>()?.into_vec()),
                Keyword::Actions => doc
                    .actions
                    .append(&mut map.next_value::<Many<ActionSource>>()?.into_vec()),
                Keyword::Features => doc
                    .features
                    .append(&mut map.next_value::<Many<FeatureSource>>()?.into_vec()),
                Keyword::Flows => doc
                    .flows
                    .append(&mut map.next_value::<Many<FlowSource>>()?.into_vec()),
                Keyword::Constraints => doc
                    .constraints
                    .append(&mut map.next_value::<Many<ConstraintSource>>()?.into_vec()),
                Keyword::Traceability => doc
                    .traceability
                    .append(&mut map.next_value::<Many<LinkSource>>()?.into_vec()),
            }
        }
        Ok(DocumentSource(doc))
    }
}

enum Keyword {
    Metadata,
    Systems,
    Entities,
    Actions,
    Features,
    Flows,
    Constraints,
    Traceability,
}

impl<'de> Deserialize<'de> for Keyword {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_identifier(KeywordVisitor)
    }
}

struct KeywordVisitor;

impl<'de> Visitor<'de> for KeywordVisitor {
    type Value = Keyword;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an element keyword")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(match v {
            "metadata" => Keyword::Metadata,
            "system" | "systems" => Keyword::Systems,
            "entity" | "entities" => Keyword::Entities,
            "action" | "actions" => Keyword::Actions,
            "feature" | "features" => Keyword::Features,
            "flow" | "flows" => Keyword::Flows,
            "constraint" | "constraints" => Keyword::Constraints,
            "traceability" => Keyword::Traceability,
            "migration" | "migrations" => {
                return Err(E::custom(
                    Problem::new("migrations cannot appear inside a specification document")
                        .with_suggestion(
                            "put each migration in its own file in the migrations directory",
                        ),
                ))
            }
            other => {
                let mut problem = Problem::new(format!("unknown element keyword `{other}`"));
                if let Some(k) = closest(other, KEYWORDS) {
                    problem = problem.with_suggestion(format!("did you mean `{k}`?"));
                }
                return Err(E::custom(problem));
            }
        })
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, expecting = "a metadata mapping")]
struct MetadataSource {
    version: Option<String>,
    author: Option<String>,
    description: Option<String>,
    created: Option<String>,
    updated: Option<String>,
}

impl From<MetadataSource> for Metadata {
    fn from(s: MetadataSource) -> Self {
        Metadata {
            version: s.version,
            author: s.author,
            description: s.description,
            created: s.created,
            updated: s.updated,
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, expecting = "a system mapping")]
struct SystemSource {
    id: String,
    name: Option<String>,
    description: Option<String>,
    #[serde(default)]
    components: Many<String>,
    #[serde(default)]
    relationships: Many<RelationshipSource>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, expecting = "a relationship mapping")]
struct RelationshipSource {
    from: String,
    to: String,
    #[serde(rename = "type", alias = "kind")]
    kind: String,
    description: Option<String>,
}

impl From<SystemSource> for System {
    fn from(s: SystemSource) -> Self {
        System {
            id: s.id,
            name: s.name,
            description: s.description,
            components: s.components.0,
            relationships: s.relationships.into_vec(),
        }
    }
}

impl From<RelationshipSource> for Relationship {
    fn from(s: RelationshipSource) -> Self {
        Relationship {
            from: s.from,
            to: s.to,
            kind: s.kind,
            description: s.description,
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, expecting = "an entity mapping")]
pub(crate) struct EntitySource {
    id: String,
    name: Option<String>,
    description: Option<String>,
    #[serde(default)]
    fields: Many<FieldSource>,
    #[serde(default)]
    indexes: Many<IndexSource>,
    #[serde(default)]
    relationships: Many<EntityRelationshipSource>,
}

impl From<EntitySource> for Entity {
    fn from(s: EntitySource) -> Self {
        Entity {
            id: s.id,
            name: s.name,
            description: s.description,
            fields: s.fields.into_vec(),
            indexes: s.indexes.into_vec(),
            relationships: s.relationships.into_vec(),
        }
    }
}

/// `{entity: order, type: has_many}`
#[derive(Deserialize)]
#[serde(deny_unknown_fields, expecting = "an entity relationship mapping")]
struct EntityRelationshipSource {
    entity: String,
    #[serde(rename = "type", alias = "kind")]
    kind: String,
    description: Option<String>,
}

impl From<EntityRelationshipSource> for EntityRelationship {
    fn from(s: EntityRelationshipSource) -> Self {
        EntityRelationship {
            entity: s.entity,
            kind: s.kind,
            description: s.description,
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, expecting = "a field mapping")]
pub(crate) struct FieldSource {
    #[serde(alias = "field_name")]
    name: String,
    #[serde(rename = "type", alias = "data_type", alias = "field_type")]
    data_type: TypeLiteral,
    #[serde(default)]
    required: bool,
    #[serde(default, deserialize_with = "present")]
    default: Option<Value>,
    description: Option<String>,
    #[serde(default)]
    constraints: Many<ConstraintItem>,
}

impl From<FieldSource> for Field {
    fn from(s: FieldSource) -> Self {
        Field {
            name: s.name,
            data_type: s.data_type.0,
            required: s.required,
            default: s.default,
            description: s.description,
            constraints: s.constraints.into_vec::<FieldConstraint>(),
        }
    }
}

/// A bare field name, a list of names, or a mapping.
#[derive(Deserialize)]
#[serde(untagged, expecting = "an index: a field name, a list of names, or a mapping")]
enum IndexSource {
    Field(String),
    Fields(Vec<String>),
    Detailed(IndexTable),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct IndexTable {
    name: Option<String>,
    fields: Many<String>,
    #[serde(default)]
    unique: bool,
}

impl From<IndexSource> for Index {
    fn from(s: IndexSource) -> Self {
        match s {
            IndexSource::Field(field) => Index {
                name: None,
                fields: vec![field],
                unique: false,
            },
            IndexSource::Fields(fields) => Index {
                name: None,
                fields,
                unique: false,
            },
            IndexSource::Detailed(t) => Index {
                name: t.name,
                fields: t.fields.0,
                unique: t.unique,
            },
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, expecting = "an action mapping")]
pub(crate) struct ActionSource {
    id: String,
    name: Option<String>,
    description: Option<String>,
    #[serde(default, alias = "input")]
    inputs: Many<ParameterSource>,
    #[serde(default, alias = "output")]
    outputs: Many<ParameterSource>,
    logic: Option<String>,
    #[serde(default)]
    preconditions: Many<String>,
    #[serde(default)]
    postconditions: Many<String>,
    #[serde(default, alias = "errors")]
    exceptions: ExceptionsSource,
}

impl From<ActionSource> for Action {
    fn from(s: ActionSource) -> Self {
        Action {
            id: s.id,
            name: s.name,
            description: s.description,
            inputs: s.inputs.into_vec(),
            outputs: s.outputs.into_vec(),
            logic: s.logic,
            preconditions: s.preconditions.0,
            postconditions: s.postconditions.0,
            exceptions: s.exceptions.0,
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, expecting = "a parameter mapping")]
pub(crate) struct ParameterSource {
    name: String,
    #[serde(rename = "type", alias = "data_type")]
    data_type: TypeLiteral,
    #[serde(default)]
    required: bool,
}

impl From<ParameterSource> for Parameter {
    fn from(s: ParameterSource) -> Self {
        Parameter {
            name: s.name,
            data_type: s.data_type.0,
            required: s.required,
        }
    }
}

/// A list of codes or `{code, message}` items, or the shorthand
/// `CODE: message` mapping.
#[derive(Default)]
pub(crate) struct ExceptionsSource(pub Vec<ActionException>);

impl<'de> Deserialize<'de> for ExceptionsSource {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ExceptionsVisitor)
    }
}

struct ExceptionsVisitor;

impl<'de> Visitor<'de> for ExceptionsVisitor {
    type Value = ExceptionsSource;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a list of exceptions or a `CODE: message` mapping")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(ExceptionsSource::default())
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut out = Vec::new();
        while let Some((code, message)) = map.next_entry::<String, Option<String>>()? {
            out.push(ActionException { code, message });
        }
        Ok(ExceptionsSource(out))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut out = Vec::new();
        while let Some(item) = seq.next_element::<ExceptionItem>()? {
            out.push(item.into());
        }
        Ok(ExceptionsSource(out))
    }
}

#[derive(Deserialize)]
#[serde(untagged, expecting = "an exception code or a `{code, message}` mapping")]
enum ExceptionItem {
    Code(String),
    Detailed {
        code: String,
        message: Option<String>,
    },
}

impl From<ExceptionItem> for ActionException {
    fn from(item: ExceptionItem) -> Self {
        match item {
            ExceptionItem::Code(code) => ActionException {
                code,
                message: None,
            },
            ExceptionItem::Detailed { code, message } => ActionException { code, message },
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, expecting = "a feature mapping")]
pub(crate) struct FeatureSource {
    id: String,
    #[serde(alias = "name")]
    title: String,
    description: Option<String>,
    #[serde(default)]
    scenarios: Many<ScenarioItem>,
    #[serde(default)]
    acceptance_criteria: Many<String>,
    #[serde(default, alias = "dependencies")]
    depends_on: Many<String>,
}

impl From<FeatureSource> for Feature {
    fn from(s: FeatureSource) -> Self {
        Feature {
            id: s.id,
            title: s.title,
            description: s.description,
            scenarios: s.scenarios.into_vec(),
            acceptance_criteria: s.acceptance_criteria.0,
            depends_on: s.depends_on.0,
        }
    }
}

/// A scenario, checked once all of its keys are read.
pub(crate) struct ScenarioItem(pub Scenario);

impl From<ScenarioItem> for Scenario {
    fn from(item: ScenarioItem) -> Self {
        item.0
    }
}

impl<'de> Deserialize<'de> for ScenarioItem {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(ScenarioVisitor)
    }
}

struct ScenarioVisitor;

impl<'de> Visitor<'de> for ScenarioVisitor {
    type Value = ScenarioItem;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a scenario mapping")
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Self::Value, A::Error> {
        let source = ScenarioSource::deserialize(MapAccessDeserializer::new(map))?;
        Scenario::try_from(source)
            .map(ScenarioItem)
            .map_err(de::Error::custom)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, expecting = "a scenario mapping")]
struct ScenarioSource {
    #[serde(alias = "title")]
    name: Option<String>,
    id: Option<String>,
    #[serde(alias = "action_id")]
    action: Option<String>,
    steps: Option<StepsSource>,
    #[serde(default)]
    given: Many<String>,
    #[serde(default)]
    when: Many<String>,
    #[serde(default)]
    then: Many<String>,
}

impl TryFrom<ScenarioSource> for Scenario {
    type Error = Problem;

    fn try_from(s: ScenarioSource) -> Result<Self, Problem> {
        let Some(name) = s.name.or(s.id) else {
            return Err(Problem::new("scenario is missing required key `name`")
                .with_suggestion("add `name: ...`"));
        };
        let groups: Vec<(StepKeyword, Vec<String>)> = [
            (StepKeyword::Given, s.given.0),
            (StepKeyword::When, s.when.0),
            (StepKeyword::Then, s.then.0),
        ]
        .into_iter()
        .filter(|(_, texts)| !texts.is_empty())
        .collect();
        let steps = match s.steps {
            Some(_) if !groups.is_empty() => {
                return Err(Problem::new(
                    "scenario mixes `steps` with `given`/`when`/`then` lists",
                )
                .with_suggestion("use one form or the other"))
            }
            Some(steps) => steps.0,
            None => gherkin::grouped(&groups),
        };
        Ok(Scenario {
            name,
            action: s.action,
            steps,
        })
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, expecting = "a flow mapping")]
struct FlowSource {
    id: String,
    name: Option<String>,
    description: Option<String>,
    steps: Vec<FlowStepSource>,
}

impl From<FlowSource> for Flow {
    fn from(s: FlowSource) -> Self {
        Flow {
            id: s.id,
            name: s.name,
            description: s.description,
            steps: s.steps.into_iter().map(FlowStep::from).collect(),
        }
    }
}

/// `- charge` or `- {action: charge, on_failure: refund}`
#[derive(Deserialize)]
#[serde(untagged, expecting = "an action id or a flow step mapping")]
enum FlowStepSource {
    Action(String),
    Detailed {
        #[serde(alias = "action_id")]
        action: String,
        on_success: Option<String>,
        on_failure: Option<String>,
    },
}

impl From<FlowStepSource> for FlowStep {
    fn from(s: FlowStepSource) -> Self {
        match s {
            FlowStepSource::Action(action) => FlowStep::new(action),
            FlowStepSource::Detailed {
                action,
                on_success,
                on_failure,
            } => FlowStep {
                action,
                on_success,
                on_failure,
            },
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, expecting = "a constraint mapping")]
pub(crate) struct ConstraintSource {
    id: String,
    name: Option<String>,
    description: Option<String>,
    #[serde(default)]
    applies_to: Many<String>,
    #[serde(default)]
    entities: Many<String>,
    #[serde(default)]
    actions: Many<String>,
    #[serde(alias = "rule")]
    condition: String,
    #[serde(alias = "violation_message")]
    message: Option<String>,
}

impl From<ConstraintSource> for Constraint {
    fn from(s: ConstraintSource) -> Self {
        let mut applies_to = s.applies_to.0;
        applies_to.extend(s.entities.0);
        applies_to.extend(s.actions.0);
        Constraint {
            id: s.id,
            name: s.name,
            description: s.description,
            applies_to,
            condition: s.condition,
            message: s.message,
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, expecting = "a traceability link mapping")]
pub(crate) struct LinkSource {
    from: String,
    to: String,
    #[serde(alias = "type")]
    relation: RelationName,
    description: Option<String>,
}

impl From<LinkSource> for TraceabilityLink {
    fn from(s: LinkSource) -> Self {
        TraceabilityLink {
            from: s.from,
            to: s.to,
            relation: s.relation.0,
            description: s.description,
        }
    }
}
