//! Migration files.
//!
//! A file holds one migration, either bare or under a `migration:` key.
//! Operations are written as single-keyword list items
//! (`- add_entity: {...}`) or with an explicit `type:` tag alongside the
//! element's keys.

use std::fmt;

use fdml_core::{
    ActionPatch, ConstraintPatch, EntityPatch, FeaturePatch, FieldAlteration, Migration,
    Operation, Value, OPERATION_NAMES,
};
use serde::de::value::MapAccessDeserializer;
use serde::de::{self, DeserializeSeed, Deserializer, IgnoredAny, MapAccess, Visitor};
use serde::Deserialize;

use crate::de::{present, ConstraintItem, Many, RelationName, TypeLiteral};
use crate::document::{
    ActionSource, ConstraintSource, EntitySource, ExceptionsSource, FeatureSource, FieldSource,
    LinkSource, ParameterSource, ScenarioItem,
};
use crate::error::{closest, Problem, Result};
use crate::from_yaml;

/// Shorthand operation keywords, each expanding to a full operation.
const ALIASES: &[&str] = &["add_field", "remove_field", "add_link", "remove_link"];

const TAGS: &[&str] = &["type", "op"];

pub(crate) fn read(src: &str) -> Result<Migration> {
    let wrapped = serde_yaml::from_str::<Envelope>(src)
        .map(|e| e.migration.is_some())
        .unwrap_or(false);
    if wrapped {
        from_yaml::<Wrapped>(src).map(|w| w.migration.into())
    } else {
        from_yaml::<MigrationSource>(src).map(Migration::from)
    }
}

#[derive(Deserialize)]
struct Envelope {
    migration: Option<IgnoredAny>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Wrapped {
    migration: MigrationSource,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, expecting = "a migration mapping")]
struct MigrationSource {
    id: String,
    author: Option<String>,
    date: Option<String>,
    #[serde(alias = "title")]
    description: Option<String>,
    up: Vec<OperationSource>,
    #[serde(default)]
    down: Vec<OperationSource>,
    #[serde(default, alias = "dependencies")]
    depends_on: Many<String>,
}

impl From<MigrationSource> for Migration {
    fn from(s: MigrationSource) -> Self {
        Migration {
            id: s.id,
            author: s.author,
            date: s.date,
            description: s.description,
            up: s.up.into_iter().map(|op| op.0).collect(),
            down: s.down.into_iter().map(|op| op.0).collect(),
            depends_on: s.depends_on.0,
        }
    }
}

fn operation_name(name: &str) -> std::result::Result<&'static str, Problem> {
    OPERATION_NAMES
        .iter()
        .chain(ALIASES)
        .copied()
        .find(|k| *k == name)
        .ok_or_else(|| unknown_operation(name))
}

fn unknown_operation(name: &str) -> Problem {
    let mut problem = Problem::new(format!("unknown operation `{name}`"));
    let candidates: Vec<&str> = OPERATION_NAMES.iter().chain(ALIASES).copied().collect();
    if let Some(k) = closest(name, &candidates) {
        problem = problem.with_suggestion(format!("did you mean `{k}`?"));
    }
    problem
}

/// One list item of `up` or `down`.
struct OperationSource(Operation);

impl<'de> Deserialize<'de> for OperationSource {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(OperationVisitor)
    }
}

struct OperationVisitor;

impl<'de> Visitor<'de> for OperationVisitor {
    type Value = OperationSource;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an operation such as `- add_entity: {...}`")
    }

    fn visit_map<A: MapAccess<'de>>(
        self,
        mut map: A,
    ) -> std::result::Result<Self::Value, A::Error> {
        let Some(first) = map.next_key::<OpKey>()? else {
            return Err(de::Error::custom(
                Problem::new("empty operation")
                    .with_suggestion("write operations as `- add_entity: {...}`"),
            ));
        };
        let op = match first {
            OpKey::Tag => {
                let name = map.next_value::<OpName>()?.0;
                return Body(name)
                    .deserialize(MapAccessDeserializer::new(map))
                    .map(OperationSource);
            }
            OpKey::Name(name) => map.next_value_seed(Body(name))?,
            OpKey::Other(key) => return buffered(key, map).map(OperationSource),
        };
        if map.next_key::<IgnoredAny>()?.is_some() {
            return Err(de::Error::custom(
                Problem::new("an operation has exactly one keyword")
                    .with_suggestion("split it into separate list items"),
            ));
        }
        Ok(OperationSource(op))
    }
}

/// A tagged operation whose `type:` key is not written first: read the
/// whole mapping, then find the tag.
fn buffered<'de, A: MapAccess<'de>>(
    first: String,
    mut map: A,
) -> std::result::Result<Operation, A::Error> {
    let mut body = serde_yaml::Mapping::new();
    let value = map.next_value::<serde_yaml::Value>()?;
    body.insert(serde_yaml::Value::String(first.clone()), value);
    while let Some((key, value)) = map.next_entry::<String, serde_yaml::Value>()? {
        body.insert(serde_yaml::Value::String(key), value);
    }

    let Some(tag) = TAGS.iter().find_map(|t| body.remove(*t)) else {
        return Err(de::Error::custom(unknown_operation(&first)));
    };
    let Some(name) = tag.as_str() else {
        return Err(de::Error::custom("expected an operation name for `type`"));
    };
    let name = operation_name(name).map_err(de::Error::custom)?;
    Body(name)
        .deserialize(serde_yaml::Value::Mapping(body))
        .map_err(de::Error::custom)
}

enum OpKey {
    Tag,
    Name(&'static str),
    Other(String),
}

impl<'de> Deserialize<'de> for OpKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_identifier(OpKeyVisitor)
    }
}

struct OpKeyVisitor;

impl<'de> Visitor<'de> for OpKeyVisitor {
    type Value = OpKey;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an operation keyword")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Self::Value, E> {
        if TAGS.contains(&v) {
            return Ok(OpKey::Tag);
        }
        // Element keys such as `entity_id` may precede the tag.
        Ok(match operation_name(v) {
            Ok(name) => OpKey::Name(name),
            Err(_) => OpKey::Other(v.to_string()),
        })
    }
}

/// The value of a `type:` tag.
struct OpName(&'static str);

impl<'de> Deserialize<'de> for OpName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        operation_name(&name).map(OpName).map_err(de::Error::custom)
    }
}

/// The body of a named operation.
struct Body(&'static str);

impl<'de> DeserializeSeed<'de> for Body {
    type Value = Operation;

    fn deserialize<D: Deserializer<'de>>(self, d: D) -> std::result::Result<Operation, D::Error> {
        let op = match self.0 {
            "add_feature" => Operation::AddFeature {
                feature: FeatureSource::deserialize(d)?.into(),
            },
            "remove_feature" => Operation::RemoveFeature {
                id: Target::deserialize(d)?.0,
            },
            "modify_feature" => FeaturePatchSource::deserialize(d)?.into(),
            "add_entity" => Operation::AddEntity {
                entity: EntitySource::deserialize(d)?.into(),
            },
            "remove_entity" => Operation::RemoveEntity {
                id: Target::deserialize(d)?.0,
            },
            "modify_entity" => EntityPatchSource::deserialize(d)?.into(),
            "add_field" => AddFieldSource::deserialize(d)?.into(),
            "remove_field" => RemoveFieldSource::deserialize(d)?.into(),
            "add_action" => Operation::AddAction {
                action: ActionSource::deserialize(d)?.into(),
            },
            "remove_action" => Operation::RemoveAction {
                id: Target::deserialize(d)?.0,
            },
            "modify_action" => ActionPatchSource::deserialize(d)?.into(),
            "add_constraint" => Operation::AddConstraint {
                constraint: ConstraintSource::deserialize(d)?.into(),
            },
            "remove_constraint" => Operation::RemoveConstraint {
                id: Target::deserialize(d)?.0,
            },
            "modify_constraint" => ConstraintPatchSource::deserialize(d)?.into(),
            "add_traceability_link" | "add_link" => Operation::AddTraceabilityLink {
                link: LinkSource::deserialize(d)?.into(),
            },
            "remove_traceability_link" | "remove_link" => {
                let link = LinkRefSource::deserialize(d)?;
                Operation::RemoveTraceabilityLink {
                    from: link.from,
                    to: link.to,
                    relation: link.relation.0,
                }
            }
            other => {
                return Err(de::Error::custom(format!("unknown operation `{other}`")));
            }
        };
        Ok(op)
    }
}

/// `remove_entity: legacy` or `remove_entity: {id: legacy}`.
struct Target(String);

impl<'de> Deserialize<'de> for Target {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(TargetVisitor)
    }
}

struct TargetVisitor;

impl<'de> Visitor<'de> for TargetVisitor {
    type Value = Target;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an element id or an `{id: ...}` mapping")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Self::Value, E> {
        Ok(Target(v.to_string()))
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> std::result::Result<Self::Value, A::Error> {
        #[derive(Deserialize)]
        #[serde(deny_unknown_fields)]
        struct ById {
            id: String,
        }
        ById::deserialize(MapAccessDeserializer::new(map)).map(|t| Target(t.id))
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, expecting = "a feature patch")]
struct FeaturePatchSource {
    id: String,
    title: Option<String>,
    description: Option<String>,
    #[serde(default)]
    add_scenarios: Many<ScenarioItem>,
    #[serde(default)]
    remove_scenarios: Many<String>,
}

impl From<FeaturePatchSource> for Operation {
    fn from(s: FeaturePatchSource) -> Self {
        Operation::ModifyFeature {
            id: s.id,
            patch: FeaturePatch {
                title: s.title,
                description: s.description,
                add_scenarios: s.add_scenarios.into_vec(),
                remove_scenarios: s.remove_scenarios.0,
            },
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, expecting = "an entity patch")]
struct EntityPatchSource {
    id: String,
    name: Option<String>,
    description: Option<String>,
    #[serde(default)]
    add_fields: Many<FieldSource>,
    #[serde(default)]
    remove_fields: Many<String>,
    #[serde(default)]
    alter_fields: Many<AlterationSource>,
}

impl From<EntityPatchSource> for Operation {
    fn from(s: EntityPatchSource) -> Self {
        Operation::ModifyEntity {
            id: s.id,
            patch: EntityPatch {
                name: s.name,
                description: s.description,
                add_fields: s.add_fields.into_vec(),
                remove_fields: s.remove_fields.0,
                alter_fields: s.alter_fields.into_vec(),
            },
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, expecting = "a field alteration")]
struct AlterationSource {
    name: String,
    rename: Option<String>,
    #[serde(rename = "type", alias = "data_type")]
    data_type: Option<TypeLiteral>,
    required: Option<bool>,
    #[serde(default, deserialize_with = "present")]
    default: Option<Value>,
    description: Option<String>,
    constraints: Option<Many<ConstraintItem>>,
}

impl From<AlterationSource> for FieldAlteration {
    fn from(s: AlterationSource) -> Self {
        FieldAlteration {
            name: s.name,
            rename: s.rename,
            data_type: s.data_type.map(|t| t.0),
            required: s.required,
            default: s.default,
            description: s.description,
            constraints: s.constraints.map(Many::into_vec),
        }
    }
}

/// `add_field`: one field added to an entity.
#[derive(Deserialize)]
#[serde(deny_unknown_fields, expecting = "an entity id and a field")]
struct AddFieldSource {
    #[serde(alias = "entity")]
    entity_id: String,
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

impl From<AddFieldSource> for Operation {
    fn from(s: AddFieldSource) -> Self {
        let field = fdml_core::Field {
            name: s.name,
            data_type: s.data_type.0,
            required: s.required,
            default: s.default,
            description: s.description,
            constraints: s.constraints.into_vec(),
        };
        Operation::ModifyEntity {
            id: s.entity_id,
            patch: EntityPatch {
                add_fields: vec![field],
                ..EntityPatch::default()
            },
        }
    }
}

/// `remove_field`: one field dropped from an entity.
#[derive(Deserialize)]
#[serde(deny_unknown_fields, expecting = "an entity id and a field name")]
struct RemoveFieldSource {
    #[serde(alias = "entity")]
    entity_id: String,
    #[serde(alias = "name")]
    field_name: String,
}

impl From<RemoveFieldSource> for Operation {
    fn from(s: RemoveFieldSource) -> Self {
        Operation::ModifyEntity {
            id: s.entity_id,
            patch: EntityPatch {
                remove_fields: vec![s.field_name],
                ..EntityPatch::default()
            },
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, expecting = "an action patch")]
struct ActionPatchSource {
    id: String,
    name: Option<String>,
    description: Option<String>,
    logic: Option<String>,
    #[serde(default)]
    add_inputs: Many<ParameterSource>,
    #[serde(default)]
    remove_inputs: Many<String>,
    #[serde(default)]
    add_outputs: Many<ParameterSource>,
    #[serde(default)]
    remove_outputs: Many<String>,
    #[serde(default)]
    add_exceptions: ExceptionsSource,
    #[serde(default)]
    remove_exceptions: Many<String>,
}

impl From<ActionPatchSource> for Operation {
    fn from(s: ActionPatchSource) -> Self {
        Operation::ModifyAction {
            id: s.id,
            patch: ActionPatch {
                name: s.name,
                description: s.description,
                logic: s.logic,
                add_inputs: s.add_inputs.into_vec(),
                remove_inputs: s.remove_inputs.0,
                add_outputs: s.add_outputs.into_vec(),
                remove_outputs: s.remove_outputs.0,
                add_exceptions: s.add_exceptions.0,
                remove_exceptions: s.remove_exceptions.0,
            },
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, expecting = "a constraint patch")]
struct ConstraintPatchSource {
    id: String,
    name: Option<String>,
    description: Option<String>,
    applies_to: Option<Many<String>>,
    #[serde(alias = "rule")]
    condition: Option<String>,
    message: Option<String>,
}

impl From<ConstraintPatchSource> for Operation {
    fn from(s: ConstraintPatchSource) -> Self {
        Operation::ModifyConstraint {
            id: s.id,
            patch: ConstraintPatch {
                name: s.name,
                description: s.description,
                applies_to: s.applies_to.map(|a| a.0),
                condition: s.condition,
                message: s.message,
            },
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, expecting = "a traceability link")]
struct LinkRefSource {
    from: String,
    to: String,
    #[serde(alias = "type")]
    relation: RelationName,
}
