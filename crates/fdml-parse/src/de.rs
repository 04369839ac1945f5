//! Deserialization shims shared by documents and migrations.
//!
//! Source files allow shorthands the model does not store: one item where a
//! list is expected, type literals, `{max_length: 50}` constraints. Each
//! shim reads the short and the long form and yields the model value.
//! Errors are raised inside the visitor so serde_yaml can attach the
//! position of the offending node.

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use fdml_core::{
    DataType, DataTypeError, FieldConstraint, Relation, Value, CONSTRAINT_KEYWORDS, TYPE_NAMES,
};
use serde::de::value::MapAccessDeserializer;
use serde::de::{self, Deserialize, Deserializer, IgnoredAny, IntoDeserializer, MapAccess, SeqAccess, Visitor};

use crate::error::{closest, Problem};

/// One item or a list of them. `~` or an empty value is an empty list.
#[derive(Debug)]
pub(crate) struct Many<T>(pub Vec<T>);

impl<T> Default for Many<T> {
    fn default() -> Self {
        Many(Vec::new())
    }
}

impl<T> Many<T> {
    pub(crate) fn into_vec<U: From<T>>(self) -> Vec<U> {
        self.0.into_iter().map(U::from).collect()
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Many<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ManyVisitor(PhantomData))
    }
}

struct ManyVisitor<T>(PhantomData<T>);

impl<T> ManyVisitor<T> {
    fn one<E>(item: std::result::Result<T, E>) -> std::result::Result<Many<T>, E> {
        item.map(|item| Many(vec![item]))
    }
}

impl<'de, T: Deserialize<'de>> Visitor<'de> for ManyVisitor<T> {
    type Value = Many<T>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("one item or a list of items")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(Many(Vec::new()))
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(Many(Vec::new()))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut items = Vec::new();
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Many(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Self::Value, A::Error> {
        Self::one(T::deserialize(MapAccessDeserializer::new(map)))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Self::one(T::deserialize(v.into_deserializer()))
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        Self::one(T::deserialize(v.into_deserializer()))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Self::one(T::deserialize(v.into_deserializer()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Self::one(T::deserialize(v.into_deserializer()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Self::one(T::deserialize(v.into_deserializer()))
    }
}

/// A data type: a literal such as `array<string>`, or a one-key mapping
/// (`{array: string}`, `{enum: [a, b]}`, `{object: {zip: integer}}`).
#[derive(Debug)]
pub(crate) struct TypeLiteral(pub DataType);

impl<'de> Deserialize<'de> for TypeLiteral {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(TypeVisitor)
    }
}

struct TypeVisitor;

impl<'de> Visitor<'de> for TypeVisitor {
    type Value = TypeLiteral;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a type such as `string` or `array<integer>`")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        v.parse::<DataType>()
            .map(TypeLiteral)
            .map_err(|e| E::custom(type_problem(v, &e)))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let shapes = "use `array`, `enum` or `object`";
        let Some(key) = map.next_key::<String>()? else {
            return Err(de::Error::custom(
                Problem::new("empty type mapping").with_suggestion(shapes),
            ));
        };
        let data_type = match key.as_str() {
            "array" | "list" => DataType::Array(Box::new(map.next_value::<TypeLiteral>()?.0)),
            "enum" => DataType::Enum(map.next_value::<Many<String>>()?.0),
            "object" | "map" => DataType::Object(map.next_value::<Members>()?.0),
            other => {
                return Err(de::Error::custom(
                    Problem::new(format!("unknown type `{other}`")).with_suggestion(shapes),
                ))
            }
        };
        if map.next_key::<IgnoredAny>()?.is_some() {
            return Err(de::Error::custom(
                Problem::new("a type mapping has exactly one key").with_suggestion(shapes),
            ));
        }
        Ok(TypeLiteral(data_type))
    }
}

fn type_problem(text: &str, err: &DataTypeError) -> Problem {
    let head = text
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    let problem = Problem::new(err.to_string());
    match closest(&head, TYPE_NAMES) {
        Some(t) if t != head => problem.with_suggestion(format!("did you mean `{t}`?")),
        _ => problem.with_suggestion(format!("expected one of: {}", TYPE_NAMES.join(", "))),
    }
}

/// Members of an object type, `name: type` pairs.
struct Members(BTreeMap<String, DataType>);

impl<'de> Deserialize<'de> for Members {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(MembersVisitor)
    }
}

struct MembersVisitor;

impl<'de> Visitor<'de> for MembersVisitor {
    type Value = Members;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("object members as `name: type` pairs")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(Members(BTreeMap::new()))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut members = BTreeMap::new();
        while let Some((name, data_type)) = map.next_entry::<String, TypeLiteral>()? {
            if members.contains_key(&name) {
                return Err(de::Error::custom(format!("duplicate object member `{name}`")));
            }
            members.insert(name, data_type.0);
        }
        Ok(Members(members))
    }
}

/// An untyped literal, as written for a field default.
#[derive(Debug)]
pub(crate) struct Literal(pub Value);

impl<'de> Deserialize<'de> for Literal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(LiteralVisitor)
    }
}

struct LiteralVisitor;

impl<'de> Visitor<'de> for LiteralVisitor {
    type Value = Literal;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a literal value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(Literal(Value::Null))
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(Literal(Value::Null))
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        Literal::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        Ok(Literal(Value::Bool(v)))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(Literal(Value::Integer(v)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        i64::try_from(v)
            .map(|n| Literal(Value::Integer(n)))
            .map_err(|_| {
                E::custom(
                    Problem::new(format!("integer `{v}` is out of range"))
                        .with_suggestion("quote it to keep it as text"),
                )
            })
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        finite(v).map(|f| Literal(Value::Float(f)))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(Literal(Value::String(v.to_string())))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut items = Vec::new();
        while let Some(item) = seq.next_element::<Literal>()? {
            items.push(item.0);
        }
        Ok(Literal(Value::List(items)))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut entries = BTreeMap::new();
        while let Some((key, value)) = map.next_entry::<String, Literal>()? {
            entries.insert(key, value.0);
        }
        Ok(Literal(Value::Map(entries)))
    }
}

/// Reject infinities and NaN, which have no stable text form in a document.
pub(crate) fn finite<E: de::Error>(v: f64) -> Result<f64, E> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(E::custom(
            Problem::new(format!("number `{v}` is not finite"))
                .with_suggestion("write a finite number, or quote it to keep it as text"),
        ))
    }
}

/// `Some` whenever the key is present, so `default: ~` keeps an explicit
/// null default.
pub(crate) fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Literal::deserialize(deserializer).map(|literal| Some(literal.0))
}

/// A field constraint: a bare keyword (`unique`), a one-key mapping
/// (`{max_length: 50}`), or the tagged form `{type: pattern, value: ...}`.
#[derive(Debug)]
pub(crate) struct ConstraintItem(pub FieldConstraint);

impl From<ConstraintItem> for FieldConstraint {
    fn from(item: ConstraintItem) -> Self {
        item.0
    }
}

impl<'de> Deserialize<'de> for ConstraintItem {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ConstraintVisitor)
    }
}

struct ConstraintVisitor;

impl<'de> Visitor<'de> for ConstraintVisitor {
    type Value = ConstraintItem;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a field constraint such as `unique` or `{max_length: 50}`")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        constraint_of(v, None).map(ConstraintItem).map_err(E::custom)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut entries: Vec<(String, Value)> = Vec::new();
        while let Some((key, value)) = map.next_entry::<String, Literal>()? {
            entries.push((key, value.0));
        }

        let (keyword, value) = if entries.iter().any(|(k, _)| k == "type") {
            let mut keyword = String::new();
            let mut value = None;
            for (key, v) in entries {
                match (key.as_str(), v) {
                    ("type", Value::String(s)) => keyword = s,
                    ("type", other) => {
                        return Err(de::Error::custom(format!(
                            "expected a constraint keyword for `type`, found a {}",
                            other.kind()
                        )))
                    }
                    ("value", v) => value = Some(v),
                    (other, _) => {
                        return Err(de::Error::custom(
                            Problem::new(format!("unknown key `{other}` in field constraint"))
                                .with_suggestion("use `type` and `value`"),
                        ))
                    }
                }
            }
            (keyword, value)
        } else {
            let mut entries = entries.into_iter();
            match (entries.next(), entries.next()) {
                (Some((keyword, value)), None) => (keyword, Some(value)),
                _ => {
                    return Err(de::Error::custom(
                        Problem::new("expected one constraint per mapping")
                            .with_suggestion("write `unique`, `nullable`, or `{max_length: 50}`"),
                    ))
                }
            }
        };
        constraint_of(&keyword, value)
            .map(ConstraintItem)
            .map_err(de::Error::custom)
    }
}

fn constraint_of(keyword: &str, value: Option<Value>) -> Result<FieldConstraint, Problem> {
    let needs_value = || {
        Problem::new(format!("constraint `{keyword}` needs a value"))
            .with_suggestion(format!("write `{{{keyword}: ...}}`"))
    };
    let value = value.filter(|v| !matches!(v, Value::Null));
    match keyword {
        "unique" => Ok(FieldConstraint::Unique),
        "nullable" => Ok(FieldConstraint::Nullable),
        "max_length" | "min_length" => {
            let n = match value.ok_or_else(needs_value)? {
                Value::Integer(n) => u64::try_from(n).ok(),
                _ => None,
            }
            .ok_or_else(|| {
                Problem::new(format!("expected a non-negative whole number for `{keyword}`"))
            })?;
            Ok(if keyword == "max_length" {
                FieldConstraint::MaxLength(n)
            } else {
                FieldConstraint::MinLength(n)
            })
        }
        "max_value" | "min_value" => {
            let n = match value.ok_or_else(needs_value)? {
                Value::Integer(n) => n as f64,
                Value::Float(f) => f,
                _ => return Err(Problem::new(format!("expected a number for `{keyword}`"))),
            };
            Ok(if keyword == "max_value" {
                FieldConstraint::MaxValue(n)
            } else {
                FieldConstraint::MinValue(n)
            })
        }
        "pattern" => match value.ok_or_else(needs_value)? {
            Value::String(p) => Ok(FieldConstraint::Pattern(p)),
            _ => Err(Problem::new("expected a string for `pattern`")
                .with_suggestion("quote the pattern")),
        },
        other => {
            let mut problem = Problem::new(format!("unknown field constraint `{other}`"));
            if let Some(k) = closest(other, CONSTRAINT_KEYWORDS) {
                problem = problem.with_suggestion(format!("did you mean `{k}`?"));
            }
            Err(problem)
        }
    }
}

/// A traceability relation name, such as `implements` or `depends-on`.
#[derive(Debug)]
pub(crate) struct RelationName(pub Relation);

impl<'de> Deserialize<'de> for RelationName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_str(RelationVisitor)
    }
}

struct RelationVisitor;

impl<'de> Visitor<'de> for RelationVisitor {
    type Value = RelationName;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a relation name")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        v.parse::<Relation>().map(RelationName).map_err(|e| {
            let names: Vec<&str> = Relation::ALL.iter().map(|r| r.as_str()).collect();
            let problem = Problem::new(e.to_string());
            let problem = match closest(&v.to_ascii_lowercase(), &names) {
                Some(r) => problem.with_suggestion(format!("did you mean `{r}`?")),
                None => problem.with_suggestion(format!("expected one of: {}", names.join(", "))),
            };
            E::custom(problem)
        })
    }
}
