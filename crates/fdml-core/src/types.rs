//! Data types, literal values, and field constraints.
//!
//! A [`DataType`] has a textual literal form used by specification sources:
//!
//! ```text
//! string | integer | float | boolean | datetime | date | uuid
//! array<T> | T[]
//! enum(a, b, "c d")
//! object | object{street: string, zip: integer}
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DataTypeError;

/// The type of a field or action parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "of", rename_all = "snake_case")]
pub enum DataType {
    String,
    Integer,
    Float,
    Boolean,
    DateTime,
    Date,
    Uuid,
    Array(Box<DataType>),
    Object(BTreeMap<String, DataType>),
    Enum(Vec<String>),
}

impl DataType {
    /// Short name of the type tag, ignoring any parameters.
    pub fn tag(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Integer => "integer",
            DataType::Float => "float",
            DataType::Boolean => "boolean",
            DataType::DateTime => "datetime",
            DataType::Date => "date",
            DataType::Uuid => "uuid",
            DataType::Array(_) => "array",
            DataType::Object(_) => "object",
            DataType::Enum(_) => "enum",
        }
    }

    /// Whether values of this type are numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Integer | DataType::Float)
    }

    /// Whether a field constraint is meaningful for this type.
    pub fn supports(&self, constraint: &FieldConstraint) -> bool {
        match constraint {
            FieldConstraint::Nullable => true,
            FieldConstraint::Unique => !matches!(self, DataType::Array(_) | DataType::Object(_)),
            FieldConstraint::MaxLength(_) | FieldConstraint::MinLength(_) => {
                matches!(self, DataType::String | DataType::Array(_))
            }
            FieldConstraint::MaxValue(_) | FieldConstraint::MinValue(_) => self.is_numeric(),
            FieldConstraint::Pattern(_) => matches!(self, DataType::String),
        }
    }

    /// Whether a literal value is an acceptable instance of this type.
    ///
    /// Temporal and UUID types are carried as strings in source text, so
    /// only their string shape is checked here.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (DataType::String, Value::String(_)) => true,
            (DataType::DateTime | DataType::Date | DataType::Uuid, Value::String(_)) => true,
            (DataType::Integer, Value::Integer(_)) => true,
            (DataType::Float, Value::Integer(_) | Value::Float(_)) => true,
            (DataType::Boolean, Value::Bool(_)) => true,
            (DataType::Enum(values), Value::String(s)) => values.iter().any(|v| v == s),
            (DataType::Array(inner), Value::List(items)) => items.iter().all(|i| inner.accepts(i)),
            (DataType::Object(fields), Value::Map(_)) if fields.is_empty() => true,
            (DataType::Object(fields), Value::Map(map)) => map
                .iter()
                .all(|(k, v)| fields.get(k).is_some_and(|t| t.accepts(v))),
            _ => false,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Array(inner) => write!(f, "array<{inner}>"),
            DataType::Enum(values) => {
                let items: Vec<String> = values.iter().map(|v| literal_item(v)).collect();
                write!(f, "enum({})", items.join(", "))
            }
            DataType::Object(fields) if fields.is_empty() => write!(f, "object"),
            DataType::Object(fields) => {
                let items: Vec<String> = fields
                    .iter()
                    .map(|(k, t)| format!("{}: {t}", literal_item(k)))
                    .collect();
                write!(f, "object{{{}}}", items.join(", "))
            }
            other => write!(f, "{}", other.tag()),
        }
    }
}

fn literal_item(s: &str) -> String {
    let bare = !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if bare {
        s.to_string()
    } else {
        format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
    }
}

/// Resolve a simple (unparameterised) type name, accepting common aliases.
pub fn simple_type(name: &str) -> Option<DataType> {
    let t = match name.to_ascii_lowercase().as_str() {
        "string" | "str" | "text" => DataType::String,
        "integer" | "int" | "i32" | "i64" | "long" => DataType::Integer,
        "float" | "double" | "decimal" | "number" | "f64" => DataType::Float,
        "boolean" | "bool" => DataType::Boolean,
        "datetime" | "timestamp" => DataType::DateTime,
        "date" => DataType::Date,
        "uuid" => DataType::Uuid,
        "object" | "map" | "json" => DataType::Object(BTreeMap::new()),
        _ => return None,
    };
    Some(t)
}

/// Every type name accepted in literal position, for diagnostics.
pub const TYPE_NAMES: &[&str] = &[
    "string", "integer", "float", "boolean", "datetime", "date", "uuid", "array", "object", "enum",
];

impl FromStr for DataType {
    type Err = DataTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut cursor = Literal {
            src: s,
            chars: s.char_indices().collect(),
            pos: 0,
        };
        let ty = cursor.data_type()?;
        cursor.skip_ws();
        if cursor.pos < cursor.chars.len() {
            return Err(cursor.error("unexpected trailing characters"));
        }
        Ok(ty)
    }
}

/// Recursive-descent reader for the type literal grammar.
struct Literal<'a> {
    src: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl Literal<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), DataTypeError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(&format!("expected `{expected}`")))
        }
    }

    fn error(&self, reason: &str) -> DataTypeError {
        DataTypeError {
            literal: self.src.to_string(),
            reason: reason.to_string(),
        }
    }

    fn word(&mut self) -> String {
        self.skip_ws();
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                out.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        out
    }

    fn item(&mut self) -> Result<String, DataTypeError> {
        self.skip_ws();
        if self.peek() != Some('"') {
            let word = self.word();
            if word.is_empty() {
                return Err(self.error("expected a name"));
            }
            return Ok(word);
        }
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated quoted name")),
                Some('"') => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some('\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some(c) => out.push(c),
                        None => return Err(self.error("unterminated escape")),
                    }
                    self.pos += 1;
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn data_type(&mut self) -> Result<DataType, DataTypeError> {
        let name = self.word();
        if name.is_empty() {
            return Err(self.error("expected a type name"));
        }
        let mut ty = match name.to_ascii_lowercase().as_str() {
            "array" | "list" => {
                self.expect('<')?;
                let inner = self.data_type()?;
                self.expect('>')?;
                DataType::Array(Box::new(inner))
            }
            "enum" => {
                self.expect('(')?;
                let mut values = Vec::new();
                if !self.eat(')') {
                    loop {
                        values.push(self.item()?);
                        if self.eat(')') {
                            break;
                        }
                        self.expect(',')?;
                    }
                }
                DataType::Enum(values)
            }
            "object" | "map" => {
                let mut fields = BTreeMap::new();
                if self.eat('{') && !self.eat('}') {
                    loop {
                        let key = self.item()?;
                        self.expect(':')?;
                        let value = self.data_type()?;
                        fields.insert(key, value);
                        if self.eat('}') {
                            break;
                        }
                        self.expect(',')?;
                    }
                }
                DataType::Object(fields)
            }
            other => simple_type(other).ok_or_else(|| self.error(&format!("unknown type `{name}`")))?,
        };
        while self.eat('[') {
            self.expect(']')?;
            ty = DataType::Array(Box::new(ty));
        }
        Ok(ty)
    }
}

/// A literal value (field defaults).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Name of the value's shape, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }
}

/// A constraint attached to an entity field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldConstraint {
    Unique,
    Nullable,
    MaxLength(u64),
    MinLength(u64),
    MaxValue(f64),
    MinValue(f64),
    Pattern(String),
}

impl FieldConstraint {
    /// The keyword used for this constraint in source text.
    pub fn keyword(&self) -> &'static str {
        match self {
            FieldConstraint::Unique => "unique",
            FieldConstraint::Nullable => "nullable",
            FieldConstraint::MaxLength(_) => "max_length",
            FieldConstraint::MinLength(_) => "min_length",
            FieldConstraint::MaxValue(_) => "max_value",
            FieldConstraint::MinValue(_) => "min_value",
            FieldConstraint::Pattern(_) => "pattern",
        }
    }
}

/// Every constraint keyword, for diagnostics.
pub const CONSTRAINT_KEYWORDS: &[&str] = &[
    "unique",
    "nullable",
    "max_length",
    "min_length",
    "max_value",
    "min_value",
    "pattern",
];
