//! Canonical text form of a document.
//!
//! Output is block style with plural element keywords, two-space indents,
//! and empty or absent optional values omitted. Parsing the output yields
//! a document equal to the input.

use fdml_core::{
    Action, Constraint, Document, Entity, Feature, Field, FieldConstraint, Flow, Index, Metadata,
    Parameter, Scenario, System, TraceabilityLink, Value,
};

enum Out {
    /// Already rendered inline text.
    Scalar(String),
    Map(Vec<(&'static str, Out)>),
    List(Vec<Out>),
}

#[derive(Default)]
struct MapOut(Vec<(&'static str, Out)>);

impl MapOut {
    fn text(mut self, key: &'static str, value: &str) -> Self {
        self.0.push((key, Out::Scalar(scalar(value))));
        self
    }

    fn opt(self, key: &'static str, value: &Option<String>) -> Self {
        match value {
            Some(v) => self.text(key, v),
            None => self,
        }
    }

    fn raw(mut self, key: &'static str, rendered: String) -> Self {
        self.0.push((key, Out::Scalar(rendered)));
        self
    }

    fn flag(self, key: &'static str, value: bool) -> Self {
        if value {
            self.raw(key, "true".to_string())
        } else {
            self
        }
    }

    fn strings(self, key: &'static str, values: &[String]) -> Self {
        self.list(key, values.iter().map(|v| Out::Scalar(scalar(v))).collect())
    }

    /// A list, omitted when empty.
    fn list(self, key: &'static str, items: Vec<Out>) -> Self {
        if items.is_empty() {
            self
        } else {
            self.always(key, Out::List(items))
        }
    }

    fn always(mut self, key: &'static str, value: Out) -> Self {
        self.0.push((key, value));
        self
    }

    fn done(self) -> Out {
        Out::Map(self.0)
    }
}

/// Render a document in canonical text form.
pub fn to_text(doc: &Document) -> String {
    let mut root = MapOut::default();
    if let Some(meta) = &doc.metadata {
        root = root.always("metadata", metadata(meta));
    }
    let root = root
        .list("systems", doc.systems.iter().map(system).collect())
        .list("entities", doc.entities.iter().map(entity).collect())
        .list("actions", doc.actions.iter().map(action).collect())
        .list("features", doc.features.iter().map(feature).collect())
        .list("flows", doc.flows.iter().map(flow).collect())
        .list("constraints", doc.constraints.iter().map(constraint).collect())
        .list("traceability", doc.traceability.iter().map(link).collect())
        .done();

    let mut out = String::new();
    render(&mut out, &root, 0);
    out
}

fn metadata(meta: &Metadata) -> Out {
    MapOut::default()
        .opt("version", &meta.version)
        .opt("author", &meta.author)
        .opt("description", &meta.description)
        .opt("created", &meta.created)
        .opt("updated", &meta.updated)
        .done()
}

fn system(system: &System) -> Out {
    let relationships = system
        .relationships
        .iter()
        .map(|r| {
            MapOut::default()
                .text("from", &r.from)
                .text("to", &r.to)
                .text("type", &r.kind)
                .opt("description", &r.description)
                .done()
        })
        .collect();
    MapOut::default()
        .text("id", &system.id)
        .opt("name", &system.name)
        .opt("description", &system.description)
        .strings("components", &system.components)
        .list("relationships", relationships)
        .done()
}

fn entity(entity: &Entity) -> Out {
    let relationships = entity
        .relationships
        .iter()
        .map(|r| {
            MapOut::default()
                .text("entity", &r.entity)
                .text("type", &r.kind)
                .opt("description", &r.description)
                .done()
        })
        .collect();
    MapOut::default()
        .text("id", &entity.id)
        .opt("name", &entity.name)
        .opt("description", &entity.description)
        .list("fields", entity.fields.iter().map(field).collect())
        .list("indexes", entity.indexes.iter().map(index).collect())
        .list("relationships", relationships)
        .done()
}

fn field(field: &Field) -> Out {
    let mut out = MapOut::default()
        .text("name", &field.name)
        .text("type", &field.data_type.to_string())
        .flag("required", field.required);
    if let Some(default) = &field.default {
        out = out.raw("default", value(default));
    }
    out = out.opt("description", &field.description);
    if !field.constraints.is_empty() {
        let items: Vec<String> = field.constraints.iter().map(field_constraint).collect();
        out = out.raw("constraints", format!("[{}]", items.join(", ")));
    }
    out.done()
}

fn field_constraint(constraint: &FieldConstraint) -> String {
    match constraint {
        FieldConstraint::Unique | FieldConstraint::Nullable => constraint.keyword().to_string(),
        FieldConstraint::MaxLength(n) | FieldConstraint::MinLength(n) => {
            format!("{{{}: {n}}}", constraint.keyword())
        }
        FieldConstraint::MaxValue(v) | FieldConstraint::MinValue(v) => {
            format!("{{{}: {}}}", constraint.keyword(), number(*v))
        }
        FieldConstraint::Pattern(p) => format!("{{pattern: {}}}", quote(p)),
    }
}

fn index(index: &Index) -> Out {
    MapOut::default()
        .opt("name", &index.name)
        .always(
            "fields",
            Out::List(index.fields.iter().map(|f| Out::Scalar(scalar(f))).collect()),
        )
        .flag("unique", index.unique)
        .done()
}

fn action(action: &Action) -> Out {
    let exceptions = action
        .exceptions
        .iter()
        .map(|e| {
            MapOut::default()
                .text("code", &e.code)
                .opt("message", &e.message)
                .done()
        })
        .collect();
    MapOut::default()
        .text("id", &action.id)
        .opt("name", &action.name)
        .opt("description", &action.description)
        .list("inputs", action.inputs.iter().map(parameter).collect())
        .list("outputs", action.outputs.iter().map(parameter).collect())
        .opt("logic", &action.logic)
        .strings("preconditions", &action.preconditions)
        .strings("postconditions", &action.postconditions)
        .list("exceptions", exceptions)
        .done()
}

fn parameter(param: &Parameter) -> Out {
    MapOut::default()
        .text("name", &param.name)
        .text("type", &param.data_type.to_string())
        .flag("required", param.required)
        .done()
}

fn feature(feature: &Feature) -> Out {
    MapOut::default()
        .text("id", &feature.id)
        .text("title", &feature.title)
        .opt("description", &feature.description)
        .list("scenarios", feature.scenarios.iter().map(scenario).collect())
        .strings("acceptance_criteria", &feature.acceptance_criteria)
        .strings("depends_on", &feature.depends_on)
        .done()
}

fn scenario(scenario: &Scenario) -> Out {
    let steps = scenario
        .steps
        .iter()
        .map(|s| Out::Scalar(quote(&s.to_string())))
        .collect();
    MapOut::default()
        .text("name", &scenario.name)
        .opt("action", &scenario.action)
        .list("steps", steps)
        .done()
}

fn flow(flow: &Flow) -> Out {
    let steps = flow
        .steps
        .iter()
        .map(|s| {
            MapOut::default()
                .text("action", &s.action)
                .opt("on_success", &s.on_success)
                .opt("on_failure", &s.on_failure)
                .done()
        })
        .collect();
    MapOut::default()
        .text("id", &flow.id)
        .opt("name", &flow.name)
        .opt("description", &flow.description)
        .always("steps", Out::List(steps))
        .done()
}

fn constraint(constraint: &Constraint) -> Out {
    MapOut::default()
        .text("id", &constraint.id)
        .opt("name", &constraint.name)
        .opt("description", &constraint.description)
        .strings("applies_to", &constraint.applies_to)
        .text("condition", &constraint.condition)
        .opt("message", &constraint.message)
        .done()
}

fn link(link: &TraceabilityLink) -> Out {
    MapOut::default()
        .text("from", &link.from)
        .text("to", &link.to)
        .text("relation", link.relation.as_str())
        .opt("description", &link.description)
        .done()
}

fn render(out: &mut String, node: &Out, indent: usize) {
    match node {
        Out::Scalar(s) => {
            out.push_str(s);
            out.push('\n');
        }
        Out::Map(entries) => {
            for (key, value) in entries {
                pad(out, indent);
                out.push_str(key);
                out.push(':');
                match value {
                    Out::Scalar(s) => {
                        out.push(' ');
                        out.push_str(s);
                        out.push('\n');
                    }
                    Out::Map(m) if m.is_empty() => out.push_str(" {}\n"),
                    Out::List(l) if l.is_empty() => out.push_str(" []\n"),
                    nested => {
                        out.push('\n');
                        render(out, nested, indent + 2);
                    }
                }
            }
        }
        Out::List(items) => {
            for item in items {
                pad(out, indent);
                out.push('-');
                match item {
                    Out::Scalar(s) => {
                        out.push(' ');
                        out.push_str(s);
                        out.push('\n');
                    }
                    Out::Map(m) if m.is_empty() => out.push_str(" {}\n"),
                    Out::List(l) if l.is_empty() => out.push_str(" []\n"),
                    nested => {
                        // The first line of the nested block shares the dash line.
                        let mut inner = String::new();
                        render(&mut inner, nested, indent + 2);
                        out.push(' ');
                        out.push_str(&inner[indent + 2..]);
                    }
                }
            }
        }
    }
}

fn pad(out: &mut String, indent: usize) {
    out.extend(std::iter::repeat(' ').take(indent));
}

fn value(v: &Value) -> String {
    match v {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Integer(n) => n.to_string(),
        Value::Float(f) => number(*f),
        Value::String(s) => scalar(s),
        Value::List(items) => {
            let items: Vec<String> = items.iter().map(value).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Map(entries) => {
            let items: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!("{}: {}", scalar(k), value(v)))
                .collect();
            format!("{{{}}}", items.join(", "))
        }
    }
}

/// Shortest text that reads back as the same float. The parser rejects
/// the non-finite spellings, so such a value fails loudly on the way back.
fn number(f: f64) -> String {
    if f.is_nan() {
        ".nan".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { ".inf" } else { "-.inf" }.to_string()
    } else {
        format!("{f:?}")
    }
}

/// Whether plain `s` would be read as something other than a string.
fn reads_as_other(s: &str) -> bool {
    matches!(
        s,
        "" | "~" | "null" | "Null" | "NULL" | "true" | "True" | "TRUE" | "false" | "False" | "FALSE"
    ) || s.parse::<f64>().is_ok()
        || ["0x", "0o", "0b"].iter().any(|p| s.starts_with(p))
}

/// Plain when the text reads back as the same string, quoted otherwise.
fn scalar(s: &str) -> String {
    let plain = s
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '/' | '@'))
        && !reads_as_other(s);
    if plain {
        s.to_string()
    } else {
        quote(s)
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;
    use fdml_core::{
        ActionException, DataType, EntityRelationship, FlowStep, Relation, Relationship, Step,
        StepKeyword,
    };

    fn sample() -> Document {
        let mut doc = Document::new();
        doc.metadata = Some(Metadata {
            version: Some("1.0".into()),
            author: Some("dana".into()),
            ..Metadata::default()
        });
        doc.systems.push(System {
            id: "shop".into(),
            name: Some("Shop".into()),
            description: None,
            components: vec!["web".into(), "db".into()],
            relationships: vec![Relationship {
                from: "web".into(),
                to: "db".into(),
                kind: "reads".into(),
                description: None,
            }],
        });
        let mut email = Field::new("email", DataType::String)
            .required()
            .with_constraint(FieldConstraint::Unique)
            .with_constraint(FieldConstraint::MaxLength(120))
            .with_constraint(FieldConstraint::Pattern(r#"^[^@]+@"x"$"#.into()));
        email.description = Some("Login address,\nlowercased".into());
        let mut age = Field::new("age", DataType::Integer)
            .with_constraint(FieldConstraint::MinValue(0.0))
            .with_constraint(FieldConstraint::MaxValue(150.5));
        age.default = Some(Value::Integer(18));
        let status = Field::new(
            "status",
            DataType::Enum(vec!["active".into(), "on hold".into()]),
        );
        let mut user = Entity::new("user")
            .with_field(email)
            .with_field(age)
            .with_field(status);
        user.indexes.push(Index {
            name: Some("by_email".into()),
            fields: vec!["email".into()],
            unique: true,
        });
        let mut orders = EntityRelationship::new("order", "has_many");
        orders.description = Some("Placed orders".into());
        user.relationships.push(orders);
        doc.entities.push(user);
        doc.entities.push(Entity::new("order"));

        let mut login = Action::new("login");
        login.inputs.push(Parameter::new("email", DataType::String));
        login.outputs.push(Parameter::new(
            "roles",
            DataType::Array(Box::new(DataType::String)),
        ));
        login.logic = Some("check password\nissue token".into());
        login.exceptions.push(ActionException {
            code: "AUTH_FAILED".into(),
            message: Some("wrong: password".into()),
        });
        doc.actions.push(login);

        let mut feature = Feature::new("auth", "User authentication");
        feature.scenarios.push(Scenario {
            name: "successful login".into(),
            action: Some("login".into()),
            steps: vec![
                Step::new(StepKeyword::Given, "a user with \"quotes\""),
                Step::new(StepKeyword::When, "they log in"),
                Step::new(StepKeyword::Then, "a token is issued"),
            ],
        });
        feature.depends_on.push("accounts".into());
        doc.features.push(feature);

        doc.flows.push(Flow {
            id: "signin".into(),
            name: None,
            description: None,
            steps: vec![FlowStep {
                action: "login".into(),
                on_success: None,
                on_failure: Some("login".into()),
            }],
        });
        let mut c = fdml_core::Constraint::new("adult", "user.age >= 18");
        c.applies_to.push("user".into());
        doc.constraints.push(c);
        doc.traceability
            .push(TraceabilityLink::new("auth", "login", Relation::Implements));
        doc
    }

    #[test]
    fn round_trips() {
        let doc = sample();
        let text = to_text(&doc);
        let back = parse(&text).unwrap_or_else(|e| panic!("{e}\n{text}"));
        assert_eq!(back, doc);
    }

    #[test]
    fn emitting_is_stable() {
        let text = to_text(&sample());
        let again = to_text(&parse(&text).unwrap());
        assert_eq!(text, again);
    }

    #[test]
    fn layout() {
        let mut doc = Document::new();
        doc.entities.push(
            Entity::new("user").with_field(Field::new("email", DataType::String).required()),
        );
        assert_eq!(
            to_text(&doc),
            "entities:\n  - id: user\n    fields:\n      - name: email\n        type: string\n        required: true\n"
        );
    }

    #[test]
    fn scalars_quote_when_ambiguous() {
        assert_eq!(scalar("user_id"), "user_id");
        assert_eq!(scalar("42"), "\"42\"");
        assert_eq!(scalar("true"), "\"true\"");
        assert_eq!(scalar("two words"), "\"two words\"");
        assert_eq!(scalar(""), "\"\"");
        assert_eq!(scalar("-x"), "\"-x\"");
        assert_eq!(scalar("1e400"), "\"1e400\"");
        assert_eq!(scalar("0x1F"), "\"0x1F\"");
        assert_eq!(scalar("v1.2"), "v1.2");
    }

    #[test]
    fn extreme_numbers_round_trip() {
        let mut big = Field::new("big", DataType::Float)
            .with_constraint(FieldConstraint::MinValue(1e300))
            .with_constraint(FieldConstraint::MaxValue(f64::MAX));
        big.default = Some(Value::Float(f64::MAX));
        let mut low = Field::new("low", DataType::Integer);
        low.default = Some(Value::Integer(i64::MIN));
        let mut tiny = Field::new("tiny", DataType::Float);
        tiny.default = Some(Value::Float(f64::MIN_POSITIVE));
        let mut text = Field::new("text", DataType::String);
        text.default = Some(Value::String("1e400".into()));
        let mut doc = Document::new();
        doc.entities.push(
            Entity::new("limits")
                .with_field(big)
                .with_field(low)
                .with_field(tiny)
                .with_field(text),
        );

        let out = to_text(&doc);
        assert_eq!(parse(&out).unwrap_or_else(|e| panic!("{e}\n{out}")), doc);
    }

    #[test]
    fn non_finite_numbers_fail_on_the_way_back() {
        assert_eq!(value(&Value::Float(f64::INFINITY)), ".inf");
        assert_eq!(value(&Value::Float(f64::NEG_INFINITY)), "-.inf");
        assert_eq!(value(&Value::Float(f64::NAN)), ".nan");

        let mut field = Field::new("x", DataType::Float);
        field.default = Some(Value::Float(f64::INFINITY));
        let mut doc = Document::new();
        doc.entities.push(Entity::new("a").with_field(field));
        let err = parse(&to_text(&doc)).unwrap_err();
        assert!(err.message.contains("not finite"), "{err}");
    }

    #[test]
    fn empty_document() {
        assert_eq!(to_text(&Document::new()), "");
        assert_eq!(parse("").unwrap(), Document::new());
    }
}
