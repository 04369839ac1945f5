//! Parser for FDML specification sources and migration files.
//!
//! Sources are YAML, read with serde_yaml into source shapes that accept
//! the shorthands of the format and are then converted into the document
//! model. Scenario steps follow Given/When/Then form. Every error carries
//! the line, column, and byte offset of the offending node and, where one
//! is known, a suggested fix.

pub mod error;

mod de;
mod document;
mod emit;
mod gherkin;
mod migration;

use fdml_core::{Document, Migration};
use rayon::prelude::*;
use serde::de::DeserializeOwned;

pub use emit::to_text;
pub use error::{ParseError, Result, Span};

/// Parse a specification document.
pub fn parse(src: &str) -> Result<Document> {
    let (src, bom) = strip_bom(src);
    if is_blank(src) {
        return Ok(Document::default());
    }
    from_yaml::<document::DocumentSource>(src)
        .map(|doc| doc.0)
        .map_err(|e| if bom { e.after_bom() } else { e })
}

/// Parse a migration file.
pub fn parse_migration(src: &str) -> Result<Migration> {
    let (src, bom) = strip_bom(src);
    if is_blank(src) {
        return Err(ParseError::new(Span::start(), "empty migration file")
            .with_suggestion("add `id: ...` and `up: [...]`"));
    }
    migration::read(src).map_err(|e| if bom { e.after_bom() } else { e })
}

/// Parse several documents separated by `---` lines. Each document parses
/// on its own, so one malformed document does not hide the others. Error
/// locations refer to the whole input.
pub fn parse_stream(src: &str) -> Vec<Result<Document>> {
    segments(src)
        .into_iter()
        .filter(|segment| !is_blank(segment.text))
        .map(|segment| {
            parse(segment.text).map_err(|e| e.shifted(segment.offset, segment.line))
        })
        .collect()
}

/// Parse independent sources in parallel, keeping input order.
pub fn parse_many<S: AsRef<str> + Sync>(sources: &[S]) -> Vec<Result<Document>> {
    sources.par_iter().map(|s| parse(s.as_ref())).collect()
}

pub(crate) fn from_yaml<T: DeserializeOwned>(src: &str) -> Result<T> {
    serde_yaml::from_str(src).map_err(|e| ParseError::from_yaml(&e, src))
}

fn strip_bom(src: &str) -> (&str, bool) {
    match src.strip_prefix('\u{feff}') {
        Some(rest) => (rest, true),
        None => (src, false),
    }
}

/// Only blank lines and comments.
fn is_blank(src: &str) -> bool {
    src.lines().all(|l| {
        let t = l.trim();
        t.is_empty() || t.starts_with('#')
    })
}

struct Segment<'a> {
    text: &'a str,
    offset: usize,
    /// Lines before the segment in the whole input.
    line: usize,
}

fn segments(src: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut start_line = 0;
    let mut offset = 0;
    for (i, line) in src.split_inclusive('\n').enumerate() {
        if line.trim_end() == "---" {
            out.push(Segment {
                text: &src[start..offset],
                offset: start,
                line: start_line,
            });
            start = offset + line.len();
            start_line = i + 1;
        }
        offset += line.len();
    }
    out.push(Segment {
        text: &src[start..],
        offset: start,
        line: start_line,
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use fdml_core::DataType;

    #[test]
    fn parses_inline_entity() {
        let doc =
            parse("entity: {id: user, fields: [{name: email, type: string, required: true}]}")
                .unwrap();
        let user = doc.entity("user").unwrap();
        let email = user.field("email").unwrap();
        assert_eq!(email.data_type, DataType::String);
        assert!(email.required);
    }

    #[test]
    fn stream_of_documents() {
        let src = "---\nentity: {id: a}\n---\n# nothing here\n---\nentity: {id: b}\n";
        let docs = parse_stream(src);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1].as_ref().unwrap().entities[0].id, "b");
    }

    #[test]
    fn stream_errors_use_whole_input_positions() {
        let src = "entity: {id: a}\n---\nentity:\n  id: b\n  feilds: []\n";
        let results = parse_stream(src);
        assert!(results[0].is_ok());
        let err = results[1].clone().unwrap_err();
        assert_eq!(err.line(), 5);
        assert_eq!(err.column(), 3);
        assert_eq!(err.offset(), src.find("feilds").unwrap());
    }

    #[test]
    fn many_in_parallel_keeps_order() {
        let sources = vec!["entity: {id: a}", "bogus: 1", "entity: {id: c}"];
        let results = parse_many(&sources);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert_eq!(results[2].as_ref().unwrap().entities[0].id, "c");
    }

    #[test]
    fn byte_order_mark_is_skipped() {
        let doc = parse("\u{feff}entity: {id: a}\n").unwrap();
        assert_eq!(doc.entities.len(), 1);
    }

    #[test]
    fn byte_order_mark_counts_in_first_line_columns() {
        let err = parse("\u{feff}bogus: 1").unwrap_err();
        assert_eq!(err.line(), 1);
        assert_eq!(err.column(), 2);
        assert_eq!(err.offset(), 3);
    }

    #[test]
    fn escapes_decode_and_malformed_escapes_fail() {
        let doc = parse("metadata:\n  author: \"caf\\u00e9\"\n").unwrap();
        assert_eq!(doc.metadata.unwrap().author.as_deref(), Some("café"));

        // Non-ASCII text where hex digits belong.
        let err = parse("metadata:\n  author: \"\\u0éé\"\n").unwrap_err();
        assert_eq!(err.line(), 2);
        assert!(parse("metadata:\n  author: \"\\u+0e9\"\n").is_err());
        assert!(parse("metadata:\n  author: \"\\u00\"\n").is_err());
    }

    #[test]
    fn non_finite_numbers_are_rejected() {
        let field = |default: &str| {
            format!("entity:\n  id: a\n  fields:\n    - {{name: x, type: float, default: {default}}}\n")
        };
        for bad in [".inf", "-.inf", ".nan", "18446744073709551615"] {
            let err = parse(&field(bad)).unwrap_err();
            assert_eq!(err.line(), 4, "{bad}: {err}");
        }
        let err = parse("entity:\n  id: a\n  fields:\n    - {name: x, type: float, constraints: [{max_value: .nan}]}\n")
            .unwrap_err();
        assert!(err.message.contains("not finite"), "{err}");

        // Out of f64 range is not a YAML float, so it stays text.
        let doc = parse(&field("1e400")).unwrap();
        assert_eq!(
            doc.entities[0].fields[0].default,
            Some(fdml_core::Value::String("1e400".into()))
        );
    }

    #[test]
    fn migrations_parse_with_byte_order_mark() {
        let m = parse_migration("\u{feff}id: m1\nup:\n  - remove_entity: a\n").unwrap();
        assert_eq!(m.id, "m1");
        assert!(parse_migration("# nothing\n").is_err());
    }

    #[test]
    fn error_display() {
        let err = parse("entity:\n  id: user\n  feilds: []\n").unwrap_err();
        let text = err.to_string();
        assert!(text.starts_with("3:3: "), "{text}");
        assert!(
            text.ends_with("unknown key `feilds` (hint: did you mean `fields`?)"),
            "{text}"
        );
    }
}
