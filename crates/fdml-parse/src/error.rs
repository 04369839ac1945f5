//! Parse errors with source locations.

use std::fmt;

/// Marks where a suggested fix starts in a rendered message.
const HINT: &str = " (hint: ";

/// A location in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// Byte offset from the start of the input.
    pub offset: usize,
    /// 1-based line number.
    pub line: usize,
    /// 1-based column, counted in characters of the input. A leading byte
    /// order mark counts as the first character of line 1.
    pub column: usize,
}

impl Span {
    pub fn start() -> Self {
        Span {
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    /// The span of a 1-based line and character column in `src`.
    pub(crate) fn locate(src: &str, line: usize, column: usize) -> Self {
        let line = line.max(1);
        let column = column.max(1);
        let line_start: usize = src.split_inclusive('\n').take(line - 1).map(str::len).sum();
        let within: usize = src
            .get(line_start..)
            .unwrap_or_default()
            .chars()
            .take_while(|c| *c != '\n')
            .take(column - 1)
            .map(char::len_utf8)
            .sum();
        Span {
            offset: line_start + within,
            line,
            column,
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A syntax or structure error at the first offending token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}:{}: {message}{}", .span.line, .span.column, suggestion_suffix(.suggestion))]
pub struct ParseError {
    pub span: Span,
    pub message: String,
    pub suggestion: Option<String>,
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!("{HINT}{s})"),
        None => String::new(),
    }
}

impl ParseError {
    pub fn new(span: Span, message: impl Into<String>) -> Self {
        ParseError {
            span,
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn line(&self) -> usize {
        self.span.line
    }

    pub fn column(&self) -> usize {
        self.span.column
    }

    pub fn offset(&self) -> usize {
        self.span.offset
    }

    /// Locate a YAML error in `src`, the text that was handed to the
    /// deserializer.
    pub(crate) fn from_yaml(err: &serde_yaml::Error, src: &str) -> Self {
        let span = match err.location() {
            Some(at) => Span::locate(src, at.line(), at.column()),
            None => Span::start(),
        };
        let rendered = err.to_string();
        let (message, suggestion) = explain(without_location(&rendered));
        ParseError {
            span,
            message,
            suggestion,
        }
    }

    /// Re-anchor an error from a sub-document onto the enclosing input.
    pub(crate) fn shifted(mut self, offset: usize, lines: usize) -> Self {
        self.span.offset += offset;
        self.span.line += lines;
        self
    }

    /// Re-anchor an error onto input that began with a byte order mark.
    pub(crate) fn after_bom(mut self) -> Self {
        self.span.offset += '\u{feff}'.len_utf8();
        if self.span.line == 1 {
            self.span.column += 1;
        }
        self
    }
}

/// Result type alias for parsing.
pub type Result<T> = std::result::Result<T, ParseError>;

/// A message and optional fix raised while deserializing. serde errors
/// carry only text, so the fix travels in the rendered message and
/// [`ParseError::from_yaml`] splits it back out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Problem {
    pub(crate) message: String,
    pub(crate) suggestion: Option<String>,
}

impl Problem {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Problem {
            message: message.into(),
            suggestion: None,
        }
    }

    pub(crate) fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.message, suggestion_suffix(&self.suggestion))
    }
}

/// serde_yaml appends ` at line L column C` (or ` at position N`); the span
/// already holds that.
fn without_location(rendered: &str) -> &str {
    [" at line ", " at position "]
        .iter()
        .filter_map(|marker| rendered.find(marker))
        .min()
        .map_or(rendered, |i| &rendered[..i])
}

/// Split a rendered message into message and fix, rewording serde's
/// key errors into the vocabulary of source files.
fn explain(text: &str) -> (String, Option<String>) {
    if let Some((message, hint)) = text.rsplit_once(HINT) {
        if let Some(hint) = hint.strip_suffix(')') {
            return (message.to_string(), Some(hint.to_string()));
        }
    }

    for (serde_words, ours) in [
        ("unknown field `", "unknown key `"),
        ("unknown variant `", "unknown value `"),
    ] {
        let Some(at) = text.find(serde_words) else {
            continue;
        };
        let rest = &text[at + serde_words.len()..];
        let Some((word, expected)) = rest.split_once('`') else {
            continue;
        };
        let candidates = backticked(expected);
        let hint = match closest(word, &candidates) {
            Some(k) => Some(format!("did you mean `{k}`?")),
            None if !candidates.is_empty() => {
                Some(format!("expected one of: {}", candidates.join(", ")))
            }
            None => None,
        };
        return (format!("{}{ours}{word}`", &text[..at]), hint);
    }

    if let Some((prefix, key)) = quoted_after(text, "missing field `") {
        return (
            format!("{prefix}missing required key `{key}`"),
            Some(format!("add `{key}: ...`")),
        );
    }
    if let Some((prefix, key)) = quoted_after(text, "duplicate field `") {
        return (
            format!("{prefix}duplicate key `{key}`"),
            Some(format!("keep only one `{key}`")),
        );
    }
    (text.to_string(), None)
}

/// The text before `lead` and the backticked word right after it.
fn quoted_after<'t>(text: &'t str, lead: &str) -> Option<(&'t str, &'t str)> {
    let at = text.find(lead)?;
    let (word, _) = text[at + lead.len()..].split_once('`')?;
    Some((&text[..at], word))
}

fn backticked(text: &str) -> Vec<&str> {
    text.split('`').skip(1).step_by(2).collect()
}

/// The closest candidate by edit distance, if it is close enough to be a
/// plausible typo.
pub(crate) fn closest<'a>(word: &str, candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .map(|c| (edit_distance(word, c), *c))
        .filter(|(d, c)| *d <= 2.max(c.len() / 3))
        .min_by_key(|(d, _)| *d)
        .map(|(_, c)| c)
}

fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut row = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            row[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(row[j] + 1);
        }
        prev = row;
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_location_and_hint() {
        let err = ParseError::new(
            Span {
                offset: 10,
                line: 2,
                column: 3,
            },
            "unknown key `feilds`",
        )
        .with_suggestion("did you mean `fields`?");
        assert_eq!(
            err.to_string(),
            "2:3: unknown key `feilds` (hint: did you mean `fields`?)"
        );
    }

    #[test]
    fn closest_match() {
        assert_eq!(closest("feilds", &["id", "fields", "name"]), Some("fields"));
        assert_eq!(closest("entty", &["entity", "action"]), Some("entity"));
        assert_eq!(closest("zzzzzz", &["id", "name"]), None);
    }

    #[test]
    fn shifting() {
        let err = ParseError::new(Span::start(), "x").shifted(20, 4);
        assert_eq!(err.offset(), 20);
        assert_eq!(err.line(), 5);
        assert_eq!(err.column(), 1);
    }

    #[test]
    fn byte_order_mark_moves_first_line_only() {
        let first = ParseError::new(Span::locate("ab", 1, 2), "x").after_bom();
        assert_eq!((first.offset(), first.line(), first.column()), (4, 1, 3));
        let second = ParseError::new(Span::locate("a\nb", 2, 1), "x").after_bom();
        assert_eq!((second.offset(), second.line(), second.column()), (5, 2, 1));
    }

    #[test]
    fn locate_counts_characters() {
        let src = "name: é\n  ünder: x\n";
        let span = Span::locate(src, 2, 4);
        assert_eq!(span.offset, src.find("nder").unwrap());
        // Past the end of the input stays in bounds.
        assert_eq!(Span::locate(src, 9, 9).offset, src.len());
    }

    #[test]
    fn problems_render_and_split_back() {
        let problem = Problem::new("unknown type `strng`").with_suggestion("did you mean `string`?");
        let rendered = format!("entities[0].fields[0].type: {problem}");
        let (message, hint) = explain(&rendered);
        assert_eq!(message, "entities[0].fields[0].type: unknown type `strng`");
        assert_eq!(hint.as_deref(), Some("did you mean `string`?"));
    }

    #[test]
    fn serde_key_errors_are_reworded() {
        let (message, hint) =
            explain("entity: unknown field `feilds`, expected one of `id`, `name`, `fields`");
        assert_eq!(message, "entity: unknown key `feilds`");
        assert_eq!(hint.as_deref(), Some("did you mean `fields`?"));

        let (message, hint) = explain("features[0]: missing field `title`");
        assert_eq!(message, "features[0]: missing required key `title`");
        assert_eq!(hint.as_deref(), Some("add `title: ...`"));

        assert_eq!(
            without_location("did not find expected key at line 3 column 2, while parsing"),
            "did not find expected key"
        );
    }
}
