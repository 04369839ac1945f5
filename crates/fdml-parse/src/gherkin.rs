//! Scenario steps in Given/When/Then form.

use std::fmt;

use fdml_core::{Step, StepKeyword};
use serde::de::{self, Deserialize, Deserializer, SeqAccess, Visitor};

use crate::error::{closest, Problem};

const KEYWORDS: &[&str] = &["given", "when", "then", "and"];

/// Parse one step line. `previous` is the keyword of the step before it,
/// if any; a scenario may not open with `And`.
pub(crate) fn step(text: &str, previous: Option<StepKeyword>) -> Result<Step, Problem> {
    let trimmed = text.trim();
    let (word, rest) = trimmed
        .split_once(char::is_whitespace)
        .unwrap_or((trimmed, ""));

    let Some(keyword) = StepKeyword::from_word(word) else {
        let mut problem = Problem::new(format!(
            "expected a step keyword (Given, When, Then, And), found `{word}`"
        ));
        let lower = word.to_ascii_lowercase();
        if lower == "but" {
            problem = problem.with_suggestion("use `And` instead of `But`");
        } else if let Some(k) = closest(&lower, KEYWORDS) {
            problem = problem.with_suggestion(format!("did you mean `{}`?", capitalize(k)));
        }
        return Err(problem);
    };
    if keyword == StepKeyword::And && previous.is_none() {
        return Err(Problem::new("a scenario cannot start with `And`")
            .with_suggestion("start with `Given`, `When` or `Then`"));
    }
    let rest = rest.trim();
    if rest.is_empty() {
        return Err(Problem::new(format!("step `{keyword}` has no text")));
    }
    Ok(Step::new(keyword, rest))
}

/// Parse a block of step lines. Blank lines and `#` comments are skipped.
pub(crate) fn block(text: &str) -> Result<Vec<Step>, Problem> {
    let mut steps: Vec<Step> = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let previous = steps.last().map(|s| s.keyword);
        steps.push(step(line, previous)?);
    }
    Ok(steps)
}

/// Steps from separate `given`/`when`/`then` lists: the first entry of each
/// list takes the list's keyword and later entries become `And`.
pub(crate) fn grouped(groups: &[(StepKeyword, Vec<String>)]) -> Vec<Step> {
    let mut steps = Vec::new();
    for (keyword, texts) in groups {
        for (i, text) in texts.iter().enumerate() {
            let keyword = if i == 0 { *keyword } else { StepKeyword::And };
            steps.push(Step::new(keyword, text.trim()));
        }
    }
    steps
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// A scenario's `steps`: a literal block of lines or a list of step strings.
#[derive(Default)]
pub(crate) struct StepsSource(pub Vec<Step>);

impl<'de> Deserialize<'de> for StepsSource {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(StepsVisitor)
    }
}

struct StepsVisitor;

impl<'de> Visitor<'de> for StepsVisitor {
    type Value = StepsSource;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("scenario steps as a block of lines or a list")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(StepsSource::default())
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        block(v).map(StepsSource).map_err(E::custom)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut steps: Vec<Step> = Vec::new();
        while let Some(line) = seq.next_element::<String>()? {
            let previous = steps.last().map(|s| s.keyword);
            steps.push(step(&line, previous).map_err(de::Error::custom)?);
        }
        Ok(StepsSource(steps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_keywords_case_insensitively() {
        let s = step("given a registered user", None).unwrap();
        assert_eq!(s.keyword, StepKeyword::Given);
        assert_eq!(s.text, "a registered user");
    }

    #[test]
    fn block_of_steps() {
        let text = "Given a user\n\n# setup done\nWhen they log in\nThen they see the dashboard\nAnd a welcome banner";
        let steps = block(text).unwrap();
        assert_eq!(steps.len(), 4);
        assert_eq!(steps[3].keyword, StepKeyword::And);
        assert_eq!(steps[1].to_string(), "When they log in");
    }

    #[test]
    fn but_is_rejected_with_hint() {
        let err = block("Given a user\nBut no session").unwrap_err();
        assert_eq!(err.suggestion.as_deref(), Some("use `And` instead of `But`"));
    }

    #[test]
    fn leading_and_is_rejected() {
        let err = step("And something", None).unwrap_err();
        assert!(err.message.contains("cannot start"));
    }

    #[test]
    fn misspelled_keyword_suggests() {
        let err = step("Wen they log in", None).unwrap_err();
        assert_eq!(err.suggestion.as_deref(), Some("did you mean `When`?"));
    }

    #[test]
    fn empty_step_text() {
        let err = step("Then", Some(StepKeyword::When)).unwrap_err();
        assert!(err.message.contains("no text"));
    }

    #[test]
    fn steps_from_yaml_list_and_block() {
        let list: StepsSource = serde_yaml::from_str("[Given a user, When they log in]").unwrap();
        assert_eq!(list.0.len(), 2);
        let text: StepsSource =
            serde_yaml::from_str("|\n  Given a user\n  Then they see a banner\n").unwrap();
        assert_eq!(text.0[1].keyword, StepKeyword::Then);
        assert!(serde_yaml::from_str::<StepsSource>("[And nothing first]").is_err());
    }

    #[test]
    fn grouped_lists() {
        let steps = grouped(&[
            (StepKeyword::Given, vec!["a user".into(), "a cart".into()]),
            (StepKeyword::When, vec!["they check out".into()]),
            (StepKeyword::Then, vec!["an order exists".into()]),
        ]);
        let keywords: Vec<_> = steps.iter().map(|s| s.keyword).collect();
        assert_eq!(
            keywords,
            vec![
                StepKeyword::Given,
                StepKeyword::And,
                StepKeyword::When,
                StepKeyword::Then
            ]
        );
    }
}
