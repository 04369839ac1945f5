//! `fdml parse`: print a specification in canonical form.

use std::path::Path;

use anyhow::{Context, Result};

pub fn run(file: &Path, json: bool) -> Result<()> {
    let text =
        std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let doc = fdml_parse::parse(&text).with_context(|| format!("parsing {}", file.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else {
        print!("{}", fdml_parse::to_text(&doc));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_location_of_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.fdml");
        std::fs::write(&path, "entity:\n  fields: []\n").unwrap();

        let err = run(&path, false).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("bad.fdml"), "{message}");
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(run(&dir.path().join("nope.fdml"), true).is_err());
    }
}
