//! Structural diff between two documents, by element id.

use std::collections::BTreeMap;
use std::fmt;

use fdml_core::{Document, ElementKind};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Change {
    Added,
    Removed,
    Modified,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffEntry {
    pub kind: ElementKind,
    /// Element id, or the link key for traceability links.
    pub id: String,
    pub change: Change,
}

/// Elements added, removed, or modified between two documents, ordered by
/// kind then id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DocumentDiff {
    entries: Vec<DiffEntry>,
}

impl DocumentDiff {
    pub fn between(before: &Document, after: &Document) -> Self {
        let mut entries = Vec::new();
        compare(&mut entries, ElementKind::System, &before.systems, &after.systems, |s| s.id.clone());
        compare(&mut entries, ElementKind::Entity, &before.entities, &after.entities, |e| e.id.clone());
        compare(&mut entries, ElementKind::Action, &before.actions, &after.actions, |a| a.id.clone());
        compare(&mut entries, ElementKind::Feature, &before.features, &after.features, |f| f.id.clone());
        compare(&mut entries, ElementKind::Flow, &before.flows, &after.flows, |f| f.id.clone());
        compare(
            &mut entries,
            ElementKind::Constraint,
            &before.constraints,
            &after.constraints,
            |c| c.id.clone(),
        );
        compare(
            &mut entries,
            ElementKind::Traceability,
            &before.traceability,
            &after.traceability,
            |l| l.key(),
        );
        DocumentDiff { entries }
    }

    pub fn entries(&self) -> &[DiffEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn changes(&self, change: Change) -> impl Iterator<Item = &DiffEntry> {
        self.entries.iter().filter(move |e| e.change == change)
    }
}

fn compare<T: PartialEq>(
    entries: &mut Vec<DiffEntry>,
    kind: ElementKind,
    before: &[T],
    after: &[T],
    key: impl Fn(&T) -> String,
) {
    let old = by_key(before, &key);
    let new = by_key(after, &key);

    let mut changes: BTreeMap<&str, Change> = BTreeMap::new();
    for (id, item) in &old {
        match new.get(id) {
            None => {
                changes.insert(id, Change::Removed);
            }
            Some(other) if *other != *item => {
                changes.insert(id, Change::Modified);
            }
            Some(_) => {}
        }
    }
    for id in new.keys() {
        if !old.contains_key(id) {
            changes.insert(id, Change::Added);
        }
    }
    entries.extend(changes.into_iter().map(|(id, change)| DiffEntry {
        kind,
        id: id.to_string(),
        change,
    }));
}

/// First element for each key; the validator reports duplicates.
fn by_key<'a, T>(items: &'a [T], key: &impl Fn(&T) -> String) -> BTreeMap<String, &'a T> {
    let mut map = BTreeMap::new();
    for item in items {
        map.entry(key(item)).or_insert(item);
    }
    map
}

impl fmt::Display for DocumentDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return writeln!(f, "  (no changes)");
        }
        for entry in &self.entries {
            let sign = match entry.change {
                Change::Added => '+',
                Change::Removed => '-',
                Change::Modified => '~',
            };
            writeln!(f, "  {sign} {} {}", entry.kind, entry.id)?;
        }
        Ok(())
    }
}
