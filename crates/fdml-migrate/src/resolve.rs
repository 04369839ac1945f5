//! Dependency ordering of migrations (Kahn's algorithm).
//!
//! Edges run from a dependency to its dependents. Among migrations that are
//! ready at the same time the lexicographically smallest id goes first, so
//! timestamp-prefixed ids come out in chronological order.

use std::collections::{BTreeMap, BTreeSet};

use fdml_validate::graph::find_cycles;

use crate::error::{MigrationError, Result};

/// Order migration ids so every id comes after all of its dependencies.
///
/// `deps` maps each id to the ids it depends on.
pub fn topological_order(deps: &BTreeMap<String, Vec<String>>) -> Result<Vec<String>> {
    for (id, list) in deps {
        if let Some(dependency) = list.iter().find(|d| !deps.contains_key(*d)) {
            return Err(MigrationError::UnknownDependency {
                id: id.clone(),
                dependency: dependency.clone(),
            });
        }
    }

    let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (id, list) in deps {
        let unique: BTreeSet<&str> = list.iter().map(String::as_str).collect();
        in_degree.insert(id, unique.len());
        for dep in unique {
            dependents.entry(dep).or_default().push(id);
        }
    }

    let mut ready: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, n)| **n == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut order = Vec::with_capacity(deps.len());

    while let Some(id) = ready.pop_first() {
        order.push(id.to_string());
        for dependent in dependents.get(id).into_iter().flatten() {
            if let Some(n) = in_degree.get_mut(dependent) {
                *n -= 1;
                if *n == 0 {
                    ready.insert(*dependent);
                }
            }
        }
    }

    if order.len() < deps.len() {
        let placed: BTreeSet<&str> = order.iter().map(String::as_str).collect();
        let remaining: BTreeMap<String, Vec<String>> = deps
            .iter()
            .filter(|(id, _)| !placed.contains(id.as_str()))
            .map(|(id, list)| {
                let list = list
                    .iter()
                    .filter(|d| !placed.contains(d.as_str()))
                    .cloned()
                    .collect();
                (id.clone(), list)
            })
            .collect();
        let cycle = find_cycles(&remaining)
            .into_iter()
            .next()
            .unwrap_or_else(|| remaining.keys().cloned().collect());
        return Err(MigrationError::CircularDependency { cycle });
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps(edges: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        edges
            .iter()
            .map(|(id, d)| (id.to_string(), d.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    #[test]
    fn dependencies_first_then_ids() {
        let g = deps(&[
            ("003_c", &[]),
            ("001_a", &["002_b"]),
            ("002_b", &[]),
            ("004_d", &["001_a", "003_c"]),
        ]);
        assert_eq!(
            topological_order(&g).unwrap(),
            vec!["002_b", "001_a", "003_c", "004_d"]
        );
    }

    #[test]
    fn no_dependencies_is_lexicographic() {
        let g = deps(&[("20240301_x", &[]), ("20240101_y", &[]), ("20240201_z", &[])]);
        assert_eq!(
            topological_order(&g).unwrap(),
            vec!["20240101_y", "20240201_z", "20240301_x"]
        );
    }

    #[test]
    fn cycle_is_named() {
        let g = deps(&[("a", &["c"]), ("b", &["a"]), ("c", &["b"]), ("d", &[])]);
        match topological_order(&g) {
            Err(MigrationError::CircularDependency { cycle }) => {
                assert_eq!(cycle, vec!["a", "c", "b", "a"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn unknown_dependency() {
        let g = deps(&[("a", &["zzz"])]);
        assert!(matches!(
            topological_order(&g),
            Err(MigrationError::UnknownDependency { ref dependency, .. }) if dependency == "zzz"
        ));
    }
}
