//! Cycle detection over id graphs.
//!
//! Depth-first search with white/gray/black coloring. Reaching a gray node
//! closes a cycle; the path from that node to the top of the stack is the
//! cycle. Each cycle is rotated to start at its smallest id so the same
//! cycle found from different entry points is reported once.

use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// All distinct cycles in a graph, each as a closed path
/// (`["a", "b", "a"]`). Nodes and edges are visited in sorted order, so the
/// result is deterministic.
pub fn find_cycles(edges: &BTreeMap<String, Vec<String>>) -> Vec<Vec<String>> {
    let mut color: BTreeMap<&str, Color> = BTreeMap::new();
    for (from, targets) in edges {
        color.insert(from, Color::White);
        for to in targets {
            color.insert(to, Color::White);
        }
    }

    fn visit<'g>(
        node: &'g str,
        edges: &'g BTreeMap<String, Vec<String>>,
        color: &mut BTreeMap<&'g str, Color>,
        stack: &mut Vec<&'g str>,
        cycles: &mut BTreeSet<Vec<String>>,
    ) {
        color.insert(node, Color::Gray);
        stack.push(node);
        if let Some(targets) = edges.get(node) {
            for next in targets {
                match color.get(next.as_str()).copied().unwrap_or(Color::White) {
                    Color::White => visit(next, edges, color, stack, cycles),
                    Color::Gray => {
                        if let Some(pos) = stack.iter().position(|n| *n == next.as_str()) {
                            cycles.insert(closed(&stack[pos..]));
                        }
                    }
                    Color::Black => {}
                }
            }
        }
        stack.pop();
        color.insert(node, Color::Black);
    }

    let nodes: Vec<&str> = color.keys().copied().collect();
    let mut stack = Vec::new();
    let mut cycles = BTreeSet::new();
    for node in nodes {
        if color.get(node) == Some(&Color::White) {
            visit(node, edges, &mut color, &mut stack, &mut cycles);
        }
    }
    cycles.into_iter().collect()
}

fn closed(path: &[&str]) -> Vec<String> {
    let start = path
        .iter()
        .enumerate()
        .min_by_key(|(_, id)| **id)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let mut cycle: Vec<String> = path[start..]
        .iter()
        .chain(&path[..start])
        .map(|s| s.to_string())
        .collect();
    if let Some(first) = cycle.first().cloned() {
        cycle.push(first);
    }
    cycle
}

/// `a -> b -> a`
pub fn describe(cycle: &[String]) -> String {
    cycle.join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        edges
            .iter()
            .map(|(from, to)| (from.to_string(), to.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    #[test]
    fn acyclic_graph() {
        let g = graph(&[("a", &["b", "c"]), ("b", &["c"])]);
        assert!(find_cycles(&g).is_empty());
    }

    #[test]
    fn reports_full_path_once() {
        let g = graph(&[("c", &["a"]), ("a", &["b"]), ("b", &["c"])]);
        let cycles = find_cycles(&g);
        assert_eq!(cycles.len(), 1);
        assert_eq!(describe(&cycles[0]), "a -> b -> c -> a");
    }

    #[test]
    fn self_loop() {
        let g = graph(&[("retry", &["retry"])]);
        assert_eq!(find_cycles(&g), vec![vec!["retry".to_string(), "retry".to_string()]]);
    }

    #[test]
    fn separate_cycles() {
        let g = graph(&[("a", &["b"]), ("b", &["a"]), ("x", &["y"]), ("y", &["x"])]);
        let cycles = find_cycles(&g);
        assert_eq!(cycles.len(), 2);
        assert_eq!(cycles[0][0], "a");
        assert_eq!(cycles[1][0], "x");
    }
}
