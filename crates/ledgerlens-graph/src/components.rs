//! Weakly connected components.

use crate::types::TransactionGraph;
use std::collections::BTreeSet;

/// Weakly connected components, each sorted, ordered by smallest member.
#[must_use]
pub fn weakly_connected_components(graph: &TransactionGraph) -> Vec<Vec<String>> {
    let mut visited: BTreeSet<&str> = BTreeSet::new();
    let mut components = Vec::new();

    for root in graph.nodes() {
        if visited.contains(root) {
            continue;
        }

        let mut component: BTreeSet<&str> = BTreeSet::new();
        let mut frontier = vec![root];
        visited.insert(root);

        while let Some(node) = frontier.pop() {
            component.insert(node);
            let neighbours = graph
                .successors(node)
                .map(|(n, _)| n)
                .chain(graph.predecessors(node));
            for next in neighbours {
                if visited.insert(next) {
                    frontier.push(next);
                }
            }
        }

        components.push(component.into_iter().map(String::from).collect());
    }

    components
}

/// Number of directed edges with both endpoints in `members`.
#[must_use]
pub fn induced_edge_count(graph: &TransactionGraph, members: &[String]) -> usize {
    let set: BTreeSet<&str> = members.iter().map(String::as_str).collect();
    members
        .iter()
        .map(|m| {
            graph
                .successors(m)
                .filter(|(target, _)| set.contains(target))
                .count()
        })
        .sum()
}
