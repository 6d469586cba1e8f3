//! Bounded elementary cycle enumeration.
//!
//! Depth-first search with an explicit stack of owned paths. Work is bounded
//! three ways: a cap on start nodes, a cap on unique cycles, and a cap on
//! path expansions per start node. Hitting any cap truncates the result.

use crate::types::TransactionGraph;
use ledgerlens_core::config::CycleConfig;
use std::collections::BTreeSet;
use tracing::debug;

/// Rotate a cycle so it begins at its lexicographically smallest node.
///
/// Two node sequences describe the same directed cycle iff their canonical
/// rotations are equal.
#[must_use]
pub fn canonical_rotation(cycle: &[String]) -> Vec<String> {
    let Some(start) = cycle
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.cmp(b))
        .map(|(i, _)| i)
    else {
        return Vec::new();
    };
    cycle[start..]
        .iter()
        .chain(cycle[..start].iter())
        .cloned()
        .collect()
}

/// Result of a cycle search.
#[derive(Debug, Clone, Default)]
pub struct CycleEnumeration {
    /// Unique cycles in canonical rotation, in discovery order.
    pub cycles: Vec<Vec<String>>,
    /// Number of start nodes searched.
    pub candidates_searched: usize,
    /// True if any cap cut the search short.
    pub truncated: bool,
}

/// Bounded cycle search parameters.
#[derive(Debug, Clone)]
pub struct CycleSearch {
    /// Shortest cycle reported (in nodes).
    pub min_length: usize,
    /// Longest cycle searched (in nodes).
    pub max_length: usize,
    /// Cap on start nodes.
    pub max_candidates: usize,
    /// Cap on unique cycles.
    pub max_cycles: usize,
    /// Cap on path expansions per start node.
    pub max_path_expansions: usize,
}

impl Default for CycleSearch {
    fn default() -> Self {
        Self::from_config(&CycleConfig::default())
    }
}

impl CycleSearch {
    /// Search parameters from detector configuration.
    #[must_use]
    pub fn from_config(config: &CycleConfig) -> Self {
        Self {
            min_length: config.min_length,
            max_length: config.max_length,
            max_candidates: config.max_candidates,
            max_cycles: config.max_cycles,
            max_path_expansions: config.max_path_expansions,
        }
    }

    /// Enumerate elementary cycles.
    #[must_use]
    pub fn enumerate(&self, graph: &TransactionGraph) -> CycleEnumeration {
        let mut result = CycleEnumeration::default();
        if graph.edge_count() == 0 || self.max_cycles == 0 {
            return result;
        }

        // Only nodes with both inflow and outflow can sit on a cycle.
        let candidates: Vec<&str> = graph
            .nodes()
            .filter(|n| graph.in_degree(n) > 0 && graph.out_degree(n) > 0)
            .collect();
        if candidates.len() > self.max_candidates {
            debug!(
                candidates = candidates.len(),
                cap = self.max_candidates,
                "Capping cycle search start nodes"
            );
            result.truncated = true;
        }

        let mut seen: BTreeSet<Vec<String>> = BTreeSet::new();

        'starts: for start in candidates.into_iter().take(self.max_candidates) {
            result.candidates_searched += 1;
            let mut stack: Vec<Vec<String>> = vec![vec![start.to_string()]];
            let mut expansions = 0usize;

            while let Some(path) = stack.pop() {
                let Some(node) = path.last() else { continue };

                for (next, _) in graph.successors(node) {
                    if next == start {
                        if path.len() >= self.min_length {
                            let canonical = canonical_rotation(&path);
                            if seen.insert(canonical.clone()) {
                                result.cycles.push(canonical);
                                if result.cycles.len() >= self.max_cycles {
                                    debug!(cap = self.max_cycles, "Cycle cap reached");
                                    result.truncated = true;
                                    break 'starts;
                                }
                            }
                        }
                        continue;
                    }

                    if path.len() >= self.max_length
                        || graph.out_degree(next) == 0
                        || path.iter().any(|p| p == next)
                    {
                        continue;
                    }

                    expansions += 1;
                    if expansions > self.max_path_expansions {
                        debug!(start, cap = self.max_path_expansions, "Expansion cap reached");
                        result.truncated = true;
                        continue 'starts;
                    }

                    let mut extended = path.clone();
                    extended.push(next.to_string());
                    stack.push(extended);
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_graph;
    use chrono::{TimeZone, Utc};
    use ledgerlens_core::transaction::Transaction;

    fn graph(edges: &[(&str, &str)]) -> TransactionGraph {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let txs: Vec<Transaction> = edges
            .iter()
            .enumerate()
            .map(|(i, (a, b))| Transaction::new(format!("t{}", i), *a, *b, 100.0, ts))
            .collect();
        build_graph(&txs)
    }

    fn s(v: &[&str]) -> Vec<String> {
        v.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn test_canonical_rotation() {
        assert_eq!(canonical_rotation(&s(&["C", "A", "B"])), s(&["A", "B", "C"]));
        assert_eq!(canonical_rotation(&s(&["B", "C", "A"])), s(&["A", "B", "C"]));
        assert_ne!(
            canonical_rotation(&s(&["A", "C", "B"])),
            canonical_rotation(&s(&["A", "B", "C"])),
            "reversed direction is a different cycle"
        );
        assert!(canonical_rotation(&[]).is_empty());
    }

    #[test]
    fn test_triangle_found_once() {
        let g = graph(&[("A", "B"), ("B", "C"), ("C", "A")]);
        let found = CycleSearch::default().enumerate(&g);
        assert_eq!(found.cycles, vec![s(&["A", "B", "C"])]);
        assert!(!found.truncated);
    }

    #[test]
    fn test_two_cycles_ignored() {
        let g = graph(&[("A", "B"), ("B", "A")]);
        assert!(CycleSearch::default().enumerate(&g).cycles.is_empty());
    }

    #[test]
    fn test_length_bound() {
        // 7-node ring exceeds the default max length of 6.
        let g = graph(&[
            ("A", "B"),
            ("B", "C"),
            ("C", "D"),
            ("D", "E"),
            ("E", "F"),
            ("F", "G"),
            ("G", "A"),
        ]);
        assert!(CycleSearch::default().enumerate(&g).cycles.is_empty());

        let six = graph(&[
            ("A", "B"),
            ("B", "C"),
            ("C", "D"),
            ("D", "E"),
            ("E", "F"),
            ("F", "A"),
        ]);
        assert_eq!(CycleSearch::default().enumerate(&six).cycles.len(), 1);
    }

    #[test]
    fn test_cycle_cap_truncates() {
        // Complete digraph on 6 nodes has far more than 5 elementary cycles of length >= 3.
        let names = ["A", "B", "C", "D", "E", "F"];
        let mut edges = Vec::new();
        for a in names {
            for b in names {
                if a != b {
                    edges.push((a, b));
                }
            }
        }
        let search = CycleSearch {
            max_cycles: 5,
            ..Default::default()
        };
        let found = search.enumerate(&graph(&edges));
        assert_eq!(found.cycles.len(), 5);
        assert!(found.truncated);
    }

    #[test]
    fn test_empty_graph() {
        let found = CycleSearch::default().enumerate(&TransactionGraph::new());
        assert!(found.cycles.is_empty());
        assert_eq!(found.candidates_searched, 0);
    }
}
