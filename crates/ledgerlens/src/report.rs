//! Analysis report types.

use ledgerlens_compliance::learned::EdgeScore;
use ledgerlens_core::anomaly::Anomaly;
use ledgerlens_core::error::Result;
use ledgerlens_core::hashing::content_hash;
use ledgerlens_graph::snapshot::GraphSnapshot;
use ledgerlens_graph::types::TransactionGraph;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::temporal::PersistenceRecord;

/// Score of the edge `source -> target` in a list sorted by endpoints.
#[must_use]
pub fn find_edge_score(scores: &[EdgeScore], source: &str, target: &str) -> Option<f64> {
    scores
        .binary_search_by(|s| (s.source.as_str(), s.target.as_str()).cmp(&(source, target)))
        .ok()
        .map(|i| scores[i].score)
}

/// Outcome of one slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SliceStatus {
    /// Every stage ran.
    Completed,
    /// The learned detector failed; deterministic findings were kept.
    Degraded,
    /// The slice failed or panicked and contributed nothing.
    Failed,
    /// Skipped after cancellation.
    Cancelled,
}

/// Per-slice summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceSummary {
    /// Slice label.
    pub label: String,
    /// Nodes in the slice graph.
    pub node_count: usize,
    /// Edges in the slice graph.
    pub edge_count: usize,
    /// Raw deterministic findings.
    pub deterministic_findings: usize,
    /// Raw learned findings.
    pub learned_findings: usize,
    /// Whether the learned detector trained on this slice.
    pub learned_ran: bool,
    /// Final loss of the learned model, if it ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_loss: Option<f64>,
    /// Slice outcome.
    pub status: SliceStatus,
    /// Wall time for the slice in microseconds.
    pub compute_time_us: u64,
}

/// Node of the visualization view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewNode {
    /// Entity id.
    pub id: String,
    /// Distinct senders.
    pub in_degree: usize,
    /// Distinct receivers.
    pub out_degree: usize,
    /// Total received.
    pub in_amount: f64,
    /// Total sent.
    pub out_amount: f64,
    /// Whether any final finding involves this entity.
    pub flagged: bool,
}

/// Edge of the visualization view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewEdge {
    /// Source entity.
    pub source: String,
    /// Target entity.
    pub target: String,
    /// Total amount.
    pub weight: f64,
    /// Number of transactions.
    pub count: usize,
    /// Highest learned score across slices, 0 if never scored.
    pub score: f64,
}

/// Full-range graph annotated for display.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphView {
    /// Nodes, sorted.
    pub nodes: Vec<ViewNode>,
    /// Edges, sorted by endpoints.
    pub edges: Vec<ViewEdge>,
}

impl GraphView {
    /// Build the view of `graph` from final findings and merged edge scores.
    #[must_use]
    pub fn build(
        graph: &TransactionGraph,
        anomalies: &[Anomaly],
        edge_scores: &[EdgeScore],
    ) -> Self {
        let flagged: std::collections::BTreeSet<&str> = anomalies
            .iter()
            .flat_map(|a| a.entities_involved.iter().map(String::as_str))
            .collect();

        let nodes = graph
            .nodes()
            .map(|id| ViewNode {
                id: id.to_string(),
                in_degree: graph.in_degree(id),
                out_degree: graph.out_degree(id),
                in_amount: graph.in_amount(id),
                out_amount: graph.out_amount(id),
                flagged: flagged.contains(id),
            })
            .collect();

        let edges = graph
            .edges()
            .map(|(source, target, edge)| ViewEdge {
                source: source.to_string(),
                target: target.to_string(),
                weight: edge.weight(),
                count: edge.count,
                score: find_edge_score(edge_scores, source, target).unwrap_or(0.0),
            })
            .collect();

        Self { nodes, edges }
    }
}

/// Merge per-slice edge scores, keeping the maximum per edge. The result is
/// sorted by endpoints.
#[must_use]
pub fn merge_edge_scores<'a>(
    scores: impl IntoIterator<Item = &'a EdgeScore>,
) -> Vec<EdgeScore> {
    let mut merged: BTreeMap<(&str, &str), f64> = BTreeMap::new();
    for s in scores {
        merged
            .entry((s.source.as_str(), s.target.as_str()))
            .and_modify(|current| *current = current.max(s.score))
            .or_insert(s.score);
    }
    merged
        .into_iter()
        .map(|((source, target), score)| EdgeScore {
            source: source.to_string(),
            target: target.to_string(),
            score,
        })
        .collect()
}

/// SHA-256 over the canonical serialization of the final findings.
pub fn results_hash(anomalies: &[Anomaly]) -> Result<String> {
    content_hash(anomalies)
}

/// Result of one analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Unique run id.
    pub run_id: String,
    /// Context active during the run.
    pub context_id: String,
    /// Per-slice summaries, chronological.
    pub slices: Vec<SliceSummary>,
    /// Final annotated findings.
    pub anomalies: Vec<Anomaly>,
    /// Snapshot of the full-range graph.
    pub snapshot: GraphSnapshot,
    /// Highest learned score per edge, sorted by endpoints.
    pub edge_scores: Vec<EdgeScore>,
    /// Visualization view of the full-range graph.
    pub graph_view: GraphView,
    /// Recurrence per signature.
    pub persistence: Vec<PersistenceRecord>,
    /// Fingerprint of `anomalies`.
    pub results_hash: String,
    /// Fingerprint of the learned model configuration.
    pub model_fingerprint: String,
    /// Slices skipped after cancellation.
    pub cancelled_slices: Vec<String>,
    /// Slices that failed outright.
    pub failed_slices: Vec<String>,
}

impl AnalysisReport {
    /// Returns true if every slice ran to completion.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.cancelled_slices.is_empty() && self.failed_slices.is_empty()
    }

    /// Highest learned score of the edge `source -> target`.
    #[must_use]
    pub fn edge_score(&self, source: &str, target: &str) -> Option<f64> {
        find_edge_score(&self.edge_scores, source, target)
    }

    /// Number of findings per type label.
    #[must_use]
    pub fn counts_by_type(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for a in &self.anomalies {
            *counts.entry(a.anomaly_type.label().to_string()).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use ledgerlens_core::anomaly::{AnomalyType, DetectionMethod};
    use ledgerlens_core::transaction::Transaction;
    use ledgerlens_graph::builder::build_graph;

    fn score(source: &str, target: &str, score: f64) -> EdgeScore {
        EdgeScore {
            source: source.into(),
            target: target.into(),
            score,
        }
    }

    #[test]
    fn test_merge_keeps_max() {
        let scores = [score("A", "B", 0.2), score("A", "B", 0.7), score("B", "C", 0.1)];
        let merged = merge_edge_scores(&scores);
        assert_eq!(merged.len(), 2);
        assert_eq!(find_edge_score(&merged, "A", "B"), Some(0.7));
        assert_eq!(find_edge_score(&merged, "B", "C"), Some(0.1));
        assert_eq!(find_edge_score(&merged, "C", "B"), None);
    }

    #[test]
    fn test_arrow_in_entity_ids_keeps_edges_apart() {
        let scores = [score("a->b", "c", 0.3), score("a", "b->c", 0.8)];
        let merged = merge_edge_scores(&scores);
        assert_eq!(merged.len(), 2);
        assert_eq!(find_edge_score(&merged, "a->b", "c"), Some(0.3));
        assert_eq!(find_edge_score(&merged, "a", "b->c"), Some(0.8));

        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let graph = build_graph(&[
            Transaction::new("t1", "a->b", "c", 10.0, ts),
            Transaction::new("t2", "a", "b->c", 10.0, ts),
        ]);
        let view = GraphView::build(&graph, &[], &merged);
        let view_score = |source: &str| {
            view.edges
                .iter()
                .find(|e| e.source == source)
                .map(|e| e.score)
        };
        assert_eq!(view_score("a->b"), Some(0.3));
        assert_eq!(view_score("a"), Some(0.8));
    }

    #[test]
    fn test_graph_view() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let graph = build_graph(&[
            Transaction::new("t1", "A", "B", 10.0, ts),
            Transaction::new("t2", "B", "C", 20.0, ts),
        ]);
        let finding = Anomaly::new(
            "x",
            AnomalyType::WashTrading,
            0.5,
            vec!["A".into(), "B".into()],
            "",
            DetectionMethod::Deterministic,
        );
        let scores = merge_edge_scores(&[score("A", "B", 0.9)]);
        let view = GraphView::build(&graph, &[finding], &scores);

        assert_eq!(view.nodes.len(), 3);
        assert!(view.nodes[0].flagged);
        assert!(!view.nodes[2].flagged);
        assert_eq!(view.edges[0].score, 0.9);
        assert_eq!(view.edges[1].score, 0.0);
        assert_eq!(view.edges[1].weight, 20.0);
    }

    #[test]
    fn test_results_hash_order_sensitive() {
        let a = Anomaly::new(
            "a",
            AnomalyType::WashTrading,
            0.5,
            vec!["A".into()],
            "",
            DetectionMethod::Deterministic,
        );
        let mut b = a.clone();
        b.id = "b".into();
        let forward = results_hash(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(forward, results_hash(&[a.clone(), b.clone()]).unwrap());
        assert_ne!(forward, results_hash(&[b, a]).unwrap());
    }
}
