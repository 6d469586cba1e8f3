//! Shared detector plumbing.

use crate::learned::LearnedSliceResult;
use ledgerlens_core::anomaly::Anomaly;
use ledgerlens_core::error::Result;
use ledgerlens_core::traits::AnalysisKernel;
use ledgerlens_graph::types::TransactionGraph;

/// A pure per-slice detector.
///
/// Implementations never fail: empty or degenerate graphs yield no anomalies.
pub trait SliceDetector: AnalysisKernel {
    /// Detect anomalies in one slice graph.
    fn detect(&self, slice: &str, graph: &TransactionGraph) -> Vec<Anomaly>;
}

/// A per-slice detector backed by a model trained on the slice itself.
///
/// Unlike [`SliceDetector`] it may fail; a failure only affects the slice it
/// happened in.
pub trait LearnedDetector: AnalysisKernel {
    /// Train on one slice and score it. `Ok(None)` means the slice was skipped.
    fn detect(
        &self,
        slice: &str,
        graph: &TransactionGraph,
    ) -> Result<Option<LearnedSliceResult>>;

    /// Hash identifying the model and its hyperparameters.
    fn fingerprint(&self) -> Result<String>;
}

/// Transaction ids behind a set of edges, in edge order, without duplicates.
pub(crate) fn edge_transaction_ids<'a>(
    graph: &TransactionGraph,
    edges: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Vec<String> {
    let mut seen = std::collections::BTreeSet::new();
    let mut ids = Vec::new();
    for (source, target) in edges {
        if let Some(edge) = graph.edge(source, target) {
            for id in &edge.transaction_ids {
                if seen.insert(id.as_str()) {
                    ids.push(id.clone());
                }
            }
        }
    }
    ids
}

/// Round to `places` decimals.
pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{TimeZone, Utc};
    use ledgerlens_core::transaction::Transaction;
    use ledgerlens_graph::builder::build_graph;
    use ledgerlens_graph::types::TransactionGraph;

    /// Graph with one transaction per `(source, target, amount)` triple.
    pub fn graph(edges: &[(&str, &str, f64)]) -> TransactionGraph {
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let txs: Vec<Transaction> = edges
            .iter()
            .enumerate()
            .map(|(i, (s, t, amount))| {
                Transaction::new(format!("tx-{}", i), *s, *t, *amount, ts).with_type("wire")
            })
            .collect();
        build_graph(&txs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_transaction_ids_dedup() {
        let g = fixtures::graph(&[("A", "B", 1.0), ("A", "B", 2.0), ("B", "C", 3.0)]);
        let ids = edge_transaction_ids(&g, [("A", "B"), ("B", "C"), ("A", "B"), ("X", "Y")]);
        assert_eq!(ids, vec!["tx-0", "tx-1", "tx-2"]);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(0.83333, 2), 0.83);
        assert_eq!(round_to(12.345, 1), 12.3);
    }
}
