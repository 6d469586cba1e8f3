//! Dense cluster detection.

use crate::detector::{SliceDetector, edge_transaction_ids, round_to};
use crate::messages::{SliceDetectionInput, SliceDetectionOutput};
use async_trait::async_trait;
use ledgerlens_core::anomaly::{
    Anomaly, AnomalyType, DetectionMethod, EVIDENCE_SLICE, EVIDENCE_TRANSACTION_IDS,
};
use ledgerlens_core::config::ClusterConfig;
use ledgerlens_core::error::Result;
use ledgerlens_core::hashing::evidence_id;
use ledgerlens_core::kernel::{KernelMetadata, duration_micros};
use ledgerlens_core::traits::{AnalysisKernel, BatchKernel};
use ledgerlens_graph::components::{induced_edge_count, weakly_connected_components};
use ledgerlens_graph::types::{TransactionGraph, directed_density};
use std::collections::BTreeSet;
use std::time::Instant;

/// Anomaly id code.
pub const CODE: &str = "CLUS";

/// Dense cluster detector.
///
/// Flags weakly connected components whose internal directed density is far
/// above what organic trading networks show at that size.
#[derive(Debug, Clone)]
pub struct DenseClusters {
    metadata: KernelMetadata,
    config: ClusterConfig,
}

impl Default for DenseClusters {
    fn default() -> Self {
        Self::new()
    }
}

impl DenseClusters {
    /// Create a detector with default thresholds.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ClusterConfig::default())
    }

    /// Create a detector with the given thresholds.
    #[must_use]
    pub fn with_config(config: ClusterConfig) -> Self {
        Self {
            metadata: KernelMetadata::deterministic("detect/dense-clusters")
                .with_description("Components with unnaturally high edge density")
                .with_emits(AnomalyType::DenseCluster),
            config,
        }
    }

    /// Detect dense clusters in one slice.
    #[must_use]
    pub fn compute(slice: &str, graph: &TransactionGraph, config: &ClusterConfig) -> Vec<Anomaly> {
        let mut anomalies = Vec::new();

        for members in weakly_connected_components(graph) {
            let size = members.len();
            if size < config.min_size {
                continue;
            }

            let edges = induced_edge_count(graph, &members);
            let density = directed_density(size, edges);
            if density <= config.threshold_for(size) {
                continue;
            }

            let set: BTreeSet<&str> = members.iter().map(String::as_str).collect();
            let internal = members.iter().flat_map(|source| {
                graph
                    .successors(source)
                    .filter(|(target, _)| set.contains(target))
                    .map(move |(target, _)| (source.as_str(), target))
            });
            let transaction_ids = edge_transaction_ids(graph, internal);

            anomalies.push(
                Anomaly::new(
                    evidence_id(CODE, slice, &members),
                    AnomalyType::DenseCluster,
                    config.severity,
                    members.clone(),
                    format!(
                        "A tight group of {} entities trades almost exclusively among itself \
                         ({:.1}% density), suggesting a shell company ring.",
                        size,
                        density * 100.0
                    ),
                    DetectionMethod::Deterministic,
                )
                .with_evidence(EVIDENCE_SLICE, slice)
                .with_evidence("density", density)
                .with_evidence("node_count", size)
                .with_evidence("edge_count", edges)
                .with_evidence(EVIDENCE_TRANSACTION_IDS, transaction_ids)
                .with_explanation("metric", "Density")
                .with_explanation("value", round_to(density, 2))
                .with_explanation(
                    "context",
                    format!(
                        "Threshold {:.1} for groups of {} entities",
                        config.threshold_for(size),
                        size
                    ),
                ),
            );
        }

        anomalies
    }
}

impl AnalysisKernel for DenseClusters {
    fn metadata(&self) -> &KernelMetadata {
        &self.metadata
    }
}

impl SliceDetector for DenseClusters {
    fn detect(&self, slice: &str, graph: &TransactionGraph) -> Vec<Anomaly> {
        Self::compute(slice, graph, &self.config)
    }
}

#[async_trait]
impl BatchKernel<SliceDetectionInput, SliceDetectionOutput> for DenseClusters {
    async fn execute(&self, input: SliceDetectionInput) -> Result<SliceDetectionOutput> {
        let start = Instant::now();
        let anomalies = self.detect(&input.slice, &input.graph);
        Ok(SliceDetectionOutput {
            anomalies,
            compute_time_us: duration_micros(start.elapsed()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::fixtures::graph;

    fn complete(names: &[&'static str]) -> Vec<(&'static str, &'static str, f64)> {
        let mut edges = Vec::new();
        for a in names {
            for b in names {
                if a != b {
                    edges.push((*a, *b, 10.0));
                }
            }
        }
        edges
    }

    #[test]
    fn test_complete_four_clique_flagged() {
        let g = graph(&complete(&["A", "B", "C", "D"]));
        let found = DenseClusters::new().detect("2024-Q1", &g);
        assert_eq!(found.len(), 1);
        let a = &found[0];
        assert_eq!(a.anomaly_type, AnomalyType::DenseCluster);
        assert_eq!(a.entities_involved, vec!["A", "B", "C", "D"]);
        assert_eq!(a.evidence_data["edge_count"], 12);
        assert_eq!(a.explanation_metadata["value"], 1.0);
        assert_eq!(a.transaction_ids().len(), 12);
    }

    #[test]
    fn test_sparse_component_ignored() {
        let g = graph(&[("A", "B", 1.0), ("B", "C", 1.0), ("C", "D", 1.0), ("D", "A", 1.0)]);
        assert!(DenseClusters::new().detect("2024-Q1", &g).is_empty());
    }

    #[test]
    fn test_triangle_too_small() {
        let g = graph(&complete(&["A", "B", "C"]));
        assert!(DenseClusters::new().detect("2024-Q1", &g).is_empty());
    }

    #[test]
    fn test_large_component_uses_lower_threshold() {
        // 10 nodes, 60 of 90 possible edges: density 0.67 passes 0.5 but not 0.8.
        let names = ["A", "B", "C", "D", "E", "F", "G", "H", "I", "J"];
        let mut edges = Vec::new();
        for (i, a) in names.iter().enumerate() {
            for offset in 1..=6 {
                edges.push((*a, names[(i + offset) % names.len()], 1.0));
            }
        }
        let found = DenseClusters::new().detect("ALL", &graph(&edges));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].entities_involved.len(), 10);
    }
}
