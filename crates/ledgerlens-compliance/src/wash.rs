//! Wash trading detection.

use crate::detector::{SliceDetector, edge_transaction_ids, round_to};
use crate::messages::{SliceDetectionInput, SliceDetectionOutput};
use async_trait::async_trait;
use ledgerlens_core::anomaly::{
    Anomaly, AnomalyType, DetectionMethod, EVIDENCE_SLICE, EVIDENCE_TRANSACTION_IDS,
};
use ledgerlens_core::config::WashConfig;
use ledgerlens_core::error::Result;
use ledgerlens_core::hashing::evidence_id;
use ledgerlens_core::kernel::{KernelMetadata, duration_micros};
use ledgerlens_core::traits::{AnalysisKernel, BatchKernel};
use ledgerlens_graph::types::TransactionGraph;
use std::time::Instant;

/// Anomaly id code.
pub const CODE: &str = "WASH";

/// Wash trading detector.
///
/// Each unordered pair with edges in both directions is evaluated once, from
/// the lexicographically smaller endpoint.
#[derive(Debug, Clone)]
pub struct WashTrading {
    metadata: KernelMetadata,
    config: WashConfig,
}

impl Default for WashTrading {
    fn default() -> Self {
        Self::new()
    }
}

impl WashTrading {
    /// Create a detector with default thresholds.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(WashConfig::default())
    }

    /// Create a detector with the given thresholds.
    #[must_use]
    pub fn with_config(config: WashConfig) -> Self {
        Self {
            metadata: KernelMetadata::deterministic("detect/wash-trading")
                .with_description("Reciprocal volume with negligible net flow")
                .with_emits(AnomalyType::WashTrading),
            config,
        }
    }

    /// Detect wash trading in one slice.
    #[must_use]
    pub fn compute(slice: &str, graph: &TransactionGraph, config: &WashConfig) -> Vec<Anomaly> {
        let mut anomalies = Vec::new();

        for (a, b, forward) in graph.edges() {
            if a >= b {
                continue;
            }
            let Some(backward) = graph.edge(b, a) else {
                continue;
            };

            let volume_ab = forward.weight();
            let volume_ba = backward.weight();
            let total = volume_ab + volume_ba;
            let net = (volume_ab - volume_ba).abs();
            if total <= config.min_total_volume || net >= total * config.max_net_ratio {
                continue;
            }

            let entities = vec![a.to_string(), b.to_string()];
            let transaction_ids = edge_transaction_ids(graph, [(a, b), (b, a)]);
            let ratio = net / total;

            anomalies.push(
                Anomaly::new(
                    evidence_id(CODE, slice, &entities),
                    AnomalyType::WashTrading,
                    config.severity,
                    entities,
                    format!(
                        "These entities traded {:.2} back and forth while the net amount moved \
                         was only {:.2}, inflating activity without transferring value.",
                        total, net
                    ),
                    DetectionMethod::Deterministic,
                )
                .with_evidence(EVIDENCE_SLICE, slice)
                .with_evidence("total_volume", total)
                .with_evidence("net_flow", net)
                .with_evidence("volume_forward", volume_ab)
                .with_evidence("volume_backward", volume_ba)
                .with_evidence(EVIDENCE_TRANSACTION_IDS, transaction_ids)
                .with_explanation("metric", "Net Flow / Volume")
                .with_explanation("value", round_to(ratio, 4))
                .with_explanation(
                    "context",
                    format!("{:.1}% net of {:.2} total volume", ratio * 100.0, total),
                ),
            );
        }

        anomalies
    }
}

impl AnalysisKernel for WashTrading {
    fn metadata(&self) -> &KernelMetadata {
        &self.metadata
    }
}

impl SliceDetector for WashTrading {
    fn detect(&self, slice: &str, graph: &TransactionGraph) -> Vec<Anomaly> {
        Self::compute(slice, graph, &self.config)
    }
}

#[async_trait]
impl BatchKernel<SliceDetectionInput, SliceDetectionOutput> for WashTrading {
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

    #[test]
    fn test_balanced_ping_pong_detected() {
        let g = graph(&[("A", "B", 10000.0), ("B", "A", 9800.0)]);
        let found = WashTrading::new().detect("2024-02", &g);
        assert_eq!(found.len(), 1, "pair must be reported once");

        let a = &found[0];
        assert_eq!(a.entities_involved, vec!["A", "B"]);
        assert_eq!(a.severity, 0.85);
        assert_eq!(a.evidence_data["total_volume"], 19800.0);
        assert_eq!(a.evidence_data["net_flow"], 200.0);
        assert_eq!(a.transaction_ids(), vec!["tx-0", "tx-1"]);
        assert_eq!(a.explanation_metadata["metric"], "Net Flow / Volume");
    }

    #[test]
    fn test_lopsided_flow_ignored() {
        let g = graph(&[("A", "B", 10000.0), ("B", "A", 2000.0)]);
        assert!(WashTrading::new().detect("2024-02", &g).is_empty());
    }

    #[test]
    fn test_low_volume_ignored() {
        let g = graph(&[("A", "B", 2000.0), ("B", "A", 2000.0)]);
        assert!(WashTrading::new().detect("2024-02", &g).is_empty());
    }

    #[test]
    fn test_one_way_edge_ignored() {
        let g = graph(&[("A", "B", 10000.0)]);
        assert!(WashTrading::new().detect("2024-02", &g).is_empty());
    }
}
