//! Structuring (smurfing) detection.
//!
//! A hub sending near-identical amounts to many counterparties (fan-out) or
//! receiving near-identical amounts from many (fan-in). A node flagged for
//! fan-out is not checked for fan-in.

use crate::detector::{SliceDetector, edge_transaction_ids, round_to};
use crate::messages::{SliceDetectionInput, SliceDetectionOutput};
use async_trait::async_trait;
use ledgerlens_core::anomaly::{
    Anomaly, AnomalyType, DetectionMethod, EVIDENCE_SLICE, EVIDENCE_TRANSACTION_IDS,
};
use ledgerlens_core::config::StructuringConfig;
use ledgerlens_core::error::Result;
use ledgerlens_core::hashing::evidence_id;
use ledgerlens_core::kernel::{KernelMetadata, duration_micros};
use ledgerlens_core::traits::{AnalysisKernel, BatchKernel};
use ledgerlens_graph::types::TransactionGraph;
use std::time::Instant;

/// Anomaly id code for fan-out.
pub const FAN_OUT_CODE: &str = "FANOUT";
/// Anomaly id code for fan-in.
pub const FAN_IN_CODE: &str = "FANIN";

/// Direction of a structuring pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanDirection {
    /// One payer, many payees.
    Out,
    /// Many payers, one payee.
    In,
}

impl FanDirection {
    fn pattern(self) -> &'static str {
        match self {
            FanDirection::Out => "Fan-Out",
            FanDirection::In => "Fan-In",
        }
    }

    fn code(self) -> &'static str {
        match self {
            FanDirection::Out => FAN_OUT_CODE,
            FanDirection::In => FAN_IN_CODE,
        }
    }

    fn anomaly_type(self) -> AnomalyType {
        match self {
            FanDirection::Out => AnomalyType::StructuringFanOut,
            FanDirection::In => AnomalyType::StructuringFanIn,
        }
    }
}

/// Amount statistics over a hub's edges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmountStats {
    /// Mean edge weight.
    pub mean: f64,
    /// Population standard deviation.
    pub std_dev: f64,
}

impl AmountStats {
    /// Mean and population standard deviation. `None` for an empty input.
    #[must_use]
    pub fn of(amounts: &[f64]) -> Option<Self> {
        if amounts.is_empty() {
            return None;
        }
        let n = amounts.len() as f64;
        let mean = amounts.iter().sum::<f64>() / n;
        let variance = amounts.iter().map(|a| (a - mean).powi(2)).sum::<f64>() / n;
        Some(Self {
            mean,
            std_dev: variance.sqrt(),
        })
    }

    /// Coefficient of variation.
    #[must_use]
    pub fn variation(&self) -> f64 {
        if self.mean > 0.0 {
            self.std_dev / self.mean
        } else {
            f64::INFINITY
        }
    }
}

/// Structuring detector.
#[derive(Debug, Clone)]
pub struct Structuring {
    metadata: KernelMetadata,
    config: StructuringConfig,
}

impl Default for Structuring {
    fn default() -> Self {
        Self::new()
    }
}

impl Structuring {
    /// Create a detector with default thresholds.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(StructuringConfig::default())
    }

    /// Create a detector with the given thresholds.
    #[must_use]
    pub fn with_config(config: StructuringConfig) -> Self {
        Self {
            metadata: KernelMetadata::deterministic("detect/structuring")
                .with_description("Hub-and-spoke transfers of near-identical size")
                .with_emits(AnomalyType::StructuringFanOut)
                .with_emits(AnomalyType::StructuringFanIn),
            config,
        }
    }

    /// Detect structuring in one slice.
    #[must_use]
    pub fn compute(
        slice: &str,
        graph: &TransactionGraph,
        config: &StructuringConfig,
    ) -> Vec<Anomaly> {
        let mut anomalies = Vec::new();

        for node in graph.nodes() {
            let outgoing: Vec<(&str, f64)> = graph
                .successors(node)
                .map(|(target, edge)| (target, edge.weight()))
                .collect();
            if let Some(a) = Self::check(slice, graph, node, &outgoing, FanDirection::Out, config)
            {
                anomalies.push(a);
                continue;
            }

            let incoming: Vec<(&str, f64)> = graph
                .predecessors(node)
                .filter_map(|source| graph.edge(source, node).map(|e| (source, e.weight())))
                .collect();
            if let Some(a) = Self::check(slice, graph, node, &incoming, FanDirection::In, config) {
                anomalies.push(a);
            }
        }

        anomalies
    }

    fn check(
        slice: &str,
        graph: &TransactionGraph,
        hub: &str,
        spokes: &[(&str, f64)],
        direction: FanDirection,
        config: &StructuringConfig,
    ) -> Option<Anomaly> {
        if spokes.len() < config.min_degree {
            return None;
        }
        let amounts: Vec<f64> = spokes.iter().map(|(_, amount)| *amount).collect();
        let stats = AmountStats::of(&amounts)?;
        if stats.mean <= config.min_mean_amount || stats.variation() >= config.max_variation {
            return None;
        }

        let mut counterparties: Vec<String> = spokes.iter().map(|(n, _)| n.to_string()).collect();
        counterparties.sort();
        let mut entities = Vec::with_capacity(counterparties.len() + 1);
        entities.push(hub.to_string());
        entities.extend(counterparties.iter().cloned());

        let edges: Vec<(&str, &str)> = spokes
            .iter()
            .map(|(other, _)| match direction {
                FanDirection::Out => (hub, *other),
                FanDirection::In => (*other, hub),
            })
            .collect();
        let transaction_ids = edge_transaction_ids(graph, edges);

        let description = match direction {
            FanDirection::Out => format!(
                "A single source sent {} near-identical payments (about {:.2} each) to different \
                 counterparties, consistent with splitting a large sum to stay under reporting limits.",
                spokes.len(),
                stats.mean
            ),
            FanDirection::In => format!(
                "A single target received {} near-identical payments (about {:.2} each) from \
                 different counterparties, consistent with consolidating split funds.",
                spokes.len(),
                stats.mean
            ),
        };

        Some(
            Anomaly::new(
                evidence_id(direction.code(), slice, &entities),
                direction.anomaly_type(),
                config.severity,
                entities,
                description,
                DetectionMethod::Deterministic,
            )
            .with_evidence(EVIDENCE_SLICE, slice)
            .with_evidence("pattern", direction.pattern())
            .with_evidence("average_amount", stats.mean)
            .with_evidence("std_dev", stats.std_dev)
            .with_evidence("counterparty_count", spokes.len())
            .with_evidence(EVIDENCE_TRANSACTION_IDS, transaction_ids)
            .with_explanation("metric", "Amount Variance StdDev")
            .with_explanation("value", round_to(stats.std_dev, 2))
            .with_explanation(
                "context",
                format!(
                    "{} across {} counterparties, variation {:.1}%",
                    direction.pattern(),
                    spokes.len(),
                    stats.variation() * 100.0
                ),
            ),
        )
    }
}

impl AnalysisKernel for Structuring {
    fn metadata(&self) -> &KernelMetadata {
        &self.metadata
    }
}

impl SliceDetector for Structuring {
    fn detect(&self, slice: &str, graph: &TransactionGraph) -> Vec<Anomaly> {
        Self::compute(slice, graph, &self.config)
    }
}

#[async_trait]
impl BatchKernel<SliceDetectionInput, SliceDetectionOutput> for Structuring {
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
    fn test_fan_out_detected() {
        let g = graph(&[
            ("H", "T1", 1000.0),
            ("H", "T2", 1010.0),
            ("H", "T3", 990.0),
            ("H", "T4", 1005.0),
            ("H", "T5", 995.0),
        ]);
        let found = Structuring::new().detect("2024-04", &g);
        assert_eq!(found.len(), 1, "only the hub should be flagged");

        let a = &found[0];
        assert_eq!(a.anomaly_type, AnomalyType::StructuringFanOut);
        assert_eq!(a.entities_involved, vec!["H", "T1", "T2", "T3", "T4", "T5"]);
        assert_eq!(a.severity, 0.95);
        assert_eq!(a.evidence_data["pattern"], "Fan-Out");
        assert_eq!(a.evidence_data["counterparty_count"], 5);
        assert_eq!(a.transaction_ids().len(), 5);
        assert!(a.id.starts_with("DETERM-FANOUT-2024-04-"));
    }

    #[test]
    fn test_fan_in_detected() {
        let g = graph(&[
            ("S1", "H", 500.0),
            ("S2", "H", 500.0),
            ("S3", "H", 500.0),
            ("S4", "H", 500.0),
            ("S5", "H", 500.0),
        ]);
        let found = Structuring::new().detect("2024-04", &g);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].anomaly_type, AnomalyType::StructuringFanIn);
        assert_eq!(found[0].entities_involved[0], "H");
        assert_eq!(found[0].explanation_metadata["value"], 0.0);
    }

    #[test]
    fn test_fan_out_suppresses_fan_in() {
        let mut edges = Vec::new();
        for t in ["T1", "T2", "T3", "T4", "T5"] {
            edges.push(("H", t, 1000.0));
        }
        for s in ["S1", "S2", "S3", "S4", "S5"] {
            edges.push((s, "H", 1000.0));
        }
        let found = Structuring::new().detect("2024-04", &graph(&edges));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].anomaly_type, AnomalyType::StructuringFanOut);
    }

    #[test]
    fn test_varied_amounts_ignored() {
        let g = graph(&[
            ("H", "T1", 100.0),
            ("H", "T2", 5000.0),
            ("H", "T3", 900.0),
            ("H", "T4", 2000.0),
            ("H", "T5", 300.0),
        ]);
        assert!(Structuring::new().detect("2024-04", &g).is_empty());
    }

    #[test]
    fn test_four_spokes_ignored() {
        let g = graph(&[
            ("H", "T1", 1000.0),
            ("H", "T2", 1000.0),
            ("H", "T3", 1000.0),
            ("H", "T4", 1000.0),
        ]);
        assert!(Structuring::new().detect("2024-04", &g).is_empty());
    }

    #[test]
    fn test_amount_stats() {
        let stats = AmountStats::of(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(stats.mean, 5.0);
        assert_eq!(stats.std_dev, 2.0);
        assert!(AmountStats::of(&[]).is_none());
    }
}
