//! Circular trading detection.
//!
//! Funds that leave an entity and return to it through a short chain of
//! near-equal transfers. Cycles come from a bounded DFS; each cycle is then
//! checked for flux consistency.

use crate::detector::{SliceDetector, edge_transaction_ids};
use crate::messages::{SliceDetectionInput, SliceDetectionOutput};
use async_trait::async_trait;
use ledgerlens_core::anomaly::{
    Anomaly, AnomalyType, DetectionMethod, EVIDENCE_SLICE, EVIDENCE_TRANSACTION_IDS,
};
use ledgerlens_core::config::CycleConfig;
use ledgerlens_core::error::Result;
use ledgerlens_core::hashing::evidence_id;
use ledgerlens_core::kernel::{KernelMetadata, duration_micros};
use ledgerlens_core::traits::{AnalysisKernel, BatchKernel};
use ledgerlens_graph::cycles::CycleSearch;
use ledgerlens_graph::types::TransactionGraph;
use std::time::Instant;
use tracing::debug;

/// Anomaly id code.
pub const CODE: &str = "CIRC";

/// Per-hop amounts of a cycle that passed the flux check.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleFlow {
    /// Edge weights along the cycle, closing edge last.
    pub amounts: Vec<f64>,
    /// Mean edge weight.
    pub average: f64,
    /// Largest relative deviation from the mean.
    pub max_deviation: f64,
}

/// Circular trading detector.
#[derive(Debug, Clone)]
pub struct CircularTrading {
    metadata: KernelMetadata,
    config: CycleConfig,
}

impl Default for CircularTrading {
    fn default() -> Self {
        Self::new()
    }
}

impl CircularTrading {
    /// Create a detector with default thresholds.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(CycleConfig::default())
    }

    /// Create a detector with the given thresholds.
    #[must_use]
    pub fn with_config(config: CycleConfig) -> Self {
        Self {
            metadata: KernelMetadata::deterministic("detect/circular-trading")
                .with_description("Short cycles of near-equal transfers")
                .with_emits(AnomalyType::CircularTrading),
            config,
        }
    }

    /// Detector thresholds.
    #[must_use]
    pub fn config(&self) -> &CycleConfig {
        &self.config
    }

    /// Check the hops of a cycle. Returns `None` if an edge is missing, the
    /// mean is below the floor, or any hop deviates too far from the mean.
    #[must_use]
    pub fn evaluate(
        graph: &TransactionGraph,
        cycle: &[String],
        config: &CycleConfig,
    ) -> Option<CycleFlow> {
        if cycle.is_empty() {
            return None;
        }

        let mut amounts = Vec::with_capacity(cycle.len());
        for (i, source) in cycle.iter().enumerate() {
            let target = &cycle[(i + 1) % cycle.len()];
            amounts.push(graph.edge(source, target)?.weight());
        }

        let average = amounts.iter().sum::<f64>() / amounts.len() as f64;
        if average < config.min_average_amount || average <= 0.0 {
            return None;
        }

        let max_deviation = amounts
            .iter()
            .map(|a| (a - average).abs() / average)
            .fold(0.0, f64::max);
        if max_deviation > config.max_deviation {
            return None;
        }

        Some(CycleFlow {
            amounts,
            average,
            max_deviation,
        })
    }

    /// Detect circular trading in one slice.
    #[must_use]
    pub fn compute(slice: &str, graph: &TransactionGraph, config: &CycleConfig) -> Vec<Anomaly> {
        if graph.edge_count() == 0 {
            return Vec::new();
        }

        let found = CycleSearch::from_config(config).enumerate(graph);
        debug!(
            slice,
            cycles = found.cycles.len(),
            searched = found.candidates_searched,
            truncated = found.truncated,
            "Cycle search complete"
        );

        found
            .cycles
            .iter()
            .filter_map(|cycle| {
                let flow = Self::evaluate(graph, cycle, config)?;
                Some(Self::anomaly(slice, graph, cycle, &flow, config.severity))
            })
            .collect()
    }

    fn anomaly(
        slice: &str,
        graph: &TransactionGraph,
        cycle: &[String],
        flow: &CycleFlow,
        severity: f64,
    ) -> Anomaly {
        let hops = cycle
            .iter()
            .enumerate()
            .map(|(i, s)| (s.as_str(), cycle[(i + 1) % cycle.len()].as_str()));
        let transaction_ids = edge_transaction_ids(graph, hops);

        Anomaly::new(
            evidence_id(CODE, slice, cycle),
            AnomalyType::CircularTrading,
            severity,
            cycle.to_vec(),
            format!(
                "Funds move in a circle through {} entities with near-equal transfers \
                 (about {:.2} per hop), a classic pattern for faking volume or layering funds.",
                cycle.len(),
                flow.average
            ),
            DetectionMethod::Deterministic,
        )
        .with_evidence(EVIDENCE_SLICE, slice)
        .with_evidence("cycle_path", cycle.to_vec())
        .with_evidence("cycle_length", cycle.len())
        .with_evidence("average_amount", flow.average)
        .with_evidence("edge_amounts", flow.amounts.clone())
        .with_evidence("max_deviation", flow.max_deviation)
        .with_evidence(EVIDENCE_TRANSACTION_IDS, transaction_ids)
        .with_explanation("metric", "Cycle Length")
        .with_explanation("value", cycle.len())
        .with_explanation(
            "context",
            format!("Round trip of {} hops with under 20% variation", cycle.len()),
        )
    }
}

impl AnalysisKernel for CircularTrading {
    fn metadata(&self) -> &KernelMetadata {
        &self.metadata
    }
}

impl SliceDetector for CircularTrading {
    fn detect(&self, slice: &str, graph: &TransactionGraph) -> Vec<Anomaly> {
        Self::compute(slice, graph, &self.config)
    }
}

#[async_trait]
impl BatchKernel<SliceDetectionInput, SliceDetectionOutput> for CircularTrading {
    async fn execute(&self, input: SliceDetectionInput) -> Result<SliceDetectionOutput> {
        let start = Instant::now();
        let anomalies = self.detect(&input.slice, &input.graph);
        Ok(SliceDetectionOutput {
            anomalies,
            compute_time_us: duration_micros(start.elapsed()),
        })
    }
}
