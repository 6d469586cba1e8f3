//! Learned structural anomaly detection.
//!
//! A graph autoencoder is trained from scratch on each slice and asked how
//! plausible every observed edge is given the topology around it. Edges the
//! model cannot reconstruct are flagged. The model lives only for the
//! duration of one `detect` call.

use crate::detector::LearnedDetector;
use crate::messages::{LearnedDetectionOutput, SliceDetectionInput};
use async_trait::async_trait;
use ledgerlens_core::anomaly::{
    Anomaly, AnomalyType, Confidence, DetectionMethod, EVIDENCE_SLICE, EVIDENCE_TRANSACTION_IDS,
};
use ledgerlens_core::config::LearnedConfig;
use ledgerlens_core::error::{EngineError, Result};
use ledgerlens_core::hashing::{content_hash, digest_u64};
use ledgerlens_core::kernel::{KernelMetadata, duration_micros};
use ledgerlens_core::traits::{AnalysisKernel, BatchKernel};
use ledgerlens_graph::gnn::{
    AutoencoderConfig, EdgeAutoencoder, FEATURE_DIM, GraphTensors, TrainingReport,
};
use ledgerlens_graph::types::TransactionGraph;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// Improbability score of one observed edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeScore {
    /// Source entity.
    pub source: String,
    /// Target entity.
    pub target: String,
    /// `1 - p(edge)`, in [0, 1].
    pub score: f64,
}

/// Everything the learned detector produced for one slice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnedSliceResult {
    /// Slice label.
    pub slice: String,
    /// Edges above the threshold.
    pub anomalies: Vec<Anomaly>,
    /// Scores of every observed edge, sorted by endpoints.
    pub edge_scores: Vec<EdgeScore>,
    /// Training summary.
    pub training: TrainingReport,
}

#[derive(Serialize)]
struct ModelDescriptor<'a> {
    architecture: &'static str,
    feature_dim: usize,
    autoencoder: &'a AutoencoderConfig,
    threshold: f64,
    min_edges: usize,
    seed: u64,
}

/// Learned structural anomaly detector.
#[derive(Debug, Clone)]
pub struct StructuralAnomalyDetector {
    metadata: KernelMetadata,
    config: LearnedConfig,
}

impl Default for StructuralAnomalyDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl StructuralAnomalyDetector {
    /// Create a detector with default hyperparameters.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(LearnedConfig::default())
    }

    /// Create a detector with the given hyperparameters.
    #[must_use]
    pub fn with_config(config: LearnedConfig) -> Self {
        Self {
            metadata: KernelMetadata::learned("detect/structural-anomaly")
                .with_description("Per-slice GCN autoencoder edge plausibility")
                .with_emits(AnomalyType::StructuralAnomaly),
            config,
        }
    }

    /// Detector hyperparameters.
    #[must_use]
    pub fn config(&self) -> &LearnedConfig {
        &self.config
    }

    /// Returns true if the slice is large enough to train on.
    #[must_use]
    pub fn should_run(&self, graph: &TransactionGraph) -> bool {
        self.config.enabled && graph.edge_count() > self.config.min_edges
    }

    /// Training seed for a slice: the configured seed mixed with the label.
    #[must_use]
    pub fn slice_seed(&self, slice: &str) -> u64 {
        self.config.seed ^ digest_u64(slice)
    }

    /// Hash of the architecture and hyperparameters.
    pub fn fingerprint(&self) -> Result<String> {
        let autoencoder = AutoencoderConfig::from(&self.config);
        content_hash(&ModelDescriptor {
            architecture: "gcn2-mlp2",
            feature_dim: FEATURE_DIM,
            autoencoder: &autoencoder,
            threshold: self.config.threshold,
            min_edges: self.config.min_edges,
            seed: self.config.seed,
        })
    }

    /// Train on one slice and score its edges.
    ///
    /// Returns `Ok(None)` when the slice is at or below the activation
    /// threshold. Numerical failure is an error for this slice only.
    pub fn detect(
        &self,
        slice: &str,
        graph: &TransactionGraph,
    ) -> Result<Option<LearnedSliceResult>> {
        if !self.should_run(graph) {
            debug!(
                slice,
                edges = graph.edge_count(),
                min_edges = self.config.min_edges,
                "Skipping learned detector"
            );
            return Ok(None);
        }

        let tensors = GraphTensors::from_graph(graph)?;
        let seed = self.slice_seed(slice);
        let mut model = EdgeAutoencoder::new(AutoencoderConfig::from(&self.config), seed);
        let training = model.fit(&tensors, seed)?;
        let scores = model.edge_scores(&tensors)?;

        if scores.len() != tensors.edges.len() {
            return Err(EngineError::internal(format!(
                "score count {} does not match edge count {}",
                scores.len(),
                tensors.edges.len()
            )));
        }

        let mut edge_scores = Vec::with_capacity(scores.len());
        let mut anomalies = Vec::new();
        for (&(s, t), &score) in tensors.edges.iter().zip(&scores) {
            let source = &tensors.nodes[s];
            let target = &tensors.nodes[t];
            if score > self.config.threshold {
                anomalies.push(Self::anomaly(slice, graph, source, target, score));
            }
            edge_scores.push(EdgeScore {
                source: source.clone(),
                target: target.clone(),
                score,
            });
        }

        info!(
            slice,
            edges = edge_scores.len(),
            flagged = anomalies.len(),
            final_loss = training.final_loss,
            "Learned detector complete"
        );

        Ok(Some(LearnedSliceResult {
            slice: slice.to_string(),
            anomalies,
            edge_scores,
            training,
        }))
    }

    fn anomaly(
        slice: &str,
        graph: &TransactionGraph,
        source: &str,
        target: &str,
        score: f64,
    ) -> Anomaly {
        let source_degree = graph.degree(source);
        let target_degree = graph.degree(target);
        let improbability = (score * 10_000.0).round() / 100.0;
        let transaction_ids = graph
            .edge(source, target)
            .map(|e| e.transaction_ids.clone())
            .unwrap_or_default();

        Anomaly::new(
            format!("GNN-{}-{}-{}", slice, source, target),
            AnomalyType::StructuralAnomaly,
            score,
            vec![source.to_string(), target.to_string()],
            format!(
                "The transfer from {} to {} does not fit the surrounding transaction topology \
                 ({:.1}% improbable under the learned model).",
                source, target, improbability
            ),
            DetectionMethod::Learned,
        )
        .with_confidence(Confidence::High)
        .with_evidence(EVIDENCE_SLICE, slice)
        .with_evidence("score", score)
        .with_evidence(EVIDENCE_TRANSACTION_IDS, transaction_ids)
        .with_explanation("metric", "Edge Improbability")
        .with_explanation("value", improbability)
        .with_explanation("improbability_pct", improbability)
        .with_explanation("source_degree", source_degree)
        .with_explanation("target_degree", target_degree)
        .with_explanation(
            "rationale",
            format!(
                "Model assigned {:.2} improbability to this link given the degree and volume \
                 profile of both endpoints (degrees {} and {}).",
                score, source_degree, target_degree
            ),
        )
    }
}

impl AnalysisKernel for StructuralAnomalyDetector {
    fn metadata(&self) -> &KernelMetadata {
        &self.metadata
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.config.threshold) {
            return Err(EngineError::validation("threshold must be in [0, 1]"));
        }
        if self.config.epochs == 0 {
            return Err(EngineError::validation("epochs must be positive"));
        }
        Ok(())
    }
}

impl LearnedDetector for StructuralAnomalyDetector {
    fn detect(
        &self,
        slice: &str,
        graph: &TransactionGraph,
    ) -> Result<Option<LearnedSliceResult>> {
        StructuralAnomalyDetector::detect(self, slice, graph)
    }

    fn fingerprint(&self) -> Result<String> {
        StructuralAnomalyDetector::fingerprint(self)
    }
}

#[async_trait]
impl BatchKernel<SliceDetectionInput, LearnedDetectionOutput> for StructuralAnomalyDetector {
    async fn execute(&self, input: SliceDetectionInput) -> Result<LearnedDetectionOutput> {
        let start = Instant::now();
        let result = self.detect(&input.slice, &input.graph)?;
        Ok(LearnedDetectionOutput {
            result,
            compute_time_us: duration_micros(start.elapsed()),
        })
    }
}
