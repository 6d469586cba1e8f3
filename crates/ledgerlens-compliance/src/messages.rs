//! Batch kernel messages for slice detectors.

use crate::learned::LearnedSliceResult;
use ledgerlens_core::anomaly::Anomaly;
use ledgerlens_graph::types::TransactionGraph;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Input for one slice.
#[derive(Debug, Clone)]
pub struct SliceDetectionInput {
    /// Slice label.
    pub slice: String,
    /// Slice graph.
    pub graph: Arc<TransactionGraph>,
}

impl SliceDetectionInput {
    /// Create a slice input.
    #[must_use]
    pub fn new(slice: impl Into<String>, graph: TransactionGraph) -> Self {
        Self {
            slice: slice.into(),
            graph: Arc::new(graph),
        }
    }
}

/// Output of a deterministic detector for one slice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SliceDetectionOutput {
    /// Raw anomalies.
    pub anomalies: Vec<Anomaly>,
    /// Compute time in microseconds.
    pub compute_time_us: u64,
}

/// Output of the learned detector for one slice.
#[derive(Debug, Clone)]
pub struct LearnedDetectionOutput {
    /// `None` if the slice was below the activation threshold.
    pub result: Option<LearnedSliceResult>,
    /// Compute time in microseconds.
    pub compute_time_us: u64,
}
