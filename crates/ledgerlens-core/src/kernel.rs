//! Kernel metadata.
//!
//! Every detector and pipeline stage carries a `KernelMetadata` describing
//! what it is, which stage of the pipeline it belongs to and which anomaly
//! types it can emit.

use crate::anomaly::{AnomalyType, DetectionMethod};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Pipeline stage a kernel belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Rule-based per-slice detection.
    Deterministic,
    /// Learned per-slice detection.
    Learned,
    /// Cross-slice persistence and confidence.
    Temporal,
    /// Context annotation.
    Overlay,
    /// End-to-end orchestration.
    Engine,
}

impl Stage {
    /// Returns the stage name as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Stage::Deterministic => "deterministic",
            Stage::Learned => "learned",
            Stage::Temporal => "temporal",
            Stage::Overlay => "overlay",
            Stage::Engine => "engine",
        }
    }

    /// Detection method of findings produced in this stage, if it detects.
    #[must_use]
    pub const fn detection_method(&self) -> Option<DetectionMethod> {
        match self {
            Stage::Deterministic => Some(DetectionMethod::Deterministic),
            Stage::Learned => Some(DetectionMethod::Learned),
            _ => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kernel metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KernelMetadata {
    /// Unique kernel identifier (e.g., "detect/circular-trading").
    pub id: String,

    /// Pipeline stage.
    pub stage: Stage,

    /// Human-readable description.
    pub description: String,

    /// Anomaly types this kernel can emit.
    pub emits: Vec<AnomalyType>,

    /// Version of the kernel implementation.
    pub version: u32,
}

impl KernelMetadata {
    /// Create metadata for a kernel in the given stage.
    #[must_use]
    pub fn new(id: impl Into<String>, stage: Stage) -> Self {
        Self {
            id: id.into(),
            stage,
            description: String::new(),
            emits: Vec::new(),
            version: 1,
        }
    }

    /// Metadata for a rule-based detector.
    #[must_use]
    pub fn deterministic(id: impl Into<String>) -> Self {
        Self::new(id, Stage::Deterministic)
    }

    /// Metadata for a learned detector.
    #[must_use]
    pub fn learned(id: impl Into<String>) -> Self {
        Self::new(id, Stage::Learned)
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add an emitted anomaly type.
    #[must_use]
    pub fn with_emits(mut self, anomaly_type: AnomalyType) -> Self {
        if !self.emits.contains(&anomaly_type) {
            self.emits.push(anomaly_type);
        }
        self
    }

    /// Set the version.
    #[must_use]
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Short name: the last path segment of the id.
    #[must_use]
    pub fn short_name(&self) -> &str {
        self.id.rsplit('/').next().unwrap_or(&self.id)
    }
}

impl Default for KernelMetadata {
    fn default() -> Self {
        Self::new("unnamed", Stage::Engine)
    }
}

/// Whole microseconds in `d`, saturating at `u64::MAX`.
#[must_use]
pub fn duration_micros(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
#[must_use]
pub fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
