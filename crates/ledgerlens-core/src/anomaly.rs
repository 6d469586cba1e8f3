//! Anomaly records produced by detectors and refined by later stages.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Evidence key holding the slice label an anomaly was raised in.
pub const EVIDENCE_SLICE: &str = "slice";
/// Evidence key holding the ids of the underlying transactions.
pub const EVIDENCE_TRANSACTION_IDS: &str = "transaction_ids";
/// Description marker appended on recurring findings.
pub const FIRST_OBSERVED_MARKER: &str = "[First observed:";

/// Kind of finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyType {
    /// Funds returning to their origin through a short cycle.
    CircularTrading,
    /// Weakly connected component with unusually high edge density.
    DenseCluster,
    /// High reciprocal volume with negligible net transfer.
    WashTrading,
    /// One payer splitting funds into many near-identical transfers.
    StructuringFanOut,
    /// Many near-identical transfers converging on one payee.
    StructuringFanIn,
    /// Edge the learned model deems topologically implausible.
    StructuralAnomaly,
    /// Learned finding seen in a single slice.
    Watchlist,
    /// Learned finding seen in exactly two slices.
    LearnedEvolving,
}

impl AnomalyType {
    /// Human-readable label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            AnomalyType::CircularTrading => "Circular Trading",
            AnomalyType::DenseCluster => "Dense Cluster",
            AnomalyType::WashTrading => "Wash Trading",
            AnomalyType::StructuringFanOut => "Structuring (Fan-Out)",
            AnomalyType::StructuringFanIn => "Structuring (Fan-In)",
            AnomalyType::StructuralAnomaly => "Structural Anomaly",
            AnomalyType::Watchlist => "Watchlist (Possible Anomaly)",
            AnomalyType::LearnedEvolving => "Learned Anomaly (Evolving)",
        }
    }
}

impl fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Trust level of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Confidence {
    /// Seen once.
    Low,
    /// Seen twice or corroborated once.
    Medium,
    /// Corroborated.
    High,
}

impl Confidence {
    /// One level up, saturating at `High`.
    #[must_use]
    pub const fn raise_one(self) -> Self {
        match self {
            Confidence::Low => Confidence::Medium,
            Confidence::Medium | Confidence::High => Confidence::High,
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::Low => write!(f, "Low"),
            Confidence::Medium => write!(f, "Medium"),
            Confidence::High => write!(f, "High"),
        }
    }
}

/// How a finding was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetectionMethod {
    /// Rule-based graph pattern.
    Deterministic,
    /// Learned structural model.
    Learned,
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionMethod::Deterministic => write!(f, "DETERMINISTIC"),
            DetectionMethod::Learned => write!(f, "LEARNED"),
        }
    }
}

/// A suspicious pattern found in one slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    /// Stable identifier derived from evidence.
    pub id: String,
    /// Kind of finding.
    #[serde(rename = "type")]
    pub anomaly_type: AnomalyType,
    /// Severity in [0, 1].
    pub severity: f64,
    /// Entities involved. Order matters for cycles.
    pub entities_involved: Vec<String>,
    /// Analyst-facing description.
    pub description: String,
    /// Slice-local evidence.
    pub evidence_data: BTreeMap<String, Value>,
    /// Trust level.
    pub confidence: Confidence,
    /// Producing method.
    pub detection_method: DetectionMethod,
    /// Explanation fields for the UI.
    pub explanation_metadata: BTreeMap<String, Value>,
}

impl Anomaly {
    /// Create an anomaly with empty evidence. Severity is clamped to [0, 1].
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        anomaly_type: AnomalyType,
        severity: f64,
        entities_involved: Vec<String>,
        description: impl Into<String>,
        detection_method: DetectionMethod,
    ) -> Self {
        debug_assert!(!entities_involved.is_empty());
        let severity = if severity.is_finite() {
            severity.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            id: id.into(),
            anomaly_type,
            severity,
            entities_involved,
            description: description.into(),
            evidence_data: BTreeMap::new(),
            confidence: Confidence::Low,
            detection_method,
            explanation_metadata: BTreeMap::new(),
        }
    }

    /// Set the confidence.
    #[must_use]
    pub fn with_confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = confidence;
        self
    }

    /// Add an evidence entry.
    #[must_use]
    pub fn with_evidence(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.evidence_data.insert(key.into(), value.into());
        self
    }

    /// Add an explanation entry.
    #[must_use]
    pub fn with_explanation(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.explanation_metadata.insert(key.into(), value.into());
        self
    }

    /// Slice the anomaly was raised in.
    #[must_use]
    pub fn slice(&self) -> Option<&str> {
        self.evidence_data.get(EVIDENCE_SLICE).and_then(Value::as_str)
    }

    /// Ids of the underlying transactions.
    #[must_use]
    pub fn transaction_ids(&self) -> Vec<&str> {
        self.evidence_data
            .get(EVIDENCE_TRANSACTION_IDS)
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Cross-slice identity of this finding.
    #[must_use]
    pub fn signature(&self) -> AnomalySignature {
        AnomalySignature {
            anomaly_type: self.anomaly_type,
            entities: self.entities_involved.iter().cloned().collect(),
        }
    }
}

/// Identity key for recurring findings: type plus the set of entities.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AnomalySignature {
    /// Kind of finding.
    pub anomaly_type: AnomalyType,
    /// Entities, order-insensitive.
    pub entities: BTreeSet<String>,
}
