//! Temporal persistence and confidence.
//!
//! Runs once over the raw findings of every slice. Findings that share a
//! signature are treated as the same pattern recurring over time; their
//! recurrence count sets the confidence of every occurrence.

use ledgerlens_core::anomaly::{
    Anomaly, AnomalySignature, AnomalyType, Confidence, DetectionMethod, FIRST_OBSERVED_MARKER,
};
use ledgerlens_core::config::PersistenceConfig;
use ledgerlens_core::kernel::{KernelMetadata, Stage};
use ledgerlens_core::traits::AnalysisKernel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Recurrence of one signature across slices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistenceRecord {
    /// Detector-assigned type.
    pub anomaly_type: AnomalyType,
    /// Entities, sorted.
    pub entities: Vec<String>,
    /// Number of raw findings with this signature.
    pub occurrences: usize,
    /// Slice of the first finding.
    pub first_slice: String,
    /// Distinct slices the finding appeared in, in first-seen order.
    pub slices: Vec<String>,
    /// Confidence derived from recurrence.
    pub confidence: Confidence,
}

/// Result of the persistence pass.
#[derive(Debug, Clone, Default)]
pub struct PersistenceOutcome {
    /// Every finding, refined, in input order.
    pub anomalies: Vec<Anomaly>,
    /// One record per signature, ordered by signature.
    pub summary: Vec<PersistenceRecord>,
}

#[derive(Default)]
struct Tally {
    occurrences: usize,
    first_slice: String,
    slices: Vec<String>,
}

/// Cross-slice persistence stage.
#[derive(Debug, Clone)]
pub struct PersistenceEngine {
    metadata: KernelMetadata,
    config: PersistenceConfig,
}

impl Default for PersistenceEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PersistenceEngine {
    /// Create the stage with default recurrence thresholds.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(PersistenceConfig::default())
    }

    /// Create the stage with the given thresholds.
    #[must_use]
    pub fn with_config(config: PersistenceConfig) -> Self {
        Self {
            metadata: KernelMetadata::new("temporal/persistence", Stage::Temporal)
                .with_description("Cross-slice recurrence and confidence evolution")
                .with_emits(AnomalyType::Watchlist)
                .with_emits(AnomalyType::LearnedEvolving),
            config,
        }
    }

    /// Confidence for a recurrence count.
    #[must_use]
    pub fn confidence_for(&self, occurrences: usize) -> Confidence {
        if occurrences >= self.config.high_occurrences {
            Confidence::High
        } else if occurrences >= self.config.medium_occurrences {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }

    /// Refine raw findings. Input order is preserved.
    #[must_use]
    pub fn apply(&self, raw: Vec<Anomaly>) -> PersistenceOutcome {
        let mut tallies: BTreeMap<AnomalySignature, Tally> = BTreeMap::new();
        for anomaly in &raw {
            let slice = anomaly.slice().unwrap_or_default();
            let tally = tallies.entry(anomaly.signature()).or_default();
            if tally.occurrences == 0 {
                tally.first_slice = slice.to_string();
            }
            tally.occurrences += 1;
            if !tally.slices.iter().any(|s| s == slice) {
                tally.slices.push(slice.to_string());
            }
        }

        let anomalies: Vec<Anomaly> = raw
            .into_iter()
            .map(|anomaly| {
                let Some(tally) = tallies.get(&anomaly.signature()) else {
                    return anomaly;
                };
                self.refine(anomaly, tally)
            })
            .collect();

        let summary: Vec<PersistenceRecord> = tallies
            .into_iter()
            .map(|(signature, tally)| PersistenceRecord {
                anomaly_type: signature.anomaly_type,
                entities: signature.entities.into_iter().collect(),
                occurrences: tally.occurrences,
                confidence: self.confidence_for(tally.occurrences),
                first_slice: tally.first_slice,
                slices: tally.slices,
            })
            .collect();

        debug!(
            findings = anomalies.len(),
            signatures = summary.len(),
            recurring = summary.iter().filter(|r| r.occurrences > 1).count(),
            "Persistence pass complete"
        );

        PersistenceOutcome { anomalies, summary }
    }

    fn refine(&self, mut anomaly: Anomaly, tally: &Tally) -> Anomaly {
        anomaly.confidence = self.confidence_for(tally.occurrences);

        if anomaly.detection_method == DetectionMethod::Learned {
            anomaly.anomaly_type = match anomaly.confidence {
                Confidence::Low => AnomalyType::Watchlist,
                Confidence::Medium => AnomalyType::LearnedEvolving,
                Confidence::High => anomaly.anomaly_type,
            };
        }

        if tally.occurrences > 1 && !anomaly.description.contains(FIRST_OBSERVED_MARKER) {
            anomaly.description = format!(
                "{} {} {}]",
                anomaly.description, FIRST_OBSERVED_MARKER, tally.first_slice
            );
        }

        anomaly
    }
}

impl AnalysisKernel for PersistenceEngine {
    fn metadata(&self) -> &KernelMetadata {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerlens_core::anomaly::EVIDENCE_SLICE;

    fn wash(slice: &str) -> Anomaly {
        Anomaly::new(
            format!("DETERM-WASH-{}-0", slice),
            AnomalyType::WashTrading,
            0.85,
            vec!["A".into(), "B".into()],
            "Ping pong",
            DetectionMethod::Deterministic,
        )
        .with_evidence(EVIDENCE_SLICE, slice)
    }

    fn learned(slice: &str, src: &str, tgt: &str) -> Anomaly {
        Anomaly::new(
            format!("GNN-{}-{}-{}", slice, src, tgt),
            AnomalyType::StructuralAnomaly,
            0.9,
            vec![src.into(), tgt.into()],
            "Improbable link",
            DetectionMethod::Learned,
        )
        .with_confidence(Confidence::High)
        .with_evidence(EVIDENCE_SLICE, slice)
    }

    #[test]
    fn test_confidence_by_occurrences() {
        let engine = PersistenceEngine::new();
        let once = engine.apply(vec![wash("2024-01")]);
        assert_eq!(once.anomalies[0].confidence, Confidence::Low);
        assert_eq!(once.anomalies[0].description, "Ping pong");

        let twice = engine.apply(vec![wash("2024-01"), wash("2024-02")]);
        assert!(twice.anomalies.iter().all(|a| a.confidence == Confidence::Medium));

        let thrice = engine.apply(vec![wash("2024-01"), wash("2024-02"), wash("2024-03")]);
        assert!(thrice.anomalies.iter().all(|a| a.confidence == Confidence::High));
        assert_eq!(thrice.summary.len(), 1);
        assert_eq!(thrice.summary[0].occurrences, 3);
        assert_eq!(thrice.summary[0].slices, vec!["2024-01", "2024-02", "2024-03"]);
    }

    #[test]
    fn test_first_observed_note_added_once() {
        let engine = PersistenceEngine::new();
        let out = engine.apply(vec![wash("2024-01"), wash("2024-02")]);
        for a in &out.anomalies {
            assert_eq!(a.description, "Ping pong [First observed: 2024-01]");
        }

        let again = engine.apply(out.anomalies);
        for a in &again.anomalies {
            assert_eq!(
                a.description.matches(FIRST_OBSERVED_MARKER).count(),
                1,
                "note must not be duplicated"
            );
        }
    }

    #[test]
    fn test_signature_ignores_entity_order() {
        let mut reversed = wash("2024-02");
        reversed.entities_involved.reverse();
        let out = PersistenceEngine::new().apply(vec![wash("2024-01"), reversed]);
        assert_eq!(out.summary.len(), 1);
        assert_eq!(out.summary[0].entities, vec!["A", "B"]);
    }

    #[test]
    fn test_learned_retyped_by_recurrence() {
        let engine = PersistenceEngine::new();

        let single = engine.apply(vec![learned("2024-01", "X", "Y")]);
        assert_eq!(single.anomalies[0].anomaly_type, AnomalyType::Watchlist);
        assert_eq!(single.anomalies[0].confidence, Confidence::Low);

        let double = engine.apply(vec![learned("2024-01", "X", "Y"), learned("2024-02", "X", "Y")]);
        assert!(
            double
                .anomalies
                .iter()
                .all(|a| a.anomaly_type == AnomalyType::LearnedEvolving)
        );

        let triple = engine.apply(vec![
            learned("2024-01", "X", "Y"),
            learned("2024-02", "X", "Y"),
            learned("2024-03", "X", "Y"),
        ]);
        assert!(
            triple
                .anomalies
                .iter()
                .all(|a| a.anomaly_type == AnomalyType::StructuralAnomaly
                    && a.confidence == Confidence::High)
        );
    }

    #[test]
    fn test_deterministic_type_never_changes() {
        let out = PersistenceEngine::new().apply(vec![wash("2024-01")]);
        assert_eq!(out.anomalies[0].anomaly_type, AnomalyType::WashTrading);
    }

    #[test]
    fn test_custom_thresholds() {
        let engine = PersistenceEngine::with_config(PersistenceConfig {
            medium_occurrences: 3,
            high_occurrences: 5,
        });
        assert_eq!(engine.confidence_for(2), Confidence::Low);
        assert_eq!(engine.confidence_for(3), Confidence::Medium);
        assert_eq!(engine.confidence_for(5), Confidence::High);
    }

    #[test]
    fn test_empty_input() {
        let out = PersistenceEngine::new().apply(Vec::new());
        assert!(out.anomalies.is_empty());
        assert!(out.summary.is_empty());
    }
}
