//! Jurisdiction-specific context overlay.
//!
//! The overlay annotates findings using tax attributes of their underlying
//! transactions. It never adds, removes or retypes findings, and only ever
//! raises confidence, by one level, when at least one rule matched.

use ledgerlens_core::anomaly::Anomaly;
use ledgerlens_core::context::{FLAG_GST, FLAG_VAT, RuleContext};
use ledgerlens_core::kernel::{KernelMetadata, Stage};
use ledgerlens_core::traits::AnalysisKernel;
use ledgerlens_core::transaction::Transaction;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Debug;
use tracing::debug;

/// Explanation key listing matched rule tags.
pub const CONTEXT_TAGS_KEY: &str = "context_tags";
/// Explanation key listing human-readable labels of matched rules.
pub const TAX_CONTEXT_KEY: &str = "tax_context";
/// Explanation key holding the active context id.
pub const RULE_CONTEXT_KEY: &str = "rule_context";

/// Rate above which a supply counts as standard-rated.
pub const STANDARD_RATE_FLOOR: f64 = 15.0;

/// A single annotation rule.
pub trait OverlayRule: Send + Sync + Debug {
    /// Context flag that enables the rule.
    fn flag(&self) -> &'static str;

    /// Tag recorded under `context_tags`.
    fn tag(&self) -> &'static str;

    /// Label recorded under `tax_context`.
    fn label(&self) -> &'static str;

    /// Text appended to the description.
    fn note(&self) -> &'static str;

    /// Returns true if the underlying transactions exhibit the pattern.
    fn matches(&self, transactions: &[&Transaction]) -> bool;
}

/// Input tax credit claimed somewhere along the structure.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputCreditFlowRule;

impl OverlayRule for InputCreditFlowRule {
    fn flag(&self) -> &'static str {
        FLAG_GST
    }

    fn tag(&self) -> &'static str {
        "ITC_FLOW_DETECTED"
    }

    fn label(&self) -> &'static str {
        "GST Input Credit Chain"
    }

    fn note(&self) -> &'static str {
        "[Context: Input tax credit is claimed along this structure.]"
    }

    fn matches(&self, transactions: &[&Transaction]) -> bool {
        transactions.iter().any(|tx| tx.input_tax_credit() > 0.0)
    }
}

/// Zero-rated and standard-rated flows mixed within one structure.
#[derive(Debug, Clone, Copy, Default)]
pub struct AsymmetricRateRule;

impl OverlayRule for AsymmetricRateRule {
    fn flag(&self) -> &'static str {
        FLAG_VAT
    }

    fn tag(&self) -> &'static str {
        "VAT_ASYMMETRY"
    }

    fn label(&self) -> &'static str {
        "VAT Asymmetry (Carousel)"
    }

    fn note(&self) -> &'static str {
        "[Context: Structure mixes zero-rated and standard-rated flows, typical of VAT carousels.]"
    }

    fn matches(&self, transactions: &[&Transaction]) -> bool {
        let rates = || transactions.iter().filter_map(|tx| tx.tax.tax_rate);
        let zero_rated = rates().any(|r| r == 0.0);
        let standard_rated = rates().any(|r| r > STANDARD_RATE_FLOOR);
        zero_rated && standard_rated
    }
}

/// Context overlay stage.
#[derive(Debug)]
pub struct ContextOverlay {
    metadata: KernelMetadata,
    rules: Vec<Box<dyn OverlayRule>>,
}

impl Default for ContextOverlay {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextOverlay {
    /// Overlay with the built-in rules.
    #[must_use]
    pub fn new() -> Self {
        Self::with_rules(vec![
            Box::new(InputCreditFlowRule),
            Box::new(AsymmetricRateRule),
        ])
    }

    /// Overlay with a custom rule set.
    #[must_use]
    pub fn with_rules(rules: Vec<Box<dyn OverlayRule>>) -> Self {
        Self {
            metadata: KernelMetadata::new("overlay/tax-context", Stage::Overlay)
                .with_description("Tax context annotation of existing findings"),
            rules,
        }
    }

    /// Rules in evaluation order.
    #[must_use]
    pub fn rules(&self) -> &[Box<dyn OverlayRule>] {
        &self.rules
    }

    /// Annotate findings under `context`.
    #[must_use]
    pub fn apply(
        &self,
        anomalies: Vec<Anomaly>,
        transactions: &[Transaction],
        context: &RuleContext,
    ) -> Vec<Anomaly> {
        let enabled: Vec<&dyn OverlayRule> = self
            .rules
            .iter()
            .map(|rule| rule.as_ref())
            .filter(|rule| context.flag(rule.flag()))
            .collect();
        if enabled.is_empty() {
            return anomalies;
        }

        let by_id: HashMap<&str, &Transaction> =
            transactions.iter().map(|tx| (tx.id.as_str(), tx)).collect();

        let mut annotated = 0usize;
        let out = anomalies
            .into_iter()
            .map(|anomaly| {
                let underlying: Vec<&Transaction> = anomaly
                    .transaction_ids()
                    .into_iter()
                    .filter_map(|id| by_id.get(id).copied())
                    .collect();
                let matched: Vec<&dyn OverlayRule> = enabled
                    .iter()
                    .copied()
                    .filter(|rule| rule.matches(&underlying))
                    .collect();
                if matched.is_empty() {
                    return anomaly;
                }
                annotated += 1;
                Self::annotate(anomaly, &matched, context)
            })
            .collect();

        debug!(context = %context.id, annotated, "Context overlay applied");
        out
    }

    fn annotate(
        mut anomaly: Anomaly,
        matched: &[&dyn OverlayRule],
        context: &RuleContext,
    ) -> Anomaly {
        for rule in matched {
            anomaly.description.push(' ');
            anomaly.description.push_str(rule.note());
        }

        let tags: Vec<Value> = matched.iter().map(|r| Value::from(r.tag())).collect();
        let labels: Vec<Value> = matched.iter().map(|r| Value::from(r.label())).collect();
        anomaly
            .explanation_metadata
            .insert(CONTEXT_TAGS_KEY.to_string(), Value::Array(tags));
        anomaly
            .explanation_metadata
            .insert(TAX_CONTEXT_KEY.to_string(), Value::Array(labels));
        anomaly
            .explanation_metadata
            .insert(RULE_CONTEXT_KEY.to_string(), Value::from(context.id.clone()));

        anomaly.confidence = anomaly.confidence.raise_one();
        anomaly
    }
}

impl AnalysisKernel for ContextOverlay {
    fn metadata(&self) -> &KernelMetadata {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use ledgerlens_core::anomaly::{
        AnomalyType, Confidence, DetectionMethod, EVIDENCE_TRANSACTION_IDS,
    };
    use ledgerlens_core::transaction::TaxDetails;

    fn tx(id: &str, rate: Option<f64>, itc: Option<f64>) -> Transaction {
        let ts = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        Transaction::new(id, "A", "B", 1000.0, ts).with_tax(TaxDetails {
            tax_rate: rate,
            input_tax_credit: itc,
            ..TaxDetails::default()
        })
    }

    fn finding(ids: &[&str], confidence: Confidence) -> Anomaly {
        Anomaly::new(
            "DETERM-CIRC-2024-06-0",
            AnomalyType::CircularTrading,
            0.9,
            vec!["A".into(), "B".into(), "C".into()],
            "Cycle",
            DetectionMethod::Deterministic,
        )
        .with_confidence(confidence)
        .with_evidence(EVIDENCE_TRANSACTION_IDS, ids.to_vec())
    }

    #[test]
    fn test_global_context_is_noop() {
        let txs = vec![tx("t1", Some(0.0), Some(50.0)), tx("t2", Some(20.0), None)];
        let input = vec![finding(&["t1", "t2"], Confidence::Low)];
        let before = serde_json::to_string(&input).unwrap();

        let out = ContextOverlay::new().apply(input, &txs, &RuleContext::global());
        assert_eq!(serde_json::to_string(&out).unwrap(), before);
    }

    #[test]
    fn test_gst_rule_raises_confidence() {
        let txs = vec![tx("t1", None, Some(120.0))];
        let out = ContextOverlay::new().apply(
            vec![finding(&["t1"], Confidence::Low)],
            &txs,
            &RuleContext::india_gst(),
        );
        let a = &out[0];
        assert_eq!(a.confidence, Confidence::Medium);
        assert_eq!(
            a.explanation_metadata[CONTEXT_TAGS_KEY],
            serde_json::json!(["ITC_FLOW_DETECTED"])
        );
        assert_eq!(
            a.explanation_metadata[TAX_CONTEXT_KEY],
            serde_json::json!(["GST Input Credit Chain"])
        );
        assert_eq!(a.explanation_metadata[RULE_CONTEXT_KEY], "india_gst");
        assert!(a.description.starts_with("Cycle [Context:"));
    }

    #[test]
    fn test_vat_rule_needs_both_rates() {
        let overlay = ContextOverlay::new();
        let vat = RuleContext::eu_vat();

        let mixed = vec![tx("t1", Some(0.0), None), tx("t2", Some(21.0), None)];
        let out = overlay.apply(vec![finding(&["t1", "t2"], Confidence::Medium)], &mixed, &vat);
        assert_eq!(out[0].confidence, Confidence::High);
        assert_eq!(
            out[0].explanation_metadata[CONTEXT_TAGS_KEY],
            serde_json::json!(["VAT_ASYMMETRY"])
        );

        let uniform = vec![tx("t1", Some(21.0), None), tx("t2", Some(21.0), None)];
        let out = overlay.apply(vec![finding(&["t1", "t2"], Confidence::Medium)], &uniform, &vat);
        assert_eq!(out[0].confidence, Confidence::Medium);
        assert!(out[0].explanation_metadata.is_empty());
    }

    #[test]
    fn test_gst_rule_ignored_under_vat_context() {
        let txs = vec![tx("t1", None, Some(120.0))];
        let out = ContextOverlay::new().apply(
            vec![finding(&["t1"], Confidence::Low)],
            &txs,
            &RuleContext::eu_vat(),
        );
        assert_eq!(out[0].confidence, Confidence::Low);
    }

    #[test]
    fn test_never_lowers_or_removes() {
        let txs = vec![tx("t1", None, Some(1.0))];
        let input = vec![
            finding(&["t1"], Confidence::High),
            finding(&["missing"], Confidence::Low),
        ];
        let out = ContextOverlay::new().apply(input, &txs, &RuleContext::india_gst());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].confidence, Confidence::High);
        assert_eq!(out[0].anomaly_type, AnomalyType::CircularTrading);
        assert_eq!(out[1].confidence, Confidence::Low);
    }

    #[test]
    fn test_both_rules_single_raise() {
        let ctx = RuleContext::new("combo", "Combined")
            .with_flag(FLAG_GST, true)
            .with_flag(FLAG_VAT, true);
        let txs = vec![tx("t1", Some(0.0), Some(10.0)), tx("t2", Some(18.0), None)];
        let out = ContextOverlay::new().apply(
            vec![finding(&["t1", "t2"], Confidence::Low)],
            &txs,
            &ctx,
        );
        assert_eq!(out[0].confidence, Confidence::Medium, "raise by exactly one level");
        assert_eq!(
            out[0].explanation_metadata[CONTEXT_TAGS_KEY],
            serde_json::json!(["ITC_FLOW_DETECTED", "VAT_ASYMMETRY"])
        );
    }
}
