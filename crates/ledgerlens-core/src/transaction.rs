//! Ledger transaction records.
//!
//! Transactions arrive already normalized from the ingestion layer and are
//! never mutated after construction.

use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn default_currency() -> String {
    "USD".to_string()
}

/// Optional tax attributes carried by a transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaxDetails {
    /// Tax regime label (e.g. "GST", "VAT").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_type: Option<String>,
    /// Applied rate in percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_rate: Option<f64>,
    /// Tax amount charged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_amount: Option<f64>,
    /// Input tax credit claimed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tax_credit: Option<f64>,
    /// Size band of the reporting entity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_size: Option<String>,
}

impl TaxDetails {
    /// Returns true if no tax attribute is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tax_type.is_none()
            && self.tax_rate.is_none()
            && self.tax_amount.is_none()
            && self.input_tax_credit.is_none()
            && self.entity_size.is_none()
    }
}

/// A single transfer between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction identifier.
    #[serde(alias = "transaction_id")]
    pub id: String,
    /// Paying entity.
    pub source_entity: String,
    /// Receiving entity.
    pub target_entity: String,
    /// Transferred amount (non-negative).
    pub amount: f64,
    /// Currency code.
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Booking time.
    pub timestamp: DateTime<Utc>,
    /// Transaction type (e.g. "wire", "invoice").
    #[serde(default, rename = "transaction_type", alias = "type")]
    pub tx_type: String,
    /// Tax attributes.
    #[serde(flatten)]
    pub tax: TaxDetails,
}

impl Transaction {
    /// Create a transaction with no type or tax attributes.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        source_entity: impl Into<String>,
        target_entity: impl Into<String>,
        amount: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            source_entity: source_entity.into(),
            target_entity: target_entity.into(),
            amount,
            currency: default_currency(),
            timestamp,
            tx_type: String::new(),
            tax: TaxDetails::default(),
        }
    }

    /// Set the transaction type.
    #[must_use]
    pub fn with_type(mut self, tx_type: impl Into<String>) -> Self {
        self.tx_type = tx_type.into();
        self
    }

    /// Set the currency.
    #[must_use]
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    /// Set the tax attributes.
    #[must_use]
    pub fn with_tax(mut self, tax: TaxDetails) -> Self {
        self.tax = tax;
        self
    }

    /// Check the invariants the graph builder relies on.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(EngineError::validation("transaction id is empty"));
        }
        if self.source_entity.is_empty() || self.target_entity.is_empty() {
            return Err(EngineError::validation(format!(
                "transaction {} has an empty endpoint",
                self.id
            )));
        }
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(EngineError::validation(format!(
                "transaction {} has invalid amount {}",
                self.id, self.amount
            )));
        }
        Ok(())
    }

    /// Input tax credit, treating a missing value as zero.
    #[must_use]
    pub fn input_tax_credit(&self) -> f64 {
        self.tax.input_tax_credit.unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_validate_accepts_zero_amount() {
        let tx = Transaction::new("t1", "A", "B", 0.0, ts());
        assert!(tx.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_amounts() {
        for amount in [-1.0, f64::NAN, f64::INFINITY] {
            let tx = Transaction::new("t1", "A", "B", amount, ts());
            assert!(tx.validate().is_err(), "amount {} should be rejected", amount);
        }
    }

    #[test]
    fn test_validate_rejects_empty_endpoint() {
        let tx = Transaction::new("t1", "", "B", 10.0, ts());
        assert!(matches!(tx.validate(), Err(EngineError::ValidationError(_))));
    }

    #[test]
    fn test_deserialize_ingestion_record() {
        let json = r#"{
            "transaction_id": "TX-9",
            "source_entity": "ACME",
            "target_entity": "GLOBEX",
            "amount": 1250.5,
            "timestamp": "2024-02-01T09:30:00Z",
            "transaction_type": "invoice",
            "tax_rate": 18.0,
            "input_tax_credit": 225.09
        }"#;
        let tx: Transaction = serde_json::from_str(json).unwrap();
        assert_eq!(tx.id, "TX-9");
        assert_eq!(tx.currency, "USD");
        assert_eq!(tx.tx_type, "invoice");
        assert_eq!(tx.tax.tax_rate, Some(18.0));
        assert!((tx.input_tax_credit() - 225.09).abs() < 1e-9);
    }
}
