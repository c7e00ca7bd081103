//! Reconciliation reports

use crate::error::Result;
use artifex_ledger::AccountId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How bad a discrepancy is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// Internal and external views agree exactly
    None,

    /// Discrepancy within the configured tolerance
    Minor,

    /// Discrepancy beyond tolerance, needs investigation
    Critical,
}

impl Severity {
    /// Classify a discrepancy against a tolerance threshold. At or
    /// above the threshold in magnitude is Critical.
    pub fn classify(discrepancy: Decimal, threshold: Decimal) -> Self {
        if discrepancy == Decimal::ZERO {
            Severity::None
        } else if discrepancy.abs() < threshold {
            Severity::Minor
        } else {
            Severity::Critical
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::None => write!(f, "none"),
            Severity::Minor => write!(f, "minor"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// One account's reconciliation result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// Account under comparison
    pub account_id: AccountId,

    /// Spendable balance derived from the journal
    pub internal_balance: Decimal,

    /// Spendable balance the oracle observed
    pub external_balance: Decimal,

    /// internal minus external
    pub discrepancy: Decimal,

    /// Classified severity
    pub severity: Severity,

    /// When the comparison ran
    pub checked_at: DateTime<Utc>,

    /// Oracle source name
    pub source: String,
}

impl ReconciliationReport {
    /// Does this report need human attention?
    pub fn needs_attention(&self) -> bool {
        self.severity == Severity::Critical
    }

    /// Serialize for export to the ops dashboard
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_classification() {
        let threshold = Decimal::new(5, 2); // 0.05

        assert_eq!(
            Severity::classify(Decimal::ZERO, threshold),
            Severity::None
        );
        assert_eq!(
            Severity::classify(Decimal::new(1, 2), threshold),
            Severity::Minor
        );
        assert_eq!(
            Severity::classify(Decimal::new(-1, 2), threshold),
            Severity::Minor
        );
        // The threshold itself is already critical
        assert_eq!(
            Severity::classify(Decimal::new(5, 2), threshold),
            Severity::Critical
        );
        assert_eq!(
            Severity::classify(Decimal::new(-10, 2), threshold),
            Severity::Critical
        );
    }

    #[test]
    fn test_report_roundtrips_through_json() {
        let report = ReconciliationReport {
            account_id: AccountId::new("creator"),
            internal_balance: Decimal::new(1980, 2),
            external_balance: Decimal::new(2000, 2),
            discrepancy: Decimal::new(-20, 2),
            severity: Severity::Critical,
            checked_at: Utc::now(),
            source: "test".to_string(),
        };

        let json = report.to_json().unwrap();
        let parsed: ReconciliationReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
        assert!(parsed.needs_attention());
    }
}
