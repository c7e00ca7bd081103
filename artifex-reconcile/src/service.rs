//! Reconciliation service
//!
//! Compares the journal's derived balances against an external oracle
//! and produces reports. Strictly read-only: a discrepancy is a signal
//! for operators, never an automatic correction. The journal stays the
//! single source of truth.

use crate::{
    error::Result,
    oracle::ChainOracle,
    report::{ReconciliationReport, Severity},
};
use artifex_ledger::{AccountId, Ledger};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Reconciler over a ledger and one oracle
pub struct Reconciler {
    ledger: Arc<Ledger>,
    oracle: Arc<dyn ChainOracle>,

    /// Discrepancies at or above this magnitude classify as Critical
    threshold: Decimal,
}

impl Reconciler {
    /// Create a reconciler with a discrepancy tolerance
    pub fn new(ledger: Arc<Ledger>, oracle: Arc<dyn ChainOracle>, threshold: Decimal) -> Self {
        Self {
            ledger,
            oracle,
            threshold,
        }
    }

    /// Reconcile one account.
    ///
    /// The internal side is derived by replaying the journal, not read
    /// from the account row, so a corrupted balance cache cannot mask
    /// a real discrepancy.
    pub async fn reconcile(&self, account: &AccountId) -> Result<ReconciliationReport> {
        let internal = self.ledger.journal().derived_spendable(account)?;
        let external = self.oracle.spendable_balance(account).await?;

        let discrepancy = internal - external;
        let severity = Severity::classify(discrepancy, self.threshold);

        let report = ReconciliationReport {
            account_id: account.clone(),
            internal_balance: internal,
            external_balance: external,
            discrepancy,
            severity,
            checked_at: Utc::now(),
            source: self.oracle.name().to_string(),
        };

        match severity {
            Severity::None => {
                tracing::debug!(account = %account, "reconciled, balances agree");
            }
            Severity::Minor => {
                tracing::info!(
                    account = %account,
                    discrepancy = %discrepancy,
                    "minor reconciliation discrepancy"
                );
            }
            Severity::Critical => {
                tracing::warn!(
                    account = %account,
                    internal = %internal,
                    external = %external,
                    discrepancy = %discrepancy,
                    source = self.oracle.name(),
                    "critical reconciliation discrepancy"
                );
            }
        }

        Ok(report)
    }

    /// Reconcile a batch of accounts, returning every report
    pub async fn reconcile_all(&self, accounts: &[AccountId]) -> Result<Vec<ReconciliationReport>> {
        let mut reports = Vec::with_capacity(accounts.len());
        for account in accounts {
            reports.push(self.reconcile(account).await?);
        }

        let critical = reports.iter().filter(|r| r.needs_attention()).count();
        tracing::info!(
            checked = reports.len(),
            critical,
            "reconciliation sweep complete"
        );

        Ok(reports)
    }
}
