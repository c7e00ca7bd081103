//! External balance oracles
//!
//! An oracle reports what an outside system (chain indexer, custodial
//! API) believes an account's spendable balance to be. Oracle answers
//! are UNTRUSTED input: the reconciler only ever compares them against
//! the journal and reports, it never writes them into the ledger.

use crate::error::Result;
use artifex_ledger::AccountId;
use async_trait::async_trait;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Source of external balance observations
#[async_trait]
pub trait ChainOracle: Send + Sync {
    /// External view of the account's spendable balance
    async fn spendable_balance(&self, account: &AccountId) -> Result<Decimal>;

    /// Human-readable source name for reports
    fn name(&self) -> &str;
}

/// In-memory oracle backed by a mutable table. Used in tests and as
/// the stand-in before a real chain indexer is wired up.
pub struct StaticOracle {
    balances: RwLock<HashMap<AccountId, Decimal>>,
    name: String,
}

impl StaticOracle {
    /// Create an empty oracle with a source name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            balances: RwLock::new(HashMap::new()),
            name: name.into(),
        }
    }

    /// Set the observed balance for an account
    pub fn set_balance(&self, account: AccountId, balance: Decimal) {
        self.balances.write().insert(account, balance);
    }
}

#[async_trait]
impl ChainOracle for StaticOracle {
    async fn spendable_balance(&self, account: &AccountId) -> Result<Decimal> {
        // Unknown accounts observe as zero, same as an empty chain
        // address
        Ok(self
            .balances
            .read()
            .get(account)
            .copied()
            .unwrap_or(Decimal::ZERO))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_oracle_defaults_to_zero() {
        let oracle = StaticOracle::new("test");
        let balance = oracle
            .spendable_balance(&AccountId::new("ghost"))
            .await
            .unwrap();
        assert_eq!(balance, Decimal::ZERO);

        oracle.set_balance(AccountId::new("fan"), Decimal::new(1000, 2));
        let balance = oracle
            .spendable_balance(&AccountId::new("fan"))
            .await
            .unwrap();
        assert_eq!(balance, Decimal::new(1000, 2));
    }
}
