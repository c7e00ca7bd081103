//! Account Store
//!
//! Owns the current-balance rows. Balances are a cache of the journal:
//! every mutation happens either through the engine's atomic commit or
//! through [`AccountStore::apply_delta`], both of which honor the
//! optimistic-version contract.

use crate::{
    error::{Error, Result},
    storage::Storage,
    types::{Account, AccountId},
};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Account store over the shared storage layer
#[derive(Clone)]
pub struct AccountStore {
    storage: Arc<Storage>,
}

impl AccountStore {
    /// Create a store over shared storage
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Get account by id
    pub fn get_account(&self, id: &AccountId) -> Result<Account> {
        self.storage
            .get_account(id)?
            .ok_or_else(|| Error::AccountNotFound(id.clone()))
    }

    /// Get account if it exists
    pub fn get_account_opt(&self, id: &AccountId) -> Result<Option<Account>> {
        self.storage.get_account(id)
    }

    /// Create an account with zero balances. Idempotent: re-creating
    /// an existing account returns the stored row unchanged.
    pub fn create_account(&self, id: AccountId) -> Result<Account> {
        if let Some(existing) = self.storage.get_account(&id)? {
            return Ok(existing);
        }

        let account = Account::new(id);
        self.storage.put_account(&account)?;

        tracing::info!(account = %account.id, "account created");

        Ok(account)
    }

    /// Apply balance deltas under the optimistic-lock contract.
    ///
    /// Fails with `VersionConflict` if the stored version does not
    /// match `expected_version` (re-read and retry), and with
    /// `InsufficientFunds` if a delta would drive a balance negative.
    /// Both failures are side-effect-free.
    pub fn apply_delta(
        &self,
        id: &AccountId,
        spendable_delta: Decimal,
        reward_delta: Decimal,
        expected_version: u64,
    ) -> Result<Account> {
        let current = self.get_account(id)?;

        if current.version != expected_version {
            return Err(Error::VersionConflict {
                account: id.clone(),
                expected: expected_version,
                found: current.version,
            });
        }

        let updated = current.checked_apply(spendable_delta, reward_delta)?;
        self.storage.put_account_versioned(&updated)?;

        tracing::debug!(
            account = %id,
            spendable_delta = %spendable_delta,
            reward_delta = %reward_delta,
            version = updated.version,
            "balance delta applied"
        );

        Ok(updated)
    }
}
