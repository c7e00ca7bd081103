//! Ledger Journal
//!
//! Read side of the append-only journal. Writes happen exclusively
//! through the engine's atomic commit; this module answers idempotency
//! lookups, audit queries, and replays Committed entries into derived
//! balances (the journal is the source of truth, the account rows are
//! a cache).

use crate::{
    error::{Error, Result},
    storage::Storage,
    types::{Account, AccountId, EntryStatus, IdempotencyKey, JournalEntry, TransferKind},
};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Journal over the shared storage layer
#[derive(Clone)]
pub struct Journal {
    storage: Arc<Storage>,
}

impl Journal {
    /// Create a journal view over shared storage
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Look up an entry by idempotency key
    pub fn find(&self, key: &IdempotencyKey) -> Result<Option<JournalEntry>> {
        self.storage.get_entry(key)
    }

    /// Look up an entry, failing when absent
    pub fn get(&self, key: &IdempotencyKey) -> Result<JournalEntry> {
        self.find(key)?
            .ok_or_else(|| Error::EntryNotFound(key.to_string()))
    }

    /// All entries touching `account` in any role (payer, payee, fee),
    /// ascending by creation time. Includes Failed entries; audit
    /// queries want the rejections too.
    pub fn entries_for_account(&self, account: &AccountId) -> Result<Vec<JournalEntry>> {
        self.storage.entries_for_account(account)
    }

    /// Replay Committed entries into the account's derived balances:
    /// (spendable, reward)
    pub fn derived_balances(&self, account: &AccountId) -> Result<(Decimal, Decimal)> {
        let entries = self.entries_for_account(account)?;

        let mut spendable = Decimal::ZERO;
        let mut reward = Decimal::ZERO;
        for entry in &entries {
            spendable += entry.spendable_effect(account);
            reward += entry.reward_effect(account);
        }

        Ok((spendable, reward))
    }

    /// Spendable balance derived from the journal alone
    pub fn derived_spendable(&self, account: &AccountId) -> Result<Decimal> {
        Ok(self.derived_balances(account)?.0)
    }

    /// Reward balance derived from the journal alone
    pub fn derived_reward(&self, account: &AccountId) -> Result<Decimal> {
        Ok(self.derived_balances(account)?.1)
    }

    /// Does a Committed entry of `kind` exist from `payer` to `payee`?
    ///
    /// This is the derivation the profile/content service uses for
    /// access control ("is this fan subscribed", "did this fan buy the
    /// item"). Only Committed entries count.
    pub fn has_committed(
        &self,
        kind: TransferKind,
        payer: &AccountId,
        payee: &AccountId,
    ) -> Result<bool> {
        let entries = self.entries_for_account(payer)?;
        Ok(entries.iter().any(|e| {
            e.status == EntryStatus::Committed
                && e.kind == kind
                && e.payer.as_ref() == Some(payer)
                && e.payee.as_ref() == Some(payee)
        }))
    }

    /// Verify the ledger-balance equivalence invariant for one account:
    /// the sum of Committed effects must equal the stored row exactly.
    pub fn verify_account(&self, stored: &Account) -> Result<()> {
        let (spendable, reward) = self.derived_balances(&stored.id)?;

        if spendable != stored.spendable || reward != stored.reward {
            return Err(Error::InvariantViolation(format!(
                "account {} diverged from journal: stored ({}, {}) derived ({}, {})",
                stored.id, stored.spendable, stored.reward, spendable, reward
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use chrono::Utc;
    use tempfile::TempDir;

    fn test_journal() -> (Journal, Arc<Storage>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        let storage = Arc::new(Storage::open(&config).unwrap());
        (Journal::new(storage.clone()), storage, temp_dir)
    }

    fn entry(id: &str, kind: TransferKind, status: EntryStatus) -> JournalEntry {
        JournalEntry {
            id: IdempotencyKey::new(id),
            kind,
            payer: Some(AccountId::new("fan")),
            payee: Some(AccountId::new("creator")),
            fee_account: Some(AccountId::new("treasury")),
            gross_amount: Decimal::new(2000, 2),
            fee_amount: Decimal::new(20, 2),
            net_amount: Decimal::new(1980, 2),
            reward_amount: Decimal::ONE,
            memo: None,
            created_at: Utc::now(),
            status,
            failure_reason: None,
            post_balances: vec![],
            entry_hash: [0u8; 32],
        }
        .seal()
    }

    #[test]
    fn test_find_and_get() {
        let (journal, storage, _temp) = test_journal();
        let e = entry("tip-1", TransferKind::Tip, EntryStatus::Committed);
        storage.commit_entry(&e, &[]).unwrap();

        assert!(journal.find(&IdempotencyKey::new("tip-1")).unwrap().is_some());
        assert!(journal.find(&IdempotencyKey::new("missing")).unwrap().is_none());
        assert!(matches!(
            journal.get(&IdempotencyKey::new("missing")).unwrap_err(),
            Error::EntryNotFound(_)
        ));
    }

    #[test]
    fn test_derived_balances_ignore_failed() {
        let (journal, storage, _temp) = test_journal();

        storage
            .commit_entry(&entry("t1", TransferKind::Tip, EntryStatus::Committed), &[])
            .unwrap();
        storage
            .commit_entry(&entry("t2", TransferKind::Tip, EntryStatus::Failed), &[])
            .unwrap();

        let (creator_spendable, _) = journal
            .derived_balances(&AccountId::new("creator"))
            .unwrap();
        assert_eq!(creator_spendable, Decimal::new(1980, 2));

        let (fan_spendable, fan_reward) =
            journal.derived_balances(&AccountId::new("fan")).unwrap();
        assert_eq!(fan_spendable, Decimal::new(-2000, 2));
        assert_eq!(fan_reward, Decimal::ONE);
    }

    #[test]
    fn test_has_committed_only_counts_committed() {
        let (journal, storage, _temp) = test_journal();
        let fan = AccountId::new("fan");
        let creator = AccountId::new("creator");

        storage
            .commit_entry(
                &entry("s1", TransferKind::Subscription, EntryStatus::Failed),
                &[],
            )
            .unwrap();
        assert!(!journal
            .has_committed(TransferKind::Subscription, &fan, &creator)
            .unwrap());

        storage
            .commit_entry(
                &entry("s2", TransferKind::Subscription, EntryStatus::Committed),
                &[],
            )
            .unwrap();
        assert!(journal
            .has_committed(TransferKind::Subscription, &fan, &creator)
            .unwrap());
        assert!(!journal
            .has_committed(TransferKind::Purchase, &fan, &creator)
            .unwrap());
    }

    #[test]
    fn test_verify_account_flags_divergence() {
        let (journal, storage, _temp) = test_journal();

        storage
            .commit_entry(&entry("t1", TransferKind::Tip, EntryStatus::Committed), &[])
            .unwrap();

        let mut creator = Account::new(AccountId::new("creator"));
        creator.spendable = Decimal::new(1980, 2);
        journal.verify_account(&creator).unwrap();

        creator.spendable = Decimal::new(2000, 2);
        assert!(matches!(
            journal.verify_account(&creator).unwrap_err(),
            Error::InvariantViolation(_)
        ));
    }
}
