//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `accounts` - current balances, key: account id (cache of the journal)
//! - `journal`  - append-only journal entries, key: idempotency key
//! - `indices`  - per-account audit index, key: len(account) || account
//!                || created_at_nanos || entry key
//!
//! The transfer commit path writes the journal entry, every touched
//! account row, and the audit indices in one `WriteBatch`, which is the
//! atomicity boundary the engine relies on.

use crate::{
    error::{Error, Result},
    types::{Account, AccountId, IdempotencyKey, JournalEntry},
    Config,
};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use std::sync::Arc;

const CF_ACCOUNTS: &str = "accounts";
const CF_JOURNAL: &str = "journal";
const CF_INDICES: &str = "indices";

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_ACCOUNTS, Self::cf_options_accounts()),
            ColumnFamilyDescriptor::new(CF_JOURNAL, Self::cf_options_journal()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = %path.display(), "opened ledger storage");

        Ok(Self { db: Arc::new(db) })
    }

    fn cf_options_accounts() -> Options {
        let mut opts = Options::default();
        // Hot read path, favor speed over ratio
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_journal() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("column family {} not found", name)))
    }

    // Account operations

    /// Get account, if it exists
    pub fn get_account(&self, id: &AccountId) -> Result<Option<Account>> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;

        match self.db.get_cf(cf, id.as_str().as_bytes())? {
            Some(value) => {
                let account: Account = bincode::deserialize(&value)?;
                Ok(Some(account))
            }
            None => Ok(None),
        }
    }

    /// Put account row (single, unbatched)
    pub fn put_account(&self, account: &Account) -> Result<()> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;
        let value = bincode::serialize(account)?;
        self.db.put_cf(cf, account.id.as_str().as_bytes(), &value)?;
        Ok(())
    }

    /// Conditional account write honoring the optimistic-lock contract:
    /// fails with `VersionConflict` unless the stored version is exactly
    /// one behind the updated row
    pub fn put_account_versioned(&self, account: &Account) -> Result<()> {
        self.check_version(account)?;
        self.put_account(account)
    }

    fn check_version(&self, updated: &Account) -> Result<()> {
        let stored_version = self.get_account(&updated.id)?.map(|a| a.version);
        let expected = updated.version.saturating_sub(1);

        match stored_version {
            Some(found) if found == expected && updated.version == found + 1 => Ok(()),
            Some(found) => Err(Error::VersionConflict {
                account: updated.id.clone(),
                expected,
                found,
            }),
            None if updated.version == 0 => Ok(()),
            None => Err(Error::AccountNotFound(updated.id.clone())),
        }
    }

    // Journal operations

    /// Get journal entry by idempotency key, verifying the entry hash
    pub fn get_entry(&self, key: &IdempotencyKey) -> Result<Option<JournalEntry>> {
        let cf = self.cf_handle(CF_JOURNAL)?;

        match self.db.get_cf(cf, key.as_bytes())? {
            Some(value) => {
                let entry: JournalEntry = bincode::deserialize(&value)?;
                if !entry.verify_hash() {
                    return Err(Error::InvariantViolation(format!(
                        "journal entry {} failed hash verification",
                        key
                    )));
                }
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    /// Commit a terminal journal entry together with every updated
    /// account row and the audit indices, atomically.
    ///
    /// Every account in `accounts` must carry a version exactly one
    /// ahead of its stored row; the idempotency key must be unused.
    /// Either the whole batch lands or none of it does.
    pub fn commit_entry(&self, entry: &JournalEntry, accounts: &[Account]) -> Result<()> {
        if !entry.is_terminal() {
            return Err(Error::InvariantViolation(
                "only terminal entries may be persisted".to_string(),
            ));
        }

        // Uniqueness of the idempotency key; the engine checks this
        // under the account locks, so a hit here is a logic error.
        if self.get_entry(&entry.id)?.is_some() {
            return Err(Error::InvariantViolation(format!(
                "journal entry {} already exists",
                entry.id
            )));
        }

        for account in accounts {
            self.check_version(account)?;
        }

        let mut batch = WriteBatch::default();

        let cf_journal = self.cf_handle(CF_JOURNAL)?;
        let entry_value = bincode::serialize(entry)?;
        batch.put_cf(cf_journal, entry.id.as_bytes(), &entry_value);

        let cf_accounts = self.cf_handle(CF_ACCOUNTS)?;
        for account in accounts {
            let value = bincode::serialize(account)?;
            batch.put_cf(cf_accounts, account.id.as_str().as_bytes(), &value);
        }

        let cf_indices = self.cf_handle(CF_INDICES)?;
        for account_id in Self::involved_accounts(entry) {
            let idx_key = Self::index_key(account_id, entry);
            batch.put_cf(cf_indices, &idx_key, &[]);
        }

        self.db.write(batch)?;

        tracing::debug!(
            entry_id = %entry.id,
            kind = %entry.kind,
            status = ?entry.status,
            accounts = accounts.len(),
            "journal entry committed"
        );

        Ok(())
    }

    /// All journal entries touching `account`, payer or payee or fee
    /// roles, ascending by creation time
    pub fn entries_for_account(&self, account: &AccountId) -> Result<Vec<JournalEntry>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let prefix = Self::index_prefix(account);
        let iter = self.db.iterator_cf(
            cf_indices,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );

        let mut entries = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }

            // Layout: prefix || nanos(8) || entry key
            let rest = &key[prefix.len()..];
            if rest.len() <= 8 {
                continue;
            }
            let entry_key = IdempotencyKey::new(String::from_utf8_lossy(&rest[8..]).into_owned());

            if let Some(entry) = self.get_entry(&entry_key)? {
                entries.push(entry);
            }
        }

        Ok(entries)
    }

    fn involved_accounts(entry: &JournalEntry) -> Vec<&AccountId> {
        let mut ids: Vec<&AccountId> = entry
            .payer
            .iter()
            .chain(entry.payee.iter())
            .chain(entry.fee_account.iter())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    fn index_prefix(account: &AccountId) -> Vec<u8> {
        let id = account.as_str().as_bytes();
        let mut prefix = Vec::with_capacity(2 + id.len());
        // Length-prefixed so one account's index range can never
        // shadow another's
        prefix.extend_from_slice(&(id.len() as u16).to_be_bytes());
        prefix.extend_from_slice(id);
        prefix
    }

    fn index_key(account: &AccountId, entry: &JournalEntry) -> Vec<u8> {
        let mut key = Self::index_prefix(account);
        let nanos = entry.created_at.timestamp_nanos_opt().unwrap_or(0);
        key.extend_from_slice(&nanos.to_be_bytes());
        key.extend_from_slice(entry.id.as_bytes());
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntryStatus, TransferKind};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    fn test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (Storage::open(&config).unwrap(), temp_dir)
    }

    fn test_entry(id: &str, payer: &str, payee: &str) -> JournalEntry {
        JournalEntry {
            id: IdempotencyKey::new(id),
            kind: TransferKind::Tip,
            payer: Some(AccountId::new(payer)),
            payee: Some(AccountId::new(payee)),
            fee_account: Some(AccountId::new("treasury")),
            gross_amount: Decimal::new(1000, 2),
            fee_amount: Decimal::new(10, 2),
            net_amount: Decimal::new(990, 2),
            reward_amount: Decimal::ZERO,
            memo: None,
            created_at: Utc::now(),
            status: EntryStatus::Committed,
            failure_reason: None,
            post_balances: vec![],
            entry_hash: [0u8; 32],
        }
        .seal()
    }

    #[test]
    fn test_account_roundtrip() {
        let (storage, _temp) = test_storage();

        let account = Account::new(AccountId::new("fan"));
        storage.put_account(&account).unwrap();

        let retrieved = storage.get_account(&AccountId::new("fan")).unwrap().unwrap();
        assert_eq!(retrieved, account);
        assert!(storage.get_account(&AccountId::new("ghost")).unwrap().is_none());
    }

    #[test]
    fn test_versioned_put_detects_conflict() {
        let (storage, _temp) = test_storage();

        let account = Account::new(AccountId::new("fan"));
        storage.put_account(&account).unwrap();

        // Correct successor version is accepted
        let updated = account
            .checked_apply(Decimal::new(1000, 2), Decimal::ZERO)
            .unwrap();
        storage.put_account_versioned(&updated).unwrap();

        // Re-applying the same successor now conflicts
        let stale = account
            .checked_apply(Decimal::new(500, 2), Decimal::ZERO)
            .unwrap();
        let err = storage.put_account_versioned(&stale).unwrap_err();
        assert!(matches!(err, Error::VersionConflict { .. }));
    }

    #[test]
    fn test_commit_entry_is_atomic_batch() {
        let (storage, _temp) = test_storage();

        let payer = Account::new(AccountId::new("fan"));
        let payee = Account::new(AccountId::new("creator"));
        let treasury = Account::new(AccountId::new("treasury"));
        storage.put_account(&payer).unwrap();
        storage.put_account(&payee).unwrap();
        storage.put_account(&treasury).unwrap();

        let entry = test_entry("tip-1", "fan", "creator");
        let updated = vec![
            payer
                .checked_apply(Decimal::ZERO, Decimal::ZERO)
                .unwrap(),
            payee
                .checked_apply(Decimal::new(990, 2), Decimal::ZERO)
                .unwrap(),
            treasury
                .checked_apply(Decimal::new(10, 2), Decimal::ZERO)
                .unwrap(),
        ];

        storage.commit_entry(&entry, &updated).unwrap();

        let stored = storage
            .get_entry(&IdempotencyKey::new("tip-1"))
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, EntryStatus::Committed);

        let creator = storage
            .get_account(&AccountId::new("creator"))
            .unwrap()
            .unwrap();
        assert_eq!(creator.spendable, Decimal::new(990, 2));
        assert_eq!(creator.version, 1);
    }

    #[test]
    fn test_commit_rejects_duplicate_key() {
        let (storage, _temp) = test_storage();

        let entry = test_entry("tip-1", "fan", "creator");
        storage.commit_entry(&entry, &[]).unwrap();

        let err = storage.commit_entry(&entry, &[]).unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));
    }

    #[test]
    fn test_entries_for_account_scoped_and_ordered() {
        let (storage, _temp) = test_storage();

        storage
            .commit_entry(&test_entry("t1", "fan", "creator"), &[])
            .unwrap();
        storage
            .commit_entry(&test_entry("t2", "fan", "creator"), &[])
            .unwrap();
        storage
            .commit_entry(&test_entry("t3", "other", "elsewhere"), &[])
            .unwrap();

        let fan_entries = storage.entries_for_account(&AccountId::new("fan")).unwrap();
        assert_eq!(fan_entries.len(), 2);
        assert!(fan_entries.windows(2).all(|w| w[0].created_at <= w[1].created_at));

        // "fan" must not leak into a different account's range even
        // though "fa" is a prefix of it
        let fa_entries = storage.entries_for_account(&AccountId::new("fa")).unwrap();
        assert!(fa_entries.is_empty());

        // Treasury sees every fee-carrying entry
        let treasury = storage
            .entries_for_account(&AccountId::new("treasury"))
            .unwrap();
        assert_eq!(treasury.len(), 3);
    }
}
