//! Transfer Engine
//!
//! The only write path into the ledger. Every balance-affecting event
//! (subscription, tip, purchase, withdrawal, reward grant, deposit)
//! flows through [`Ledger::execute`], which validates the request,
//! serializes it against overlapping transfers, and commits the
//! journal entry plus all balance deltas as one atomic batch.
//!
//! # Example
//!
//! ```no_run
//! use artifex_ledger::{Config, Ledger};
//!
//! #[tokio::main]
//! async fn main() -> artifex_ledger::Result<()> {
//!     let config = Config::default();
//!     let ledger = Ledger::open(config).await?;
//!
//!     // let outcome = ledger.execute(request).await?;
//!
//!     Ok(())
//! }
//! ```

use crate::{
    accounts::AccountStore,
    guard::{backoff_delay, AccountLocks},
    journal::Journal,
    metrics::Metrics,
    types::{
        Account, AccountId, EntryStatus, FailureReason, JournalEntry, TransferKind,
        TransferOutcome, TransferRequest,
    },
    Config, Error, Result, Storage,
};
use chrono::Utc;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// Main ledger interface
pub struct Ledger {
    /// Shared storage
    storage: Arc<Storage>,

    /// Account store (balance cache)
    accounts: AccountStore,

    /// Journal read side
    journal: Journal,

    /// Per-account concurrency guard
    locks: AccountLocks,

    /// Metrics collector
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl Ledger {
    /// Open ledger with configuration
    ///
    /// Ensures the protocol fee account exists before accepting
    /// transfers.
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let storage = Arc::new(Storage::open(&config)?);
        let accounts = AccountStore::new(storage.clone());
        let journal = Journal::new(storage.clone());
        let metrics = Metrics::new()?;

        accounts.create_account(AccountId::new(config.fee_account.clone()))?;

        Ok(Self {
            storage,
            accounts,
            journal,
            locks: AccountLocks::new(),
            metrics,
            config,
        })
    }

    /// The reserved protocol-fee account
    pub fn fee_account_id(&self) -> AccountId {
        AccountId::new(self.config.fee_account.clone())
    }

    /// Account store (reads and administrative deltas)
    pub fn accounts(&self) -> &AccountStore {
        &self.accounts
    }

    /// Journal read side (audit queries, derived balances)
    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Create an account with zero balances (idempotent)
    pub fn create_account(&self, id: AccountId) -> Result<Account> {
        self.accounts.create_account(id)
    }

    /// Get account by id
    pub fn get_account(&self, id: &AccountId) -> Result<Account> {
        self.accounts.get_account(id)
    }

    /// Execute a transfer.
    ///
    /// Returns `Ok` with a terminal outcome: either a Committed entry
    /// with all balance deltas applied, or a Failed entry recording the
    /// rejection with no balance effect. Duplicate idempotency keys
    /// replay the stored outcome without re-applying anything.
    ///
    /// `Err` is reserved for infrastructure faults and the transient
    /// `VersionConflict`; both leave no partial state and are safe to
    /// retry with the same idempotency key.
    pub async fn execute(&self, request: TransferRequest) -> Result<TransferOutcome> {
        // Idempotent short-circuit before taking any lock
        if let Some(entry) = self.journal.find(&request.idempotency_key)? {
            return Ok(self.replay(entry));
        }

        let fee_account = self.fee_account_id();
        let mut involved: Vec<&AccountId> = Vec::with_capacity(3);
        involved.extend(request.payer.iter());
        involved.extend(request.payee.iter());
        if !request.kind.is_rate_free() {
            involved.push(&fee_account);
        }

        let _guards = self.locks.lock_all(&involved).await;

        // A concurrent submission with the same key may have won the
        // race for the locks; check again now that we hold them.
        if let Some(entry) = self.journal.find(&request.idempotency_key)? {
            return Ok(self.replay(entry));
        }

        let started = Instant::now();

        match self.validate_and_stage(&request, &fee_account)? {
            Staged::Ready { entry, accounts } => {
                self.storage.commit_entry(&entry, &accounts)?;
                self.metrics.record_commit(started.elapsed().as_secs_f64());

                tracing::info!(
                    entry_id = %entry.id,
                    kind = %entry.kind,
                    gross = %entry.gross_amount,
                    fee = %entry.fee_amount,
                    reward = %entry.reward_amount,
                    "transfer committed"
                );

                let balances = entry.post_balances.clone();
                Ok(TransferOutcome { entry, balances })
            }
            Staged::Rejected(reason) => {
                tracing::warn!(
                    key = %request.idempotency_key,
                    kind = %request.kind,
                    reason = %reason,
                    "transfer rejected"
                );

                let entry = self.failed_entry(&request, reason);
                self.storage.commit_entry(&entry, &[])?;
                self.metrics.record_failure();

                Ok(TransferOutcome {
                    entry,
                    balances: vec![],
                })
            }
        }
    }

    /// Execute with retries on transient `VersionConflict`, reusing the
    /// same idempotency key (safe by construction)
    pub async fn execute_with_retry(&self, request: TransferRequest) -> Result<TransferOutcome> {
        let retry = self.config.retry.clone();
        let mut attempt = 0u32;

        loop {
            match self.execute(request.clone()).await {
                Err(e) if e.is_retryable() && attempt + 1 < retry.max_attempts => {
                    attempt += 1;
                    let delay = backoff_delay(&retry, attempt - 1);
                    tracing::debug!(
                        key = %request.idempotency_key,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "retrying after version conflict"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    fn replay(&self, entry: JournalEntry) -> TransferOutcome {
        self.metrics.record_replay();

        tracing::debug!(entry_id = %entry.id, "idempotent replay");

        let balances = entry.post_balances.clone();
        TransferOutcome { entry, balances }
    }

    /// Validate the request and stage the updated account rows.
    ///
    /// Validation failures come back as `Staged::Rejected` so the
    /// caller can record a Failed entry; only infrastructure faults
    /// surface as `Err`.
    fn validate_and_stage(
        &self,
        request: &TransferRequest,
        fee_account: &AccountId,
    ) -> Result<Staged> {
        let scale = self.config.currency_scale;

        if request.amount <= Decimal::ZERO {
            return Ok(Staged::Rejected(FailureReason::InvalidAmount(
                "amount must be positive".to_string(),
            )));
        }
        if request
            .amount
            .round_dp_with_strategy(scale, RoundingStrategy::ToZero)
            != request.amount
        {
            return Ok(Staged::Rejected(FailureReason::InvalidAmount(format!(
                "amount has more than {} decimal places",
                scale
            ))));
        }
        for (name, rate) in [("fee_rate", request.fee_rate), ("reward_rate", request.reward_rate)] {
            if rate < Decimal::ZERO || rate > Decimal::ONE {
                return Ok(Staged::Rejected(FailureReason::InvalidRate(format!(
                    "{} must be within [0, 1]",
                    name
                ))));
            }
            if request.kind.is_rate_free() && rate != Decimal::ZERO {
                return Ok(Staged::Rejected(FailureReason::InvalidRate(format!(
                    "{} does not apply to {}",
                    name, request.kind
                ))));
            }
        }

        // Parties must match the kind exactly. An extraneous party
        // would be recorded on the entry without receiving a delta,
        // and journal replay would then diverge from the stored rows.
        if request.kind.requires_payer() && request.payer.is_none() {
            return Ok(Staged::Rejected(FailureReason::InvalidParty(format!(
                "{} requires a payer",
                request.kind
            ))));
        }
        if !request.kind.requires_payer() && request.payer.is_some() {
            return Ok(Staged::Rejected(FailureReason::InvalidParty(format!(
                "{} does not take a payer",
                request.kind
            ))));
        }
        if request.kind.requires_payee() && request.payee.is_none() {
            return Ok(Staged::Rejected(FailureReason::InvalidParty(format!(
                "{} requires a payee",
                request.kind
            ))));
        }
        if !request.kind.requires_payee() && request.payee.is_some() {
            return Ok(Staged::Rejected(FailureReason::InvalidParty(format!(
                "{} does not take a payee",
                request.kind
            ))));
        }

        // Fee truncates toward zero at the currency's minimum unit, so
        // the protocol can never overcharge; rewards are whole tokens.
        let fee = if request.kind.is_rate_free() {
            Decimal::ZERO
        } else {
            (request.amount * request.fee_rate)
                .round_dp_with_strategy(scale, RoundingStrategy::ToZero)
        };
        let net = request.amount - fee;
        let reward = match request.kind {
            TransferKind::RewardGrant => request.amount,
            _ => (request.amount * request.reward_rate).floor(),
        };

        // Load every referenced account, rejecting unknown ones
        let mut loaded: BTreeMap<AccountId, Account> = BTreeMap::new();
        for id in request.payer.iter().chain(request.payee.iter()) {
            match self.accounts.get_account_opt(id)? {
                Some(account) => {
                    loaded.insert(id.clone(), account);
                }
                None => {
                    return Ok(Staged::Rejected(FailureReason::AccountNotFound(id.clone())));
                }
            }
        }
        if fee > Decimal::ZERO {
            // Created at open; missing means the store is corrupt
            let account = self.accounts.get_account(fee_account)?;
            loaded.entry(fee_account.clone()).or_insert(account);
        }

        if let Some(payer_id) = &request.payer {
            let payer = &loaded[payer_id];
            if payer.spendable < request.amount {
                return Ok(Staged::Rejected(FailureReason::InsufficientFunds {
                    requested: request.amount,
                    available: payer.spendable,
                }));
            }
        }

        // Accumulate deltas per account (roles may coincide), then
        // apply exactly once so each version advances by one
        let mut deltas: BTreeMap<AccountId, (Decimal, Decimal)> = BTreeMap::new();
        let mut add = |id: &AccountId, spendable: Decimal, reward: Decimal| {
            let slot = deltas.entry(id.clone()).or_insert((Decimal::ZERO, Decimal::ZERO));
            slot.0 += spendable;
            slot.1 += reward;
        };

        match (request.kind, &request.payer, &request.payee) {
            (
                TransferKind::Subscription | TransferKind::Tip | TransferKind::Purchase,
                Some(payer),
                Some(payee),
            ) => {
                add(payer, -request.amount, reward);
                add(payee, net, Decimal::ZERO);
                if fee > Decimal::ZERO {
                    add(fee_account, fee, Decimal::ZERO);
                }
            }
            (TransferKind::Withdrawal, Some(payer), _) => {
                // Net leaves the system; only the fee stays
                add(payer, -request.amount, reward);
                if fee > Decimal::ZERO {
                    add(fee_account, fee, Decimal::ZERO);
                }
            }
            (TransferKind::Deposit, _, Some(payee)) => {
                add(payee, request.amount, Decimal::ZERO);
            }
            (TransferKind::RewardGrant, _, Some(payee)) => {
                add(payee, Decimal::ZERO, reward);
            }
            // Unreachable given the requires_payer/requires_payee
            // checks above
            _ => {
                return Err(Error::InvariantViolation(format!(
                    "{} request missing required parties",
                    request.kind
                )));
            }
        }

        let mut updated = Vec::with_capacity(deltas.len());
        for (id, (spendable_delta, reward_delta)) in deltas {
            let account = &loaded[&id];
            match account.checked_apply(spendable_delta, reward_delta) {
                Ok(next) => updated.push(next),
                Err(Error::InsufficientFunds {
                    requested,
                    available,
                    ..
                }) => {
                    // Combined deltas can still underflow when roles
                    // coincide (e.g. payer is also the fee account)
                    return Ok(Staged::Rejected(FailureReason::InsufficientFunds {
                        requested,
                        available,
                    }));
                }
                Err(e) => return Err(e),
            }
        }

        let entry = JournalEntry {
            id: request.idempotency_key.clone(),
            kind: request.kind,
            payer: request.payer.clone(),
            payee: request.payee.clone(),
            fee_account: (fee > Decimal::ZERO).then(|| fee_account.clone()),
            gross_amount: request.amount,
            fee_amount: fee,
            net_amount: net,
            reward_amount: reward,
            memo: request.memo.clone(),
            created_at: Utc::now(),
            status: EntryStatus::Committed,
            failure_reason: None,
            post_balances: updated.iter().map(Account::balance).collect(),
            entry_hash: [0u8; 32],
        }
        .seal();

        Ok(Staged::Ready {
            entry,
            accounts: updated,
        })
    }

    fn failed_entry(&self, request: &TransferRequest, reason: FailureReason) -> JournalEntry {
        JournalEntry {
            id: request.idempotency_key.clone(),
            kind: request.kind,
            payer: request.payer.clone(),
            payee: request.payee.clone(),
            fee_account: None,
            gross_amount: request.amount,
            fee_amount: Decimal::ZERO,
            net_amount: request.amount,
            reward_amount: Decimal::ZERO,
            memo: request.memo.clone(),
            created_at: Utc::now(),
            status: EntryStatus::Failed,
            failure_reason: Some(reason),
            post_balances: vec![],
            entry_hash: [0u8; 32],
        }
        .seal()
    }

    /// Audit pass: verify every given account row against the journal
    pub fn verify_accounts(&self, ids: &[AccountId]) -> Result<()> {
        for id in ids {
            let stored = self.accounts.get_account(id)?;
            self.journal.verify_account(&stored)?;
        }
        Ok(())
    }
}

/// Outcome of validation: either staged rows ready to commit, or a
/// rejection destined for a Failed entry
enum Staged {
    Ready {
        entry: JournalEntry,
        accounts: Vec<Account>,
    },
    Rejected(FailureReason),
}
