//! Core types for the settlement ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact arithmetic (Decimal for money)
//! - Immutability of terminal journal entries

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Account identifier (user id, wallet address, or a reserved
/// protocol account such as the fee treasury)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Create new account ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller-supplied idempotency key, one per logical submission
/// (e.g. one per user click). Doubles as the journal entry id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Create from a caller-supplied string
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Generate a fresh key (UUIDv7 for time-ordering)
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key bytes used for journal storage
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Account with current balances (cache of the journal)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Account identifier
    pub id: AccountId,

    /// Spendable currency balance (USDC), never negative
    pub spendable: Decimal,

    /// Loyalty token balance (ARTX), never negative
    pub reward: Decimal,

    /// Optimistic concurrency token, strictly increasing
    pub version: u64,
}

impl Account {
    /// Create a fresh account with zero balances
    pub fn new(id: AccountId) -> Self {
        Self {
            id,
            spendable: Decimal::ZERO,
            reward: Decimal::ZERO,
            version: 0,
        }
    }

    /// Apply balance deltas, returning the updated account with a
    /// bumped version. Fails with `InsufficientFunds` if either
    /// balance would go negative; the receiver is untouched either way.
    pub fn checked_apply(
        &self,
        spendable_delta: Decimal,
        reward_delta: Decimal,
    ) -> crate::Result<Account> {
        let spendable = self.spendable + spendable_delta;
        let reward = self.reward + reward_delta;

        if spendable < Decimal::ZERO || reward < Decimal::ZERO {
            return Err(crate::Error::InsufficientFunds {
                account: self.id.clone(),
                requested: if spendable < Decimal::ZERO {
                    -spendable_delta
                } else {
                    -reward_delta
                },
                available: if spendable < Decimal::ZERO {
                    self.spendable
                } else {
                    self.reward
                },
            });
        }

        Ok(Account {
            id: self.id.clone(),
            spendable,
            reward,
            version: self.version + 1,
        })
    }

    /// Balance snapshot for journal entries and transfer outcomes
    pub fn balance(&self) -> AccountBalance {
        AccountBalance {
            account_id: self.id.clone(),
            spendable: self.spendable,
            reward: self.reward,
        }
    }
}

/// Point-in-time balance snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountBalance {
    /// Account identifier
    pub account_id: AccountId,
    /// Spendable balance at snapshot time
    pub spendable: Decimal,
    /// Reward balance at snapshot time
    pub reward: Decimal,
}

/// Kind of balance-affecting transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TransferKind {
    /// Fan pays a creator's subscription price
    Subscription = 1,
    /// Fan tips a creator
    Tip = 2,
    /// Fan buys a pay-per-view item
    Purchase = 3,
    /// Funds leave the system (no payee)
    Withdrawal = 4,
    /// Loyalty tokens minted to an account (no payer)
    RewardGrant = 5,
    /// Funds enter the system (no payer)
    Deposit = 6,
}

impl TransferKind {
    /// Does this kind debit a payer's spendable balance?
    pub fn requires_payer(&self) -> bool {
        !matches!(self, TransferKind::RewardGrant | TransferKind::Deposit)
    }

    /// Does this kind credit a payee?
    pub fn requires_payee(&self) -> bool {
        !matches!(self, TransferKind::Withdrawal)
    }

    /// Kinds that move no spendable currency and therefore must carry
    /// zero fee and reward rates
    pub fn is_rate_free(&self) -> bool {
        matches!(self, TransferKind::RewardGrant | TransferKind::Deposit)
    }
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransferKind::Subscription => "subscription",
            TransferKind::Tip => "tip",
            TransferKind::Purchase => "purchase",
            TransferKind::Withdrawal => "withdrawal",
            TransferKind::RewardGrant => "reward_grant",
            TransferKind::Deposit => "deposit",
        };
        write!(f, "{}", s)
    }
}

/// Journal entry lifecycle state
///
/// `Pending` exists only in memory while a transfer executes; every
/// persisted entry is terminal (`Committed` or `Failed`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EntryStatus {
    /// In-flight, not yet persisted
    Pending = 1,
    /// Balance effects applied, entry durable (terminal)
    Committed = 2,
    /// Rejected during validation, no balance effect (terminal)
    Failed = 3,
}

/// Why a transfer was rejected (recorded on Failed entries so the
/// audit trail alone answers "why did this fail")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FailureReason {
    /// Payer balance below the requested amount
    InsufficientFunds {
        /// Amount the transfer needed
        requested: Decimal,
        /// Balance actually available
        available: Decimal,
    },
    /// Referenced account does not exist
    AccountNotFound(AccountId),
    /// Non-positive or malformed amount
    InvalidAmount(String),
    /// Fee or reward rate outside [0, 1], or a rate on a rate-free kind
    InvalidRate(String),
    /// Payer or payee missing where required, or present where the
    /// kind forbids it
    InvalidParty(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::InsufficientFunds {
                requested,
                available,
            } => write!(
                f,
                "insufficient funds: requested {}, available {}",
                requested, available
            ),
            FailureReason::AccountNotFound(id) => write!(f, "account not found: {}", id),
            FailureReason::InvalidAmount(msg) => write!(f, "invalid amount: {}", msg),
            FailureReason::InvalidRate(msg) => write!(f, "invalid rate: {}", msg),
            FailureReason::InvalidParty(msg) => write!(f, "invalid party: {}", msg),
        }
    }
}

/// Append-only journal entry, the source of truth for all balances
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Entry id == caller-supplied idempotency key (globally unique)
    pub id: IdempotencyKey,

    /// Transfer kind
    pub kind: TransferKind,

    /// Debited account (None for RewardGrant/Deposit)
    pub payer: Option<AccountId>,

    /// Credited account (None for Withdrawal)
    pub payee: Option<AccountId>,

    /// Protocol fee account (present when fee_amount > 0)
    pub fee_account: Option<AccountId>,

    /// Amount debited from the payer
    pub gross_amount: Decimal,

    /// Protocol fee, truncated to the currency's minimum unit
    pub fee_amount: Decimal,

    /// Amount credited to the payee (gross - fee)
    pub net_amount: Decimal,

    /// Loyalty tokens credited (to the payer, or to the payee for
    /// RewardGrant)
    pub reward_amount: Decimal,

    /// Optional caller-supplied note (e.g. tip message)
    pub memo: Option<String>,

    /// Entry creation time
    pub created_at: DateTime<Utc>,

    /// Terminal status once persisted
    pub status: EntryStatus,

    /// Set iff status == Failed
    pub failure_reason: Option<FailureReason>,

    /// Balances of every touched account immediately after commit,
    /// replayed verbatim on duplicate submissions
    pub post_balances: Vec<AccountBalance>,

    /// SHA-256 over canonical entry bytes, for tamper evidence
    pub entry_hash: [u8; 32],
}

impl JournalEntry {
    /// Compute the entry hash over canonical bytes (hash field zeroed)
    pub fn compute_hash(&self) -> [u8; 32] {
        use sha2::{Digest, Sha256};

        let mut canonical = self.clone();
        canonical.entry_hash = [0u8; 32];
        let bytes = bincode::serialize(&canonical).expect("serialization cannot fail");

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        hasher.finalize().into()
    }

    /// Seal the entry by filling in its hash
    pub fn seal(mut self) -> Self {
        self.entry_hash = self.compute_hash();
        self
    }

    /// Verify the stored hash matches the entry contents
    pub fn verify_hash(&self) -> bool {
        self.entry_hash == self.compute_hash()
    }

    /// Terminal entries may never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, EntryStatus::Committed | EntryStatus::Failed)
    }

    /// Signed spendable-balance effect of this entry on `account`.
    /// Zero unless the entry is Committed.
    pub fn spendable_effect(&self, account: &AccountId) -> Decimal {
        if self.status != EntryStatus::Committed {
            return Decimal::ZERO;
        }

        let mut effect = Decimal::ZERO;
        if self.payer.as_ref() == Some(account) {
            effect -= self.gross_amount;
        }
        if self.payee.as_ref() == Some(account) {
            effect += self.net_amount;
        }
        if self.fee_account.as_ref() == Some(account) {
            effect += self.fee_amount;
        }
        effect
    }

    /// Signed reward-balance effect of this entry on `account`
    pub fn reward_effect(&self, account: &AccountId) -> Decimal {
        if self.status != EntryStatus::Committed {
            return Decimal::ZERO;
        }

        let recipient = match self.kind {
            TransferKind::RewardGrant => self.payee.as_ref(),
            _ => self.payer.as_ref(),
        };

        if recipient == Some(account) {
            self.reward_amount
        } else {
            Decimal::ZERO
        }
    }
}

/// Caller input for a transfer; validated and converted into a
/// `JournalEntry`, never persisted as-is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Idempotency key; retries must reuse the same key
    pub idempotency_key: IdempotencyKey,
    /// Transfer kind
    pub kind: TransferKind,
    /// Debited account (required for Subscription/Tip/Purchase/Withdrawal)
    pub payer: Option<AccountId>,
    /// Credited account (required for everything except Withdrawal)
    pub payee: Option<AccountId>,
    /// Gross amount, must be positive
    pub amount: Decimal,
    /// Protocol fee rate in [0, 1]
    pub fee_rate: Decimal,
    /// Loyalty reward rate in [0, 1]
    pub reward_rate: Decimal,
    /// Optional note
    pub memo: Option<String>,
}

impl TransferRequest {
    /// Fan tips a creator
    pub fn tip(
        key: IdempotencyKey,
        payer: AccountId,
        payee: AccountId,
        amount: Decimal,
        fee_rate: Decimal,
        reward_rate: Decimal,
    ) -> Self {
        Self {
            idempotency_key: key,
            kind: TransferKind::Tip,
            payer: Some(payer),
            payee: Some(payee),
            amount,
            fee_rate,
            reward_rate,
            memo: None,
        }
    }

    /// Fan pays a subscription period
    pub fn subscription(
        key: IdempotencyKey,
        payer: AccountId,
        payee: AccountId,
        amount: Decimal,
        fee_rate: Decimal,
        reward_rate: Decimal,
    ) -> Self {
        Self {
            idempotency_key: key,
            kind: TransferKind::Subscription,
            payer: Some(payer),
            payee: Some(payee),
            amount,
            fee_rate,
            reward_rate,
            memo: None,
        }
    }

    /// Fan buys a pay-per-view item
    pub fn purchase(
        key: IdempotencyKey,
        payer: AccountId,
        payee: AccountId,
        amount: Decimal,
        fee_rate: Decimal,
    ) -> Self {
        Self {
            idempotency_key: key,
            kind: TransferKind::Purchase,
            payer: Some(payer),
            payee: Some(payee),
            amount,
            fee_rate,
            reward_rate: Decimal::ZERO,
            memo: None,
        }
    }

    /// Creator withdraws funds out of the system
    pub fn withdrawal(
        key: IdempotencyKey,
        payer: AccountId,
        amount: Decimal,
        fee_rate: Decimal,
    ) -> Self {
        Self {
            idempotency_key: key,
            kind: TransferKind::Withdrawal,
            payer: Some(payer),
            payee: None,
            amount,
            fee_rate,
            reward_rate: Decimal::ZERO,
            memo: None,
        }
    }

    /// Funds enter the system (mirror of an on-chain deposit)
    pub fn deposit(key: IdempotencyKey, payee: AccountId, amount: Decimal) -> Self {
        Self {
            idempotency_key: key,
            kind: TransferKind::Deposit,
            payer: None,
            payee: Some(payee),
            amount,
            fee_rate: Decimal::ZERO,
            reward_rate: Decimal::ZERO,
            memo: None,
        }
    }

    /// Loyalty tokens granted outside a payment flow
    pub fn reward_grant(key: IdempotencyKey, payee: AccountId, amount: Decimal) -> Self {
        Self {
            idempotency_key: key,
            kind: TransferKind::RewardGrant,
            payer: None,
            payee: Some(payee),
            amount,
            fee_rate: Decimal::ZERO,
            reward_rate: Decimal::ZERO,
            memo: None,
        }
    }

    /// Attach a memo
    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }
}

/// Result of executing a transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferOutcome {
    /// The terminal journal entry (Committed or Failed)
    pub entry: JournalEntry,

    /// Balances of every touched account after the transfer
    /// (empty for Failed entries; no balance was touched)
    pub balances: Vec<AccountBalance>,
}

impl TransferOutcome {
    /// Did the transfer commit?
    pub fn is_committed(&self) -> bool {
        self.entry.status == EntryStatus::Committed
    }

    /// Failure reason, if the transfer was rejected
    pub fn failure_reason(&self) -> Option<&FailureReason> {
        self.entry.failure_reason.as_ref()
    }

    /// Post-transfer balance of one account, if it was touched
    pub fn balance_of(&self, account: &AccountId) -> Option<&AccountBalance> {
        self.balances.iter().find(|b| &b.account_id == account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn committed_entry() -> JournalEntry {
        JournalEntry {
            id: IdempotencyKey::new("tip-1"),
            kind: TransferKind::Tip,
            payer: Some(AccountId::new("fan")),
            payee: Some(AccountId::new("creator")),
            fee_account: Some(AccountId::new("treasury")),
            gross_amount: Decimal::new(2000, 2),
            fee_amount: Decimal::new(20, 2),
            net_amount: Decimal::new(1980, 2),
            reward_amount: Decimal::ONE,
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
    fn test_checked_apply_rejects_negative() {
        let account = Account::new(AccountId::new("fan"));
        let result = account.checked_apply(Decimal::new(-100, 2), Decimal::ZERO);
        assert!(result.is_err());
        // No mutation on failure
        assert_eq!(account.spendable, Decimal::ZERO);
        assert_eq!(account.version, 0);
    }

    #[test]
    fn test_checked_apply_bumps_version() {
        let account = Account::new(AccountId::new("fan"));
        let updated = account
            .checked_apply(Decimal::new(10000, 2), Decimal::ONE)
            .unwrap();
        assert_eq!(updated.spendable, Decimal::new(10000, 2));
        assert_eq!(updated.reward, Decimal::ONE);
        assert_eq!(updated.version, 1);
    }

    #[test]
    fn test_entry_hash_detects_tampering() {
        let entry = committed_entry();
        assert!(entry.verify_hash());

        let mut tampered = entry.clone();
        tampered.net_amount = Decimal::new(999900, 2);
        assert!(!tampered.verify_hash());
    }

    #[test]
    fn test_spendable_effects() {
        let entry = committed_entry();
        let fan = AccountId::new("fan");
        let creator = AccountId::new("creator");
        let treasury = AccountId::new("treasury");

        assert_eq!(entry.spendable_effect(&fan), Decimal::new(-2000, 2));
        assert_eq!(entry.spendable_effect(&creator), Decimal::new(1980, 2));
        assert_eq!(entry.spendable_effect(&treasury), Decimal::new(20, 2));
        assert_eq!(
            entry.spendable_effect(&AccountId::new("bystander")),
            Decimal::ZERO
        );
    }

    #[test]
    fn test_reward_goes_to_payer_except_grants() {
        let entry = committed_entry();
        assert_eq!(entry.reward_effect(&AccountId::new("fan")), Decimal::ONE);
        assert_eq!(
            entry.reward_effect(&AccountId::new("creator")),
            Decimal::ZERO
        );

        let mut grant = committed_entry();
        grant.kind = TransferKind::RewardGrant;
        grant.payer = None;
        grant.reward_amount = Decimal::new(20, 0);
        assert_eq!(
            grant.reward_effect(&AccountId::new("creator")),
            Decimal::new(20, 0)
        );
    }

    #[test]
    fn test_failed_entry_has_no_effect() {
        let mut entry = committed_entry();
        entry.status = EntryStatus::Failed;
        assert_eq!(
            entry.spendable_effect(&AccountId::new("fan")),
            Decimal::ZERO
        );
        assert_eq!(entry.reward_effect(&AccountId::new("fan")), Decimal::ZERO);
    }

    #[test]
    fn test_kind_requirements() {
        assert!(TransferKind::Tip.requires_payer());
        assert!(TransferKind::Tip.requires_payee());
        assert!(!TransferKind::Withdrawal.requires_payee());
        assert!(!TransferKind::Deposit.requires_payer());
        assert!(!TransferKind::RewardGrant.requires_payer());
        assert!(TransferKind::Deposit.is_rate_free());
    }
}
