//! Artifex Ledger - settlement core for the Artifex creator platform
//!
//! Every balance-affecting event on the platform (subscriptions, tips,
//! content purchases, withdrawals, reward grants, deposits) settles
//! through this crate as an atomic, idempotent, journaled transfer.
//!
//! # Architecture
//!
//! - **Types**: accounts with optimistic versioning, journal entries,
//!   transfer requests and outcomes
//! - **Storage**: RocksDB column families with atomic batch commits
//! - **Account Store**: current balances, a cache of the journal
//! - **Journal**: append-only record of every attempt, keyed by
//!   idempotency key, with derived-balance replay
//! - **Engine**: validation, fee/reward arithmetic, atomic commit
//! - **Guard**: per-account async locks plus versioned writes
//!
//! # Key guarantees
//!
//! - Atomicity: a transfer's journal entry and every balance delta
//!   commit in one batch or not at all
//! - Idempotency: resubmitting a key replays the stored outcome
//! - Auditability: rejections are journaled too, and Committed entries
//!   replay exactly to the stored balances
//! - No negative balances, ever

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod accounts;
pub mod config;
pub mod engine;
pub mod error;
pub mod guard;
pub mod journal;
pub mod metrics;
pub mod storage;
pub mod types;

pub use accounts::AccountStore;
pub use config::{Config, RetryConfig, RocksDbConfig};
pub use engine::Ledger;
pub use error::{Error, Result};
pub use guard::AccountLocks;
pub use journal::Journal;
pub use metrics::Metrics;
pub use storage::Storage;
pub use types::{
    Account, AccountBalance, AccountId, EntryStatus, FailureReason, IdempotencyKey, JournalEntry,
    TransferKind, TransferOutcome, TransferRequest,
};
