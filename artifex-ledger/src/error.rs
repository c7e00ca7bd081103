//! Error types for the settlement ledger

use crate::types::AccountId;
use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Balance would go negative; side-effect-free
    #[error("insufficient funds on {account}: requested {requested}, available {available}")]
    InsufficientFunds {
        /// Account that lacks funds
        account: AccountId,
        /// Amount the operation needed
        requested: Decimal,
        /// Balance actually available
        available: Decimal,
    },

    /// Account does not exist
    #[error("account not found: {0}")]
    AccountNotFound(AccountId),

    /// Optimistic-lock mismatch; transient, retry with the same
    /// idempotency key
    #[error("version conflict on {account}: expected {expected}, found {found}")]
    VersionConflict {
        /// Account whose version moved
        account: AccountId,
        /// Version the caller read
        expected: u64,
        /// Version actually stored
        found: u64,
    },

    /// Journal entry not found
    #[error("entry not found: {0}")]
    EntryNotFound(String),

    /// Invariant violation (ledger-balance mismatch, hash mismatch, etc.)
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Storage error (RocksDB)
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl Error {
    /// Transient errors are safe to retry with the same idempotency key
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::VersionConflict { .. })
    }
}
