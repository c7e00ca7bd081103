//! Error types for reconciliation

use thiserror::Error;

/// Reconciliation errors
#[derive(Error, Debug)]
pub enum Error {
    /// Ledger-side failure
    #[error("ledger error: {0}")]
    Ledger(#[from] artifex_ledger::Error),

    /// The external oracle could not answer
    #[error("oracle error: {0}")]
    Oracle(String),

    /// Report serialization failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
