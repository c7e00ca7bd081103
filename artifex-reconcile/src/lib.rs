//! Artifex Reconcile - external balance reconciliation
//!
//! Compares the ledger journal's derived balances against untrusted
//! external oracles (chain indexers, custodial APIs) and produces
//! severity-classified reports. Report-only by design: reconciliation
//! never writes to the ledger.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod error;
pub mod oracle;
pub mod report;
pub mod service;

pub use error::{Error, Result};
pub use oracle::{ChainOracle, StaticOracle};
pub use report::{ReconciliationReport, Severity};
pub use service::Reconciler;
