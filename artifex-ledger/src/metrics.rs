//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `ledger_transfers_total` - transfers committed
//! - `ledger_transfers_failed_total` - transfers rejected in validation
//! - `ledger_transfers_replayed_total` - idempotent replays served
//! - `ledger_commit_duration_seconds` - commit latency histogram

use crate::error::{Error, Result};
use prometheus::{Histogram, HistogramOpts, IntCounter, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Transfers committed
    pub transfers_total: IntCounter,

    /// Transfers rejected during validation
    pub transfers_failed_total: IntCounter,

    /// Duplicate submissions answered from the journal
    pub transfers_replayed_total: IntCounter,

    /// Commit latency histogram
    pub commit_duration: Histogram,

    /// Prometheus registry
    registry: Arc<Registry>,
}

impl Metrics {
    /// Create a metrics collector with its own registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let transfers_total = IntCounter::with_opts(Opts::new(
            "ledger_transfers_total",
            "Transfers committed",
        ))
        .map_err(|e| Error::Config(e.to_string()))?;
        registry
            .register(Box::new(transfers_total.clone()))
            .map_err(|e| Error::Config(e.to_string()))?;

        let transfers_failed_total = IntCounter::with_opts(Opts::new(
            "ledger_transfers_failed_total",
            "Transfers rejected during validation",
        ))
        .map_err(|e| Error::Config(e.to_string()))?;
        registry
            .register(Box::new(transfers_failed_total.clone()))
            .map_err(|e| Error::Config(e.to_string()))?;

        let transfers_replayed_total = IntCounter::with_opts(Opts::new(
            "ledger_transfers_replayed_total",
            "Duplicate submissions answered from the journal",
        ))
        .map_err(|e| Error::Config(e.to_string()))?;
        registry
            .register(Box::new(transfers_replayed_total.clone()))
            .map_err(|e| Error::Config(e.to_string()))?;

        let commit_duration = Histogram::with_opts(
            HistogramOpts::new(
                "ledger_commit_duration_seconds",
                "Commit latency histogram",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500]),
        )
        .map_err(|e| Error::Config(e.to_string()))?;
        registry
            .register(Box::new(commit_duration.clone()))
            .map_err(|e| Error::Config(e.to_string()))?;

        Ok(Self {
            transfers_total,
            transfers_failed_total,
            transfers_replayed_total,
            commit_duration,
            registry,
        })
    }

    /// Record a committed transfer
    pub fn record_commit(&self, duration_seconds: f64) {
        self.transfers_total.inc();
        self.commit_duration.observe(duration_seconds);
    }

    /// Record a validation rejection
    pub fn record_failure(&self) {
        self.transfers_failed_total.inc();
    }

    /// Record an idempotent replay
    pub fn record_replay(&self) {
        self.transfers_replayed_total.inc();
    }

    /// Get metrics registry (for scrape endpoints)
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.transfers_total.get(), 0);
        assert_eq!(metrics.transfers_failed_total.get(), 0);

        // Registries are independent; creating twice must not clash
        let _second = Metrics::new().unwrap();
    }

    #[test]
    fn test_record_paths() {
        let metrics = Metrics::new().unwrap();

        metrics.record_commit(0.004);
        metrics.record_commit(0.012);
        metrics.record_failure();
        metrics.record_replay();

        assert_eq!(metrics.transfers_total.get(), 2);
        assert_eq!(metrics.transfers_failed_total.get(), 1);
        assert_eq!(metrics.transfers_replayed_total.get(), 1);
    }
}
