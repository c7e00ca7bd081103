//! Configuration for the settlement ledger

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Reserved account credited with protocol fees
    pub fee_account: String,

    /// Decimal places of the spendable currency's minimum unit
    /// (2 for USDC cents)
    pub currency_scale: u32,

    /// Default protocol fee rate offered to callers (the engine takes
    /// the rate from each request; this is a convenience only)
    pub default_fee_rate: Decimal,

    /// RocksDB configuration
    pub rocksdb: RocksDbConfig,

    /// Version-conflict retry configuration
    pub retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/ledger"),
            service_name: "artifex-ledger".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            fee_account: "artifex:treasury".to_string(),
            currency_scale: 2,
            default_fee_rate: Decimal::new(1, 2), // 1%
            rocksdb: RocksDbConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDbConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Target file size (MB)
    pub target_file_size_mb: u64,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            target_file_size_mb: 64,
            max_background_jobs: 4,
        }
    }
}

/// Retry policy for transient `VersionConflict` results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts (including the first)
    pub max_attempts: u32,

    /// Base backoff delay (milliseconds), doubled per attempt
    pub base_delay_ms: u64,

    /// Backoff ceiling (milliseconds)
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 10,
            max_delay_ms: 500,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("ARTIFEX_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(fee_account) = std::env::var("ARTIFEX_FEE_ACCOUNT") {
            config.fee_account = fee_account;
        }

        if let Ok(scale) = std::env::var("ARTIFEX_CURRENCY_SCALE") {
            config.currency_scale = scale
                .parse()
                .map_err(|e| crate::Error::Config(format!("bad ARTIFEX_CURRENCY_SCALE: {}", e)))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency
    pub fn validate(&self) -> crate::Result<()> {
        if self.fee_account.is_empty() {
            return Err(crate::Error::Config("fee_account must not be empty".into()));
        }
        if self.default_fee_rate < Decimal::ZERO || self.default_fee_rate > Decimal::ONE {
            return Err(crate::Error::Config(
                "default_fee_rate must be within [0, 1]".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(crate::Error::Config(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
