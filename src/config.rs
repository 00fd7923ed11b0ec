//! Configuration management
//!
//! Handles loading and parsing of an optional JSON configuration file. API
//! credentials never live in the file; they are resolved separately through
//! [`Credentials::from_env`](crate::binance::Credentials::from_env).

use anyhow::{Context, Result};
use arrow_schema::TimeUnit;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub exchange: ExchangeConfig,
    pub fetch: FetchConfig,
    pub compaction: CompactionConfig,
}

impl Config {
    /// Load configuration from JSON file. Missing sections fall back to defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        Ok(config)
    }
}

/// Exchange connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub recv_window_ms: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        ExchangeConfig {
            base_url: "https://api.binance.com".to_string(),
            timeout_secs: 30,
            recv_window_ms: 5000,
        }
    }
}

/// Request shape for historical downloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub interval: String,
    /// Klines per request, Binance allows at most 1000
    pub page_limit: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig {
            interval: "5m".to_string(),
            page_limit: 1000,
        }
    }
}

impl FetchConfig {
    pub fn effective_page_limit(&self) -> u32 {
        self.page_limit.clamp(1, 1000)
    }
}

/// Memory compaction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    pub enabled: bool,
    /// Unit of integer values in a `timestamp` column: "s", "ms", "us" or "ns"
    pub timestamp_unit: String,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        CompactionConfig {
            enabled: true,
            timestamp_unit: "ms".to_string(),
        }
    }
}

impl CompactionConfig {
    pub fn time_unit(&self) -> Result<TimeUnit> {
        match self.timestamp_unit.as_str() {
            "s" => Ok(TimeUnit::Second),
            "ms" => Ok(TimeUnit::Millisecond),
            "us" => Ok(TimeUnit::Microsecond),
            "ns" => Ok(TimeUnit::Nanosecond),
            other => anyhow::bail!(
                "Unknown timestamp unit: {}. Use 's', 'ms', 'us' or 'ns'",
                other
            ),
        }
    }
}
