//! Configuration loaded from `shiftsync.toml`.
//!
//! [`ShiftSyncConfig`] holds every tunable of the pipeline. Values absent from
//! the file fall back to defaults. The `SHIFTSYNC_BASE_URL` environment
//! variable takes precedence over the file for the upstream address.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::scrape::PoolConfig;
use crate::state_machine::RetryConfig;

pub const CONFIG_FILE: &str = "shiftsync.toml";
pub const BASE_URL_ENV: &str = "SHIFTSYNC_BASE_URL";

/// Top-level configuration loaded from `shiftsync.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ShiftSyncConfig {
    /// Base URL of the external schedule service.
    #[serde(default)]
    pub base_url: String,

    /// Path prefix for per-month schedule pages.
    #[serde(default = "default_schedule_path")]
    pub schedule_path: String,

    /// Concurrent workers in the scrape pool.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Pending jobs the pool accepts before reporting backpressure.
    #[serde(default = "default_max_queue")]
    pub max_queue: usize,

    /// Minimum milliseconds between two upstream requests.
    #[serde(default = "default_rate_limit_ms")]
    pub rate_limit_ms: u64,

    /// Resubmission attempts after the pool reports a full queue.
    #[serde(default = "default_submit_retries")]
    pub submit_retries: u32,

    /// Base backoff between resubmission attempts.
    #[serde(default = "default_submit_backoff_ms")]
    pub submit_backoff_ms: u64,

    /// Per-request timeout for the HTTP fetcher.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Retries for transient HTTP failures (429, 5xx, connection errors).
    #[serde(default = "default_max_fetch_retries")]
    pub max_fetch_retries: u32,

    /// Longest `Retry-After` delay honoured before retrying.
    #[serde(default = "default_max_retry_after_secs")]
    pub max_retry_after_secs: u64,
}

fn default_schedule_path() -> String {
    "/schedule".to_string()
}

fn default_max_workers() -> usize {
    5
}

fn default_max_queue() -> usize {
    100
}

fn default_rate_limit_ms() -> u64 {
    1000
}

fn default_submit_retries() -> u32 {
    3
}

fn default_submit_backoff_ms() -> u64 {
    100
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_fetch_retries() -> u32 {
    3
}

fn default_max_retry_after_secs() -> u64 {
    60
}

impl Default for ShiftSyncConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            schedule_path: default_schedule_path(),
            max_workers: default_max_workers(),
            max_queue: default_max_queue(),
            rate_limit_ms: default_rate_limit_ms(),
            submit_retries: default_submit_retries(),
            submit_backoff_ms: default_submit_backoff_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            max_fetch_retries: default_max_fetch_retries(),
            max_retry_after_secs: default_max_retry_after_secs(),
        }
    }
}

impl ShiftSyncConfig {
    /// Loads `shiftsync.toml` from the current directory.
    /// Uses defaults when the file does not exist.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str::<ShiftSyncConfig>(&contents)
                .with_context(|| format!("failed to parse {}", path.display()))?
        } else {
            Self::default()
        };

        // Environment wins over the file for the upstream address.
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.is_empty() {
                config.base_url = url;
            }
        }

        Ok(config)
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_workers: self.max_workers,
            max_queue: self.max_queue,
        }
    }

    /// Backoff policy used when resubmitting under backpressure.
    pub fn submit_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.submit_retries,
            base_delay_ms: self.submit_backoff_ms,
        }
    }

    /// Backoff policy used by the HTTP fetcher.
    pub fn fetch_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_fetch_retries,
            base_delay_ms: 2000,
        }
    }

    pub fn rate_limit_interval(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn max_retry_after(&self) -> Duration {
        Duration::from_secs(self.max_retry_after_secs)
    }
}
