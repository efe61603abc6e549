//! # Relay Configuration
//!
//! Immutable process-wide configuration wired at startup:
//! read TOML from `RELAY_CONFIG_PATH`, deserialize, validate, done.
//! Every field has a default, so an absent file yields a runnable
//! development configuration.
//!
//! ## Usage
//!
//! ```rust
//! use currency_relay::config::RelayConfig;
//!
//! let config = RelayConfig::default();
//! assert_eq!(config.pool.max_workers, 20);
//! assert_eq!(config.retry.max_attempts, 5);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, RelayResult};

/// Environment variable naming the TOML file to load.
pub const CONFIG_PATH_ENV: &str = "RELAY_CONFIG_PATH";

/// Top-level configuration for every relay subsystem.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub bus: BusConfig,
    pub retry: RetryConfig,
    pub pool: PoolConfig,
    pub cache: CacheConfig,
    pub dedup: DedupConfig,
    pub edge: EdgeConfig,
    pub upstream: UpstreamConfig,
    pub database: DatabaseConfig,
}

impl RelayConfig {
    /// Load configuration from the file named by `RELAY_CONFIG_PATH`,
    /// falling back to defaults when the variable is unset.
    pub fn load_from_env() -> RelayResult<Self> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::load_from_file(&path),
            Err(_) => {
                let config = Self::default();
                config.validate().map_err(RelayError::configuration)?;
                Ok(config)
            }
        }
    }

    /// Load and validate configuration from a TOML file.
    pub fn load_from_file(path: &str) -> RelayResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RelayError::configuration(format!("cannot read config file {path}: {e}"))
        })?;
        let config: Self = toml::from_str(&raw).map_err(|e| {
            RelayError::configuration(format!("cannot parse config file {path}: {e}"))
        })?;
        config.validate().map_err(RelayError::configuration)?;
        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.retry.validate()?;
        self.pool.validate()?;
        self.cache.validate()?;
        self.dedup.validate()?;
        self.edge.validate()?;
        Ok(())
    }
}

/// Bus connection and producer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Broker addresses, comma-separated.
    pub brokers: String,
    /// Base consumer group id for this process.
    pub group_id: String,
    /// Prefix for transactional producer ids.
    pub transactional_id_prefix: String,
    /// Whether producers are idempotent.
    pub enable_idempotence: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            group_id: crate::constants::EDGE_GROUP.to_string(),
            transactional_id_prefix: "currency-relay-tx".to_string(),
            enable_idempotence: true,
        }
    }
}

/// Backoff policy for the upstream call (and other retried operations).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub multiplier: f64,
    pub cap_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_ms: 2000,
            multiplier: 2.0,
            cap_ms: 5000,
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("retry.max_attempts must be greater than 0".to_string());
        }
        if self.multiplier < 1.0 {
            return Err("retry.multiplier must be at least 1.0".to_string());
        }
        if self.cap_ms < self.backoff_ms {
            return Err("retry.cap_ms must not be below retry.backoff_ms".to_string());
        }
        Ok(())
    }

    /// Delay before the given retry (0-based index of the wait, i.e. the wait
    /// after attempt `n + 1` failed), capped at `cap_ms`.
    pub fn delay_for(&self, retry_index: u32) -> Duration {
        let raw = self.backoff_ms as f64 * self.multiplier.powi(retry_index as i32);
        Duration::from_millis((raw as u64).min(self.cap_ms))
    }
}

/// Bounded worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub min_workers: usize,
    pub max_workers: usize,
    pub queue_capacity: usize,
    pub idle_timeout_sec: u64,
    pub monitor_interval_sec: u64,
    pub shutdown_drain_sec: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_workers: 5,
            max_workers: 20,
            queue_capacity: 500,
            idle_timeout_sec: 60,
            monitor_interval_sec: 30,
            shutdown_drain_sec: 60,
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.min_workers == 0 {
            return Err("pool.min_workers must be greater than 0".to_string());
        }
        if self.max_workers < self.min_workers {
            return Err("pool.max_workers must not be below pool.min_workers".to_string());
        }
        if self.queue_capacity == 0 {
            return Err("pool.queue_capacity must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Cache freshness settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Age in seconds below which a cached reply is served without refetch.
    pub freshness_sec: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { freshness_sec: 3600 }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.freshness_sec <= 0 {
            return Err("cache.freshness_sec must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Dedup ledger retention settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// TTL for a seen correlation id, in days.
    pub ttl_days: i64,
    /// Rows older than this, by creation time, are purged regardless of TTL.
    pub hard_purge_days: i64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            ttl_days: 10,
            hard_purge_days: 15,
        }
    }
}

impl DedupConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.ttl_days <= 0 {
            return Err("dedup.ttl_days must be greater than 0".to_string());
        }
        if self.hard_purge_days < self.ttl_days {
            return Err("dedup.hard_purge_days must not be below dedup.ttl_days".to_string());
        }
        Ok(())
    }
}

/// Edge HTTP settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeConfig {
    /// Seconds a caller is suspended awaiting a reply.
    pub request_timeout_sec: u64,
    /// Bind address of the HTTP surface.
    pub bind_address: String,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            request_timeout_sec: 10,
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

impl EdgeConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.request_timeout_sec == 0 {
            return Err("edge.request_timeout_sec must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_sec)
    }
}

/// Upstream exchange-rates API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub api_key: String,
    /// Per-attempt request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.exchangeratesapi.io/v1/latest".to_string(),
            api_key: String::new(),
            timeout_ms: 10_000,
        }
    }
}

/// Database connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/currency_relay".to_string(),
            max_connections: 10,
        }
    }
}
