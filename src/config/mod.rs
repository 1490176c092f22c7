//! Configuration management for the Gateway
//!
//! All batching and server parameters are read once at process start from
//! environment variables and are immutable afterwards. The effective values
//! are exposed read-only through `GET /config`.

use crate::utils::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// Main configuration struct for the Gateway
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Dynamic batching configuration
    pub batching: BatchingConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        info!("Loading configuration from environment variables");

        let config = Self {
            server: ServerConfig::from_env()?,
            batching: BatchingConfig::from_env()?,
        };

        config.validate()?;

        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Get server configuration
    pub fn server(&self) -> &ServerConfig {
        &self.server
    }

    /// Get batching configuration
    pub fn batching(&self) -> &BatchingConfig {
        &self.batching
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        debug!("Validating configuration");

        self.server
            .validate()
            .map_err(|e| GatewayError::Config(format!("Server config error: {}", e)))?;

        self.batching
            .validate()
            .map_err(|e| GatewayError::Config(format!("Batching config error: {}", e)))?;

        debug!("Configuration validation completed");
        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Number of HTTP worker threads (defaults to CPU count)
    pub workers: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: None,
        }
    }
}

impl ServerConfig {
    /// Load server configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: std::env::var("HOST").unwrap_or_else(|_| default_host()),
            port: env_parse("PORT", default_port())?,
            workers: match std::env::var("HTTP_WORKERS") {
                Ok(v) => Some(parse_env_value("HTTP_WORKERS", &v)?),
                Err(_) => None,
            },
        })
    }

    /// Get the server bind address
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the number of HTTP workers (defaults to CPU count)
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get)
    }

    /// Validate the server configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.host.is_empty() {
            return Err("host cannot be empty".to_string());
        }
        if self.port == 0 {
            return Err("port cannot be 0".to_string());
        }
        if self.workers == Some(0) {
            return Err("worker count cannot be 0".to_string());
        }
        Ok(())
    }
}

/// Dynamic batching configuration
///
/// Mirrors the knobs of the batch engine: how large a batch may grow, how
/// long a worker waits for requests to accumulate, how many batches may be
/// in flight at once, and how long a caller waits for its result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchingConfig {
    /// Maximum number of requests coalesced into a single batch
    pub max_batch_size: usize,
    /// Fixed formation delay in seconds (wait for more requests to arrive)
    pub batch_timeout_secs: f64,
    /// Maximum number of batches executing the downstream call concurrently
    pub max_concurrent_batches: usize,
    /// Overall per-request timeout in seconds, measured from admission
    pub request_timeout_secs: f64,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            batch_timeout_secs: default_batch_timeout_secs(),
            max_concurrent_batches: default_max_concurrent_batches(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl BatchingConfig {
    /// Load batching configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            max_batch_size: env_parse("BATCH_SIZE", default_max_batch_size())?,
            batch_timeout_secs: env_parse("BATCH_TIMEOUT", default_batch_timeout_secs())?,
            max_concurrent_batches: env_parse(
                "MAX_CONCURRENT_BATCHES",
                default_max_concurrent_batches(),
            )?,
            request_timeout_secs: env_parse("REQUEST_TIMEOUT", default_request_timeout_secs())?,
        })
    }

    /// Formation delay as a [`Duration`]
    pub fn formation_delay(&self) -> Duration {
        Duration::from_secs_f64(self.batch_timeout_secs)
    }

    /// Per-request timeout as a [`Duration`]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.request_timeout_secs)
    }

    /// Validate the batching configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_batch_size == 0 {
            return Err("max_batch_size must be at least 1".to_string());
        }
        if self.max_concurrent_batches == 0 {
            return Err("max_concurrent_batches must be at least 1".to_string());
        }
        if self.batch_timeout_secs < 0.0 || !self.batch_timeout_secs.is_finite() {
            return Err("batch_timeout must be a non-negative number".to_string());
        }
        if self.request_timeout_secs <= 0.0 || !self.request_timeout_secs.is_finite() {
            return Err("request_timeout must be a positive number".to_string());
        }
        Ok(())
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_batch_size() -> usize {
    32
}

// 10 ms default formation window
fn default_batch_timeout_secs() -> f64 {
    0.01
}

fn default_max_concurrent_batches() -> usize {
    4
}

fn default_request_timeout_secs() -> f64 {
    10.0
}

/// Read and parse an environment variable, falling back to a default when unset.
///
/// An unparseable value is a hard configuration error rather than a silent
/// fallback, so a typo in a deployment manifest fails fast at startup.
fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => parse_env_value(key, &value),
        Err(_) => Ok(default),
    }
}

fn parse_env_value<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| GatewayError::Config(format!("Invalid value for {}: {}", key, e)))
}
