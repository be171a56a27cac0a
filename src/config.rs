//! Configuration management for Bucketgate.
//!
//! Settings come from, in increasing priority:
//! 1. Built-in defaults
//! 2. An optional YAML file
//! 3. Environment variables prefixed with `BUCKETGATE_`, using `__` to
//!    descend into sections (e.g. `BUCKETGATE_RATE_LIMITING__CAPACITY=50`)

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BucketgateError, Result};
use crate::ratelimit::TimeWindow;

/// Main configuration for Bucketgate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BucketgateConfig {
    /// Shared store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Shared store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Redis connection URL
    #[serde(default = "default_store_url")]
    pub url: String,

    /// Upper bound on establishing the connection, in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Upper bound on a single store command, in milliseconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout_ms: u64,

    /// Expire bucket keys this many seconds after their last write
    #[serde(default)]
    pub key_ttl_secs: Option<u64>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            connect_timeout_ms: default_connect_timeout(),
            command_timeout_ms: default_command_timeout(),
            key_ttl_secs: None,
        }
    }
}

fn default_store_url() -> String {
    "redis://127.0.0.1:6379/0".to_string()
}

fn default_connect_timeout() -> u64 {
    2000
}

fn default_command_timeout() -> u64 {
    500
}

/// Which rate limiting algorithm to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    TokenBucket,
    FixedWindow,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Algorithm used for every identity
    #[serde(default)]
    pub strategy: StrategyKind,

    /// Bucket capacity, or requests per window for the fixed window strategy
    #[serde(default = "default_capacity")]
    pub capacity: u64,

    /// Tokens added per second of elapsed time
    #[serde(default = "default_refill_rate")]
    pub refill_rate: f64,

    /// Window length for the fixed window strategy
    #[serde(default = "default_window")]
    pub window: TimeWindow,

    /// Namespace prepended to every store key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            capacity: default_capacity(),
            refill_rate: default_refill_rate(),
            window: default_window(),
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_capacity() -> u64 {
    100
}

fn default_refill_rate() -> f64 {
    1.0
}

fn default_window() -> TimeWindow {
    TimeWindow::Second
}

fn default_key_prefix() -> String {
    "bucket".to_string()
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

const ENV_PREFIX: &str = "BUCKETGATE";

impl BucketgateConfig {
    /// Load configuration from a YAML file path.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: BucketgateConfig =
            serde_yaml::from_str(yaml).map_err(|e| BucketgateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional YAML file layered under
    /// `BUCKETGATE_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(BucketgateError::Config(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            builder = builder.add_source(
                config::File::from(path).format(config::FileFormat::Yaml),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: BucketgateConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| BucketgateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no limiter can run with.
    pub fn validate(&self) -> Result<()> {
        let rl = &self.rate_limiting;
        if rl.capacity == 0 {
            return Err(BucketgateError::Config(
                "rate_limiting.capacity must be at least 1".to_string(),
            ));
        }
        if !rl.refill_rate.is_finite() || rl.refill_rate <= 0.0 {
            return Err(BucketgateError::Config(format!(
                "rate_limiting.refill_rate must be a positive number, got {}",
                rl.refill_rate
            )));
        }
        if rl.key_prefix.is_empty() {
            return Err(BucketgateError::Config(
                "rate_limiting.key_prefix must not be empty".to_string(),
            ));
        }
        if self.store.connect_timeout_ms == 0 || self.store.command_timeout_ms == 0 {
            return Err(BucketgateError::Config(
                "store timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BucketgateConfig::default();
        assert_eq!(config.rate_limiting.strategy, StrategyKind::TokenBucket);
        assert_eq!(config.rate_limiting.capacity, 100);
        assert_eq!(config.rate_limiting.refill_rate, 1.0);
        assert_eq!(config.rate_limiting.key_prefix, "bucket");
        assert_eq!(config.store.url, "redis://127.0.0.1:6379/0");
        assert_eq!(config.store.key_ttl_secs, None);
        assert_eq!(config.logging.format, LogFormat::Text);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
rate_limiting:
  capacity: 10
  refill_rate: 0.5
store:
  key_ttl_secs: 3600
"#;
        let config = BucketgateConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.rate_limiting.capacity, 10);
        assert_eq!(config.rate_limiting.refill_rate, 0.5);
        assert_eq!(config.store.key_ttl_secs, Some(3600));
        // Untouched sections keep their defaults
        assert_eq!(config.store.command_timeout_ms, 500);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_fixed_window_strategy() {
        let yaml = r#"
rate_limiting:
  strategy: fixed_window
  capacity: 5
  window: minute
logging:
  format: json
"#;
        let config = BucketgateConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.rate_limiting.strategy, StrategyKind::FixedWindow);
        assert_eq!(config.rate_limiting.window, TimeWindow::Minute);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let yaml = "rate_limiting:\n  capacity: 0\n";
        let err = BucketgateConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, BucketgateError::Config(_)));
    }

    #[test]
    fn test_non_positive_refill_rate_rejected() {
        let mut config = BucketgateConfig::default();
        config.rate_limiting.refill_rate = 0.0;
        assert!(config.validate().is_err());

        config.rate_limiting.refill_rate = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_prefix_and_zero_timeout_rejected() {
        let mut config = BucketgateConfig::default();
        config.rate_limiting.key_prefix.clear();
        assert!(config.validate().is_err());

        let mut config = BucketgateConfig::default();
        config.store.command_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let yaml = "rate_limiting:\n  strategy: sliding_log\n";
        assert!(BucketgateConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let err = BucketgateConfig::load(Some(Path::new("/definitely/not/here.yaml"))).unwrap_err();
        assert!(matches!(err, BucketgateError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("bucketgate-config-{}.yaml", std::process::id()));
        std::fs::write(&path, "rate_limiting:\n  capacity: 42\n  key_prefix: quota\n").unwrap();

        let config = BucketgateConfig::load(Some(path.as_path())).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.rate_limiting.capacity, 42);
        assert_eq!(config.rate_limiting.key_prefix, "quota");
    }
}
