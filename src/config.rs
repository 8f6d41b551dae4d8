use std::str::FromStr;
use std::time::Duration;

use crate::utils::{CircuitBreakerConfig, RetryConfig};

// ============================================================================
// Engine Configuration
// ============================================================================
//
// Defaults are usable as-is; `from_env` overrides them from ORDER_ENGINE_*
// variables (a `.env` file is loaded first when present).
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Days after delivery during which a return may be requested
    pub return_window_days: i64,
    /// Upper bound for every collaborator call
    pub collaborator_timeout: Duration,
    /// Regions (state / province names, case-insensitive) that add two
    /// days to the delivery estimate
    pub remote_regions: Vec<String>,
    pub tracking_prefix: String,
    pub invoice_prefix: String,
    pub carrier_breaker: CircuitBreakerConfig,
    pub payment_breaker: CircuitBreakerConfig,
    pub notification_retry: RetryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            return_window_days: 7,
            collaborator_timeout: Duration::from_secs(5),
            remote_regions: Vec::new(),
            tracking_prefix: "TRK".to_string(),
            invoice_prefix: "INV".to_string(),
            carrier_breaker: CircuitBreakerConfig::default(),
            payment_breaker: CircuitBreakerConfig {
                failure_threshold: 3,
                open_for: Duration::from_secs(30),
                success_threshold: 1,
            },
            notification_retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid value for {key}: {value:?}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Missing .env is normal outside development
        let _ = dotenvy::dotenv();

        let mut config = Self::default();

        if let Some(days) = read_var::<i64>("ORDER_ENGINE_RETURN_WINDOW_DAYS")? {
            if days <= 0 {
                return Err(ConfigError {
                    key: "ORDER_ENGINE_RETURN_WINDOW_DAYS",
                    value: days.to_string(),
                });
            }
            config.return_window_days = days;
        }
        if let Some(ms) = read_var::<u64>("ORDER_ENGINE_COLLABORATOR_TIMEOUT_MS")? {
            config.collaborator_timeout = Duration::from_millis(ms);
        }
        if let Ok(regions) = std::env::var("ORDER_ENGINE_REMOTE_REGIONS") {
            config.remote_regions = regions
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Ok(prefix) = std::env::var("ORDER_ENGINE_TRACKING_PREFIX") {
            config.tracking_prefix = prefix;
        }
        if let Ok(prefix) = std::env::var("ORDER_ENGINE_INVOICE_PREFIX") {
            config.invoice_prefix = prefix;
        }
        if let Some(threshold) = read_var::<u32>("ORDER_ENGINE_CARRIER_FAILURE_THRESHOLD")? {
            config.carrier_breaker.failure_threshold = threshold;
        }
        if let Some(attempts) = read_var::<u32>("ORDER_ENGINE_NOTIFY_MAX_ATTEMPTS")? {
            config.notification_retry.max_attempts = attempts.max(1);
        }

        Ok(config)
    }

    pub fn is_remote_region(&self, region: &str) -> bool {
        self.remote_regions
            .iter()
            .any(|r| r.eq_ignore_ascii_case(region.trim()))
    }
}

fn read_var<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError { key, value }),
        Err(_) => Ok(None),
    }
}
