//! Gateway configuration
//!
//! Every section deserializes with defaults, so a file only needs the values
//! it changes. Durations are integer milliseconds on the wire. Call
//! [`GatewayConfig::validate`] before using a configuration; the gateway does
//! so at construction and on every hot update.

use std::time::Duration;

use promptgate_common::{duration_millis, option_duration_millis, ConfigError};
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_ALERT_SUPPRESSION_MS, DEFAULT_ALERT_THRESHOLDS, DEFAULT_BACKOFF_MULTIPLIER,
    DEFAULT_CACHE_MAX_ENTRIES, DEFAULT_CACHE_TTL_MS, DEFAULT_CIRCUIT_TIMEOUT_MS,
    DEFAULT_FAILURE_THRESHOLD, DEFAULT_FLUSH_INTERVAL_MS, DEFAULT_HALF_OPEN_MAX_CALLS,
    DEFAULT_INITIAL_DELAY_MS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY_MS, DEFAULT_MAX_UNFLUSHED,
    DEFAULT_RETENTION_DAYS, DEFAULT_SUCCESS_THRESHOLD, MONTHLY_WARNING_PERCENT,
};
use crate::types::{PriceTable, UsageLimits};

/// Complete gateway configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub retry: RetrySettings,
    pub circuit_breaker: CircuitBreakerSettings,
    pub fallback: FallbackSettings,
    pub limits: UsageLimits,
    pub pricing: PriceTable,
    pub alerts: AlertSettings,
    pub persistence: PersistenceSettings,
    /// Extra degradation rules, consulted before the built-in ones
    pub degradation: Vec<DegradationRule>,
}

/// Retry budget and backoff shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    #[serde(rename = "initial_delay_ms", with = "duration_millis")]
    pub initial_delay: Duration,
    #[serde(rename = "max_delay_ms", with = "duration_millis")]
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter_enabled: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            jitter_enabled: true,
        }
    }
}

impl RetrySettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(invalid("retry.max_attempts must be at least 1"));
        }
        if self.initial_delay.is_zero() {
            return Err(invalid("retry.initial_delay_ms must be greater than 0"));
        }
        if self.max_delay < self.initial_delay {
            return Err(invalid("retry.max_delay_ms must be >= retry.initial_delay_ms"));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(invalid("retry.backoff_multiplier must be >= 1.0"));
        }
        Ok(())
    }
}

/// Per-service circuit breaker thresholds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    #[serde(rename = "timeout_ms", with = "duration_millis")]
    pub timeout: Duration,
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
            timeout: Duration::from_millis(DEFAULT_CIRCUIT_TIMEOUT_MS),
            half_open_max_calls: DEFAULT_HALF_OPEN_MAX_CALLS,
        }
    }
}

/// Fallback chain, response cache and degradation switches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackSettings {
    /// When false only the primary candidate runs
    pub enable_fallback: bool,
    /// Return a placeholder instead of an error once every candidate failed
    pub degrade_gracefully: bool,
    pub cache_responses: bool,
    #[serde(rename = "cache_ttl_ms", with = "duration_millis")]
    pub cache_ttl: Duration,
    pub cache_max_entries: Option<usize>,
    /// Deadline for a single attempt; elapsed attempts classify as timeouts
    #[serde(rename = "attempt_timeout_ms", with = "option_duration_millis")]
    pub attempt_timeout: Option<Duration>,
}

impl Default for FallbackSettings {
    fn default() -> Self {
        Self {
            enable_fallback: true,
            degrade_gracefully: true,
            cache_responses: true,
            cache_ttl: Duration::from_millis(DEFAULT_CACHE_TTL_MS),
            cache_max_entries: Some(DEFAULT_CACHE_MAX_ENTRIES),
            attempt_timeout: None,
        }
    }
}

/// Threshold alert behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    /// Percentages of a limit at which an alert fires
    pub thresholds: Vec<u8>,
    /// Minimum gap between two alerts for the same (period, threshold)
    #[serde(rename = "suppression_window_ms", with = "duration_millis")]
    pub suppression_window: Duration,
    /// Monthly usage percentage above which admissions log a warning
    pub monthly_warning_percent: f64,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            thresholds: DEFAULT_ALERT_THRESHOLDS.to_vec(),
            suppression_window: Duration::from_millis(DEFAULT_ALERT_SUPPRESSION_MS),
            monthly_warning_percent: MONTHLY_WARNING_PERCENT,
        }
    }
}

/// Usage ledger persistence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceSettings {
    #[serde(rename = "flush_interval_ms", with = "duration_millis")]
    pub flush_interval: Duration,
    /// Records older than this many days are dropped from memory
    pub retention_days: u32,
    /// Cap on records waiting for a flush; the oldest are dropped past it
    pub max_unflushed: usize,
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_millis(DEFAULT_FLUSH_INTERVAL_MS),
            retention_days: DEFAULT_RETENTION_DAYS,
            max_unflushed: DEFAULT_MAX_UNFLUSHED,
        }
    }
}

/// Placeholder returned for operation ids containing `key`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradationRule {
    pub key: String,
    pub payload: serde_json::Value,
}

impl DegradationRule {
    pub fn new(key: impl Into<String>, payload: serde_json::Value) -> Self {
        Self { key: key.into(), payload }
    }
}

impl GatewayConfig {
    /// Check every invariant; the first violation is reported
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retry.validate()?;

        let breaker = &self.circuit_breaker;
        if breaker.failure_threshold == 0 || breaker.success_threshold == 0 {
            return Err(invalid("circuit_breaker thresholds must be greater than 0"));
        }
        if breaker.half_open_max_calls == 0 {
            return Err(invalid("circuit_breaker.half_open_max_calls must be greater than 0"));
        }
        if breaker.timeout.is_zero() {
            return Err(invalid("circuit_breaker.timeout_ms must be greater than 0"));
        }

        if self.fallback.cache_ttl.is_zero() {
            return Err(invalid("fallback.cache_ttl_ms must be greater than 0"));
        }
        if self.fallback.cache_max_entries == Some(0) {
            return Err(invalid("fallback.cache_max_entries must be greater than 0"));
        }
        if self.fallback.attempt_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(invalid("fallback.attempt_timeout_ms must be greater than 0"));
        }

        let limits = &self.limits;
        let counts = [
            ("daily_tokens", limits.daily_tokens),
            ("daily_requests", limits.daily_requests),
            ("monthly_tokens", limits.monthly_tokens),
            ("monthly_requests", limits.monthly_requests),
            ("per_request_tokens", limits.per_request_tokens),
        ];
        if let Some((name, _)) = counts.iter().find(|(_, value)| *value == 0) {
            return Err(invalid(format!("limits.{name} must be greater than 0")));
        }
        for (name, value) in [("daily_cost", limits.daily_cost), ("monthly_cost", limits.monthly_cost)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(invalid(format!("limits.{name} must be greater than 0")));
            }
        }

        for (model, pricing) in self.pricing.rates() {
            let rates = [pricing.input_per_1k, pricing.output_per_1k];
            if rates.iter().any(|rate| !rate.is_finite() || *rate < 0.0) {
                return Err(invalid(format!("pricing for {model} must be non-negative")));
            }
        }

        if self.alerts.thresholds.iter().any(|t| *t == 0 || *t > 100) {
            return Err(invalid("alerts.thresholds must be within 1..=100"));
        }
        let warn = self.alerts.monthly_warning_percent;
        if !warn.is_finite() || warn <= 0.0 || warn > 100.0 {
            return Err(invalid("alerts.monthly_warning_percent must be within (0, 100]"));
        }

        if self.persistence.flush_interval.is_zero() {
            return Err(invalid("persistence.flush_interval_ms must be greater than 0"));
        }
        if self.persistence.retention_days == 0 {
            return Err(invalid("persistence.retention_days must be greater than 0"));
        }
        if self.persistence.max_unflushed == 0 {
            return Err(invalid("persistence.max_unflushed must be greater than 0"));
        }

        if self.degradation.iter().any(|rule| rule.key.trim().is_empty()) {
            return Err(invalid("degradation rule keys must not be empty"));
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::invalid(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(GatewayConfig::default().validate().is_ok());
    }

    /// Validates the retry invariants are enforced.
    ///
    /// Assertions:
    /// - `max_delay < initial_delay` is rejected with a message naming it.
    /// - Zero attempts are rejected.
    #[test]
    fn test_retry_invariants() {
        let mut config = GatewayConfig::default();
        config.retry.max_delay = Duration::from_millis(10);
        let error = config.validate().expect_err("inverted delays");
        assert!(error.to_string().contains("max_delay_ms"));

        let mut config = GatewayConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_limit_and_alert_invariants() {
        let mut config = GatewayConfig::default();
        config.limits.per_request_tokens = 0;
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.alerts.thresholds = vec![50, 150];
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.pricing.default.output_per_1k = -1.0;
        assert!(config.validate().is_err());
    }

    /// Validates partial JSON with millisecond durations.
    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{
            "retry": { "max_attempts": 4, "initial_delay_ms": 250 },
            "fallback": { "cache_ttl_ms": 60000, "attempt_timeout_ms": 5000 }
        }"#;
        let config: GatewayConfig = serde_json::from_str(json).expect("deserialize");

        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.retry.initial_delay, Duration::from_millis(250));
        assert_eq!(config.retry.max_delay, Duration::from_millis(DEFAULT_MAX_DELAY_MS));
        assert_eq!(config.fallback.cache_ttl, Duration::from_secs(60));
        assert_eq!(config.fallback.attempt_timeout, Some(Duration::from_secs(5)));
        assert!(config.fallback.degrade_gracefully);
        assert_eq!(config.limits, UsageLimits::default());
    }
}
