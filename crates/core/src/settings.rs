//! Conversions from serialized settings to runtime primitive configs

use promptgate_common::resilience::{CircuitBreakerConfig, ConfigResult, RetryPolicy};
use promptgate_common::CacheConfig;
use promptgate_domain::{CircuitBreakerSettings, FallbackSettings, GatewayConfig, RetrySettings};

use crate::usage::TrackerSettings;

pub fn retry_policy(settings: &RetrySettings) -> ConfigResult<RetryPolicy> {
    RetryPolicy::builder()
        .max_attempts(settings.max_attempts)
        .initial_delay(settings.initial_delay)
        .max_delay(settings.max_delay)
        .backoff_multiplier(settings.backoff_multiplier)
        .jitter(settings.jitter_enabled)
        .build()
}

pub fn breaker_config(settings: &CircuitBreakerSettings) -> ConfigResult<CircuitBreakerConfig> {
    CircuitBreakerConfig::builder()
        .failure_threshold(settings.failure_threshold)
        .success_threshold(settings.success_threshold)
        .timeout(settings.timeout)
        .half_open_max_calls(settings.half_open_max_calls)
        .build()
}

pub fn cache_config(settings: &FallbackSettings) -> ConfigResult<CacheConfig> {
    let builder = CacheConfig::builder().ttl(settings.cache_ttl);
    match settings.cache_max_entries {
        Some(max) => builder.max_entries(max),
        None => builder.unbounded(),
    }
    .build()
}

pub fn tracker_settings(config: &GatewayConfig) -> TrackerSettings {
    TrackerSettings {
        limits: config.limits.clone(),
        pricing: config.pricing.clone(),
        alerts: config.alerts.clone(),
        retention_days: config.persistence.retention_days,
        max_unflushed: config.persistence.max_unflushed,
    }
}
