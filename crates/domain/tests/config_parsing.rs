//! Configuration file parsing
//!
//! Exercises `GatewayConfig` through both file formats the loader accepts.

use std::time::Duration;

use anyhow::Result;
use promptgate_domain::{DegradationRule, GatewayConfig, ModelPricing};

/// Validates a full TOML document maps onto every section.
///
/// Assertions:
/// - Millisecond keys become `Duration`s.
/// - Price table entries merge with an explicit default rate.
/// - Degradation rules carry arbitrary JSON payloads.
#[test]
fn test_toml_document() -> Result<()> {
    let document = r#"
        [retry]
        max_attempts = 4
        initial_delay_ms = 500
        max_delay_ms = 8000
        backoff_multiplier = 3.0
        jitter_enabled = false

        [circuit_breaker]
        failure_threshold = 3
        timeout_ms = 15000

        [fallback]
        degrade_gracefully = false
        cache_ttl_ms = 120000

        [limits]
        daily_tokens = 50000
        daily_cost = 2.5

        [pricing.default]
        input_per_1k = 0.02
        output_per_1k = 0.06

        [pricing.models.local-llm]
        input_per_1k = 0.0
        output_per_1k = 0.0

        [alerts]
        thresholds = [80, 100]

        [[degradation]]
        key = "translate"
        payload = { translation = "" }
    "#;

    let config: GatewayConfig = toml::from_str(document)?;
    config.validate()?;

    assert_eq!(config.retry.max_attempts, 4);
    assert_eq!(config.retry.initial_delay, Duration::from_millis(500));
    assert!(!config.retry.jitter_enabled);
    assert_eq!(config.circuit_breaker.failure_threshold, 3);
    assert_eq!(config.circuit_breaker.success_threshold, 2);
    assert_eq!(config.circuit_breaker.timeout, Duration::from_secs(15));
    assert!(!config.fallback.degrade_gracefully);
    assert!(config.fallback.cache_responses);
    assert_eq!(config.fallback.cache_ttl, Duration::from_secs(120));
    assert_eq!(config.limits.daily_tokens, 50_000);
    assert_eq!(config.limits.monthly_tokens, 2_000_000);
    assert_eq!(config.pricing.default, ModelPricing::new(0.02, 0.06));
    assert_eq!(config.pricing.lookup("local-llm-13b"), &ModelPricing::new(0.0, 0.0));
    assert_eq!(config.alerts.thresholds, vec![80, 100]);
    assert_eq!(
        config.degradation,
        vec![DegradationRule::new("translate", serde_json::json!({ "translation": "" }))]
    );
    Ok(())
}

#[test]
fn test_empty_documents_are_defaults() -> Result<()> {
    let from_json: GatewayConfig = serde_json::from_str("{}")?;
    let from_toml: GatewayConfig = toml::from_str("")?;

    assert_eq!(from_json, GatewayConfig::default());
    assert_eq!(from_toml, GatewayConfig::default());
    Ok(())
}

/// Validates an invalid policy parses but fails validation.
#[test]
fn test_inverted_delays_rejected_after_parse() -> Result<()> {
    let json = r#"{ "retry": { "initial_delay_ms": 5000, "max_delay_ms": 1000 } }"#;
    let config: GatewayConfig = serde_json::from_str(json)?;

    let error = config.validate().expect_err("max_delay below initial_delay");
    assert!(error.to_string().contains("max_delay_ms"));
    Ok(())
}

#[test]
fn test_json_serialization_uses_millisecond_keys() -> Result<()> {
    let value = serde_json::to_value(GatewayConfig::default())?;

    assert_eq!(value["retry"]["initial_delay_ms"], 1000);
    assert_eq!(value["circuit_breaker"]["timeout_ms"], 60_000);
    assert_eq!(value["fallback"]["cache_ttl_ms"], 300_000);
    assert_eq!(value["alerts"]["suppression_window_ms"], 86_400_000);
    assert!(value["fallback"]["attempt_timeout_ms"].is_null());
    Ok(())
}
