//! Integration tests for configuration loader
//!
//! Tests the end-to-end behavior of loading configuration from files.

use std::time::Duration;

use promptgate_infra::config;
use promptgate_infra::InfraError;

#[test]
fn test_load_config_from_json_file() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("promptgate.json");
    std::fs::write(
        &path,
        r#"{
            "retry": { "max_attempts": 4, "initial_delay_ms": 250, "max_delay_ms": 8000 },
            "circuit_breaker": { "failure_threshold": 3, "timeout_ms": 15000 },
            "fallback": { "cache_ttl_ms": 60000, "attempt_timeout_ms": 20000 },
            "limits": { "daily_tokens": 50000, "per_request_tokens": 4000 },
            "degradation": [ { "key": "summary", "payload": { "summary": "" } } ]
        }"#,
    )
    .expect("Failed to write config");

    let config = config::load_from_file(Some(path)).expect("Failed to load JSON config");

    assert_eq!(config.retry.max_attempts, 4);
    assert_eq!(config.retry.initial_delay, Duration::from_millis(250));
    assert_eq!(config.circuit_breaker.failure_threshold, 3);
    assert_eq!(config.circuit_breaker.timeout, Duration::from_secs(15));
    assert_eq!(config.fallback.cache_ttl, Duration::from_secs(60));
    assert_eq!(config.fallback.attempt_timeout, Some(Duration::from_secs(20)));
    assert_eq!(config.limits.daily_tokens, 50_000);
    assert_eq!(config.degradation.len(), 1);
    // Untouched sections keep their defaults
    assert_eq!(config.circuit_breaker.success_threshold, 2);
}

#[test]
fn test_load_config_from_toml_file() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[retry]
max_attempts = 2
jitter_enabled = false

[fallback]
enable_fallback = false
degrade_gracefully = false

[limits]
daily_cost = 2.5

[alerts]
thresholds = [80, 100]
"#,
    )
    .expect("Failed to write config");

    let config = config::load_from_file(Some(path)).expect("Failed to load TOML config");

    assert_eq!(config.retry.max_attempts, 2);
    assert!(!config.retry.jitter_enabled);
    assert!(!config.fallback.enable_fallback);
    assert!(!config.fallback.degrade_gracefully);
    assert!((config.limits.daily_cost - 2.5).abs() < f64::EPSILON);
    assert_eq!(config.alerts.thresholds, vec![80, 100]);
}

#[test]
fn test_load_config_rejects_invalid_values() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("promptgate.json");
    std::fs::write(&path, r#"{ "retry": { "initial_delay_ms": 5000, "max_delay_ms": 1000 } }"#)
        .expect("Failed to write config");

    let result = config::load_from_file(Some(path));
    assert!(matches!(result, Err(InfraError::InvalidConfig(_))));
}

#[test]
fn test_load_config_missing_file() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let result = config::load_from_file(Some(dir.path().join("absent.toml")));

    let error = result.expect_err("missing file");
    assert!(error.to_string().contains("Config file not found"));
}

#[test]
fn test_load_config_malformed_file() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("promptgate.toml");
    std::fs::write(&path, "[retry\nmax_attempts = ").expect("Failed to write config");

    let error = config::load_from_file(Some(path)).expect_err("malformed");
    assert!(error.to_string().contains("Invalid TOML format"));
}
