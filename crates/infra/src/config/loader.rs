//! Configuration loader
//!
//! Loads [`GatewayConfig`] from files and environment variables.
//!
//! ## Loading Strategy
//! 1. Probe the standard paths for a config file; use defaults if none exists
//! 2. Apply `PROMPTGATE_*` environment overrides on top
//! 3. Validate the result
//!
//! ## Environment Variables
//! - `PROMPTGATE_RETRY_MAX_ATTEMPTS`: Attempts per candidate
//! - `PROMPTGATE_RETRY_INITIAL_DELAY_MS`: First backoff delay
//! - `PROMPTGATE_RETRY_MAX_DELAY_MS`: Backoff ceiling
//! - `PROMPTGATE_RETRY_JITTER`: Whether backoff is jittered (true/false)
//! - `PROMPTGATE_CIRCUIT_FAILURE_THRESHOLD`: Failures before a circuit opens
//! - `PROMPTGATE_CIRCUIT_SUCCESS_THRESHOLD`: Trial successes before it closes
//! - `PROMPTGATE_CIRCUIT_TIMEOUT_MS`: Open duration before a trial call
//! - `PROMPTGATE_FALLBACK_ENABLED`: Whether fallbacks run (true/false)
//! - `PROMPTGATE_DEGRADE_GRACEFULLY`: Whether exhausted chains degrade
//! - `PROMPTGATE_CACHE_ENABLED`: Whether successful responses are cached
//! - `PROMPTGATE_CACHE_TTL_MS`: Response cache TTL
//! - `PROMPTGATE_ATTEMPT_TIMEOUT_MS`: Per-attempt deadline
//! - `PROMPTGATE_DAILY_TOKEN_LIMIT`, `PROMPTGATE_DAILY_COST_LIMIT`,
//!   `PROMPTGATE_DAILY_REQUEST_LIMIT`: Daily ceilings
//! - `PROMPTGATE_MONTHLY_TOKEN_LIMIT`, `PROMPTGATE_MONTHLY_COST_LIMIT`,
//!   `PROMPTGATE_MONTHLY_REQUEST_LIMIT`: Monthly ceilings
//! - `PROMPTGATE_PER_REQUEST_TOKEN_LIMIT`: Largest single request
//! - `PROMPTGATE_FLUSH_INTERVAL_MS`: Usage flush interval
//! - `PROMPTGATE_RETENTION_DAYS`: Usage retention in memory
//! - `PROMPTGATE_MAX_UNFLUSHED`: Cap on records awaiting a flush
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./promptgate.json` or `./promptgate.toml` (current working directory)
//! 2. `./config.json` or `./config.toml` (current working directory)
//! 3. The same names in the parent and grandparent directories
//! 4. The same names next to the executable

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use promptgate_domain::GatewayConfig;
use tracing::{debug, info};

use crate::errors::{InfraError, InfraResult};

const ENV_PREFIX: &str = "PROMPTGATE_";
const FILE_STEMS: [&str; 2] = ["promptgate", "config"];
const FILE_EXTENSIONS: [&str; 2] = ["json", "toml"];

/// Load configuration with automatic fallback strategy
///
/// Uses the first config file found by [`probe_config_paths`], or defaults
/// when there is none, then applies environment overrides.
///
/// # Errors
/// Returns [`InfraError`] if a file exists but cannot be read or parsed, an
/// override is malformed, or the final configuration is invalid.
pub fn load() -> InfraResult<GatewayConfig> {
    let base = match probe_config_paths() {
        Some(path) => read_config(&path)?,
        None => {
            debug!("No config file found, starting from defaults");
            GatewayConfig::default()
        }
    };

    let config = apply_overrides(base, |key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

/// Defaults plus `PROMPTGATE_*` overrides
///
/// # Errors
/// Returns [`InfraError`] if an override is malformed or the result is
/// invalid.
pub fn load_from_env() -> InfraResult<GatewayConfig> {
    let config = apply_overrides(GatewayConfig::default(), |key| std::env::var(key).ok())?;
    config.validate()?;
    info!("Configuration loaded from environment variables");
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations. Format is detected by
/// extension. Environment variables are not consulted.
///
/// # Errors
/// Returns [`InfraError`] if the file is missing, unreadable, malformed or
/// invalid.
pub fn load_from_file(path: Option<PathBuf>) -> InfraResult<GatewayConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(InfraError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            InfraError::Config("No config file found in any of the standard locations".to_string())
        })?,
    };

    let config = read_config(&config_path)?;
    config.validate()?;
    Ok(config)
}

fn read_config(path: &Path) -> InfraResult<GatewayConfig> {
    info!(path = %path.display(), "Loading configuration from file");
    let contents = std::fs::read_to_string(path).map_err(|error| InfraError::io(path, error))?;
    parse_config(&contents, path)
}

/// Parse configuration from string content
///
/// Format is detected by `path`'s extension (`.json` or `.toml`). Missing
/// sections take their defaults; the result is not validated.
///
/// # Errors
/// Returns [`InfraError::Config`] for unsupported extensions and parse
/// failures.
pub fn parse_config(contents: &str, path: &Path) -> InfraResult<GatewayConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| InfraError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| InfraError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(InfraError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe multiple paths for configuration files
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut roots = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        roots.extend(cwd.ancestors().take(3).map(Path::to_path_buf));
    }
    if let Some(exe_dir) = std::env::current_exe().ok().and_then(|p| p.parent().map(Path::to_path_buf)) {
        roots.push(exe_dir);
    }

    roots
        .iter()
        .flat_map(|root| {
            FILE_STEMS.iter().flat_map(move |stem| {
                FILE_EXTENSIONS.iter().map(move |ext| root.join(format!("{stem}.{ext}")))
            })
        })
        .find(|path| path.is_file())
}

/// Apply `PROMPTGATE_*` overrides read through `lookup`
///
/// Unset variables leave the corresponding field untouched.
///
/// # Errors
/// Returns [`InfraError::Config`] naming the variable whose value does not
/// parse.
pub fn apply_overrides<F>(mut config: GatewayConfig, lookup: F) -> InfraResult<GatewayConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    if let Some(v) = env.parse("RETRY_MAX_ATTEMPTS")? {
        config.retry.max_attempts = v;
    }
    if let Some(v) = env.millis("RETRY_INITIAL_DELAY_MS")? {
        config.retry.initial_delay = v;
    }
    if let Some(v) = env.millis("RETRY_MAX_DELAY_MS")? {
        config.retry.max_delay = v;
    }
    if let Some(v) = env.flag("RETRY_JITTER") {
        config.retry.jitter_enabled = v;
    }

    if let Some(v) = env.parse("CIRCUIT_FAILURE_THRESHOLD")? {
        config.circuit_breaker.failure_threshold = v;
    }
    if let Some(v) = env.parse("CIRCUIT_SUCCESS_THRESHOLD")? {
        config.circuit_breaker.success_threshold = v;
    }
    if let Some(v) = env.millis("CIRCUIT_TIMEOUT_MS")? {
        config.circuit_breaker.timeout = v;
    }

    if let Some(v) = env.flag("FALLBACK_ENABLED") {
        config.fallback.enable_fallback = v;
    }
    if let Some(v) = env.flag("DEGRADE_GRACEFULLY") {
        config.fallback.degrade_gracefully = v;
    }
    if let Some(v) = env.flag("CACHE_ENABLED") {
        config.fallback.cache_responses = v;
    }
    if let Some(v) = env.millis("CACHE_TTL_MS")? {
        config.fallback.cache_ttl = v;
    }
    if let Some(v) = env.millis("ATTEMPT_TIMEOUT_MS")? {
        config.fallback.attempt_timeout = Some(v);
    }

    let limits = &mut config.limits;
    if let Some(v) = env.parse("DAILY_TOKEN_LIMIT")? {
        limits.daily_tokens = v;
    }
    if let Some(v) = env.parse("DAILY_COST_LIMIT")? {
        limits.daily_cost = v;
    }
    if let Some(v) = env.parse("DAILY_REQUEST_LIMIT")? {
        limits.daily_requests = v;
    }
    if let Some(v) = env.parse("MONTHLY_TOKEN_LIMIT")? {
        limits.monthly_tokens = v;
    }
    if let Some(v) = env.parse("MONTHLY_COST_LIMIT")? {
        limits.monthly_cost = v;
    }
    if let Some(v) = env.parse("MONTHLY_REQUEST_LIMIT")? {
        limits.monthly_requests = v;
    }
    if let Some(v) = env.parse("PER_REQUEST_TOKEN_LIMIT")? {
        limits.per_request_tokens = v;
    }

    if let Some(v) = env.millis("FLUSH_INTERVAL_MS")? {
        config.persistence.flush_interval = v;
    }
    if let Some(v) = env.parse("RETENTION_DAYS")? {
        config.persistence.retention_days = v;
    }
    if let Some(v) = env.parse("MAX_UNFLUSHED")? {
        config.persistence.max_unflushed = v;
    }

    Ok(config)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn raw(&self, name: &str) -> Option<String> {
        (self.lookup)(&format!("{ENV_PREFIX}{name}"))
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn parse<T>(&self, name: &str) -> InfraResult<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.raw(name)
            .map(|value| {
                value.parse::<T>().map_err(|e| {
                    InfraError::Config(format!("Invalid value for {ENV_PREFIX}{name}: {e}"))
                })
            })
            .transpose()
    }

    fn millis(&self, name: &str) -> InfraResult<Option<Duration>> {
        Ok(self.parse::<u64>(name)?.map(Duration::from_millis))
    }

    /// Accepts `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
    fn flag(&self, name: &str) -> Option<bool> {
        self.raw(name)
            .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
    }
}
