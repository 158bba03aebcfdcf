//! Tracing subscriber installation

use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::errors::{InfraError, InfraResult};

/// Subscriber settings
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset (e.g. "info")
    pub level: String,
    /// Emit one JSON object per event instead of human-readable lines
    pub json: bool,
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false, with_target: true }
    }
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` takes precedence over `config.level`. Returns `Ok(false)` when a
/// subscriber is already installed, so repeated calls are harmless.
///
/// # Errors
/// Returns [`InfraError::Logging`] if neither `RUST_LOG` nor `config.level`
/// is a valid filter directive.
pub fn init_tracing(config: &LoggingConfig) -> InfraResult<bool> {
    let filter = build_filter(config)?;

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(config.with_target)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(config.with_target).boxed()
    };

    Ok(tracing_subscriber::registry().with(filter).with(fmt_layer).try_init().is_ok())
}

fn build_filter(config: &LoggingConfig) -> InfraResult<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| InfraError::Logging(format!("invalid log filter '{}': {e}", config.level)))
}
