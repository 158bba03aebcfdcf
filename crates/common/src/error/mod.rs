//! Error classification contract shared by every protective layer.
//!
//! The retry executor and the circuit breaker never inspect concrete error
//! types. They consult [`ErrorClassification`], which callers implement for
//! whatever error their operations produce. This keeps the resilience
//! primitives generic while letting the domain decide what is transient.
//!
//! ## ErrorSeverity Levels
//!
//! | Level | Use Case | Examples |
//! |-------|----------|----------|
//! | **Info** | Expected conditions | Cancelled by caller |
//! | **Warning** | Degraded but operational | Rate limiting, transient outages |
//! | **Error** | Failure requiring attention | Invalid request, rejected content |
//! | **Critical** | Operator action required | Revoked credentials, exhausted billing quota |
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//!
//! use promptgate_common::error::{ErrorClassification, ErrorSeverity};
//!
//! #[derive(Debug)]
//! enum UpstreamError {
//!     Throttled(Duration),
//!     BadInput,
//! }
//!
//! impl ErrorClassification for UpstreamError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, Self::Throttled(_))
//!     }
//!
//!     fn severity(&self) -> ErrorSeverity {
//!         match self {
//!             Self::Throttled(_) => ErrorSeverity::Warning,
//!             Self::BadInput => ErrorSeverity::Error,
//!         }
//!     }
//!
//!     fn retry_after(&self) -> Option<Duration> {
//!         match self {
//!             Self::Throttled(delay) => Some(*delay),
//!             Self::BadInput => None,
//!         }
//!     }
//! }
//!
//! assert!(UpstreamError::Throttled(Duration::from_secs(1)).is_retryable());
//! assert!(!UpstreamError::BadInput.is_critical());
//! ```

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Error classification trait for consistent error handling across modules
///
/// Implementations decide whether a failure is worth another attempt and how
/// loudly it should be reported. The retry executor relies on
/// [`is_retryable`](Self::is_retryable) and [`retry_after`](Self::retry_after)
/// only.
pub trait ErrorClassification {
    /// Check if this error is retryable
    ///
    /// Retryable errors are transient issues that may succeed if attempted
    /// again, such as timeouts, throttling or temporary unavailability.
    fn is_retryable(&self) -> bool;

    /// Get the error severity level
    ///
    /// Used for monitoring, alerting, and logging decisions.
    fn severity(&self) -> ErrorSeverity;

    /// Check if this is a critical error requiring immediate attention
    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }

    /// Get the suggested retry delay if applicable
    ///
    /// Returns `Some(Duration)` when the failing party asked for a specific
    /// delay (e.g. a `Retry-After` header). The retry executor uses it in
    /// place of its computed backoff.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    /// Informational, typically for debugging
    Info,
    /// Warning, should be monitored but not critical
    Warning,
    /// Error, requires attention and action
    Error,
    /// Critical, immediate action required
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Simple configuration error for validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid { message: message.into() }
    }
}

/// Configuration result type using simple config errors
pub type ConfigResult<T> = Result<T, ConfigError>;
