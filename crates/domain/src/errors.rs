//! Error types used throughout the gateway
//!
//! Two layers:
//! - [`ClassifiedError`]: one failed provider attempt, after classification.
//! - [`GatewayError`]: the tagged outcome of an execution that produced no
//!   value. A quota denial, a provider failure, an open circuit and a caller
//!   cancellation are distinct variants so callers can pattern-match
//!   instead of inspecting messages.

use std::time::Duration;

use promptgate_common::error::{ErrorClassification, ErrorSeverity};
use promptgate_common::option_duration_millis;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::impl_domain_status_conversions;

//==============================================================================
// Error Taxonomy
//==============================================================================

/// Failure classes a provider call can end in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidCredential,
    RateLimited,
    QuotaExceeded,
    ServiceUnavailable,
    Timeout,
    NetworkFailure,
    InvalidRequest,
    ContentRejected,
    PayloadTooLarge,
    Unknown,
}

impl_domain_status_conversions!(ErrorKind {
    InvalidCredential => "invalid_credential",
    RateLimited => "rate_limited",
    QuotaExceeded => "quota_exceeded",
    ServiceUnavailable => "service_unavailable",
    Timeout => "timeout",
    NetworkFailure => "network_failure",
    InvalidRequest => "invalid_request",
    ContentRejected => "content_rejected",
    PayloadTooLarge => "payload_too_large",
    Unknown => "unknown",
});

impl ErrorKind {
    /// Kinds that are never worth another attempt
    pub const fn is_permanent(self) -> bool {
        matches!(
            self,
            Self::InvalidCredential
                | Self::QuotaExceeded
                | Self::InvalidRequest
                | Self::ContentRejected
                | Self::PayloadTooLarge
        )
    }

    pub const fn severity(self) -> ErrorSeverity {
        match self {
            Self::InvalidCredential | Self::QuotaExceeded => ErrorSeverity::Critical,
            Self::InvalidRequest | Self::ContentRejected | Self::PayloadTooLarge | Self::Unknown => {
                ErrorSeverity::Error
            }
            Self::RateLimited | Self::ServiceUnavailable | Self::Timeout | Self::NetworkFailure => {
                ErrorSeverity::Warning
            }
        }
    }

    /// Operator-facing suggestion attached to classified errors
    pub const fn default_remediation(self) -> Option<&'static str> {
        match self {
            Self::InvalidCredential => {
                Some("Verify the provider API key and that it has not been revoked or rotated.")
            }
            Self::RateLimited => {
                Some("Reduce request frequency or wait for the provider's rate-limit window to reset.")
            }
            Self::QuotaExceeded => {
                Some("Check the billing plan and usage limits in the provider's account dashboard.")
            }
            Self::ServiceUnavailable => {
                Some("The provider is temporarily unavailable; retry later or switch to a fallback model.")
            }
            Self::Timeout => Some("Retry the request; consider a shorter prompt or a faster model."),
            Self::NetworkFailure => Some("Check network connectivity and DNS resolution for the provider."),
            Self::InvalidRequest => Some("Review the request parameters; this request will not succeed as sent."),
            Self::ContentRejected => {
                Some("Revise the content to comply with the provider's content policy.")
            }
            Self::PayloadTooLarge => {
                Some("Reduce the prompt or split the request into smaller pieces.")
            }
            Self::Unknown => None,
        }
    }
}

/// A failed attempt after classification
///
/// Constructed fresh for every failed attempt and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind}: {message}")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
    #[serde(default, with = "option_duration_millis", rename = "retry_after_ms")]
    pub retry_after: Option<Duration>,
    #[serde(default)]
    pub remediation: Option<String>,
    /// HTTP status of the raw failure, when there was one
    #[serde(default)]
    pub status: Option<u16>,
}

impl ClassifiedError {
    /// Build an error carrying the kind's default remediation
    pub fn new(kind: ErrorKind, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable,
            retry_after: None,
            remediation: kind.default_remediation().map(str::to_string),
            status: None,
        }
    }

    #[must_use]
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    #[must_use]
    pub fn with_remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = Some(remediation.into());
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: Option<u16>) -> Self {
        self.status = status;
        self
    }
}

impl ErrorClassification for ClassifiedError {
    fn is_retryable(&self) -> bool {
        self.retryable
    }

    fn severity(&self) -> ErrorSeverity {
        self.kind.severity()
    }

    fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }
}

//==============================================================================
// Quota Denial
//==============================================================================

/// Which ceiling refused admission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    PerRequestTokens,
    DailyTokens,
    DailyCost,
    DailyRequests,
}

impl_domain_status_conversions!(DenialReason {
    PerRequestTokens => "per_request_tokens",
    DailyTokens => "daily_tokens",
    DailyCost => "daily_cost",
    DailyRequests => "daily_requests",
});

/// Pre-execution refusal; no provider was called and nothing was spent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{reason}: {message}")]
pub struct QuotaDenial {
    pub reason: DenialReason,
    pub message: String,
    pub suggestion: String,
}

//==============================================================================
// Gateway Error
//==============================================================================

/// Outcome of an execution that did not produce a value
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    /// Refused before any attempt
    #[error("Execution denied by quota: {0}")]
    Denied(QuotaDenial),

    /// Every candidate failed and no degraded response was allowed
    #[error("Provider call failed: {0}")]
    Failed(ClassifiedError),

    /// The service's circuit is open
    #[error("Circuit open for {service_id}, retry in {retry_after:?}")]
    CircuitOpen { service_id: String, retry_after: Duration },

    /// The caller cancelled
    #[error("Execution cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl GatewayError {
    pub const fn is_denied(&self) -> bool {
        matches!(self, Self::Denied(_))
    }

    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The classified provider failure, when this is one
    pub const fn classified(&self) -> Option<&ClassifiedError> {
        match self {
            Self::Failed(error) => Some(error),
            _ => None,
        }
    }
}

impl From<QuotaDenial> for GatewayError {
    fn from(denial: QuotaDenial) -> Self {
        Self::Denied(denial)
    }
}

impl From<ClassifiedError> for GatewayError {
    fn from(error: ClassifiedError) -> Self {
        Self::Failed(error)
    }
}

//==============================================================================
// Persistence
//==============================================================================

/// Failures reported by usage stores
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Storage I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Result type alias for persistence operations
pub type PersistenceResult<T> = std::result::Result<T, PersistenceError>;

#[cfg(test)]
mod tests {
    use super::*;

    /// Validates permanence and severity line up.
    ///
    /// Assertions:
    /// - Credential and quota failures are permanent and critical.
    /// - Transient kinds are warnings.
    #[test]
    fn test_kind_permanence_and_severity() {
        assert!(ErrorKind::InvalidCredential.is_permanent());
        assert!(ErrorKind::QuotaExceeded.is_permanent());
        assert!(!ErrorKind::RateLimited.is_permanent());
        assert!(!ErrorKind::Unknown.is_permanent());

        assert_eq!(ErrorKind::InvalidCredential.severity(), ErrorSeverity::Critical);
        assert_eq!(ErrorKind::Timeout.severity(), ErrorSeverity::Warning);
        assert_eq!(ErrorKind::ContentRejected.severity(), ErrorSeverity::Error);
    }

    #[test]
    fn test_kind_labels_round_trip() {
        for kind in [ErrorKind::RateLimited, ErrorKind::PayloadTooLarge, ErrorKind::Unknown] {
            assert_eq!(kind.to_string().parse::<ErrorKind>().expect("parse"), kind);
        }
        let json = serde_json::to_string(&ErrorKind::NetworkFailure).expect("serialize");
        assert_eq!(json, "\"network_failure\"");
    }

    /// Validates the classification trait implementation.
    #[test]
    fn test_classified_error_classification() {
        let error = ClassifiedError::new(ErrorKind::RateLimited, "slow down", true)
            .with_retry_after(Duration::from_secs(60))
            .with_status(Some(429));

        assert!(error.is_retryable());
        assert_eq!(ErrorClassification::retry_after(&error), Some(Duration::from_secs(60)));
        assert!(!error.is_critical());
        assert!(error.remediation.is_some());
        assert_eq!(error.to_string(), "rate_limited: slow down");
    }

    #[test]
    fn test_classified_error_serializes_retry_after_as_millis() {
        let error = ClassifiedError::new(ErrorKind::RateLimited, "slow down", true)
            .with_retry_after(Duration::from_millis(1500));
        let json = serde_json::to_value(&error).expect("serialize");
        assert_eq!(json["retry_after_ms"], 1500);
        assert_eq!(json["kind"], "rate_limited");
    }

    #[test]
    fn test_gateway_error_accessors() {
        let denial = QuotaDenial {
            reason: DenialReason::DailyTokens,
            message: "daily token limit reached".into(),
            suggestion: "wait for reset".into(),
        };
        let denied = GatewayError::from(denial);
        assert!(denied.is_denied());
        assert!(denied.classified().is_none());

        let failed = GatewayError::from(ClassifiedError::new(ErrorKind::Timeout, "slow", true));
        assert_eq!(failed.classified().map(|e| e.kind), Some(ErrorKind::Timeout));
        assert!(GatewayError::Cancelled { attempts: 2 }.is_cancelled());
    }
}
