//! Error classifier
//!
//! Maps a raw [`ProviderFailure`] onto a [`ClassifiedError`]. Rules are
//! checked in a fixed order and the first match wins:
//!
//! | # | Kind | Signals | Retryable |
//! |---|------|---------|-----------|
//! | 1 | `InvalidCredential` | 401, invalid key codes/messages | no |
//! | 2 | `RateLimited` | 429, rate limit codes/messages | yes (default 60s hint) |
//! | 3 | `QuotaExceeded` | quota/billing codes, "quota" in message | no |
//! | 4 | `ServiceUnavailable` | 503, overloaded/unavailable codes | yes |
//! | 5 | `Timeout` | transport timeout, 408 | yes |
//! | 6 | `NetworkFailure` | refused, DNS, reset | yes |
//! | 7 | `InvalidRequest` | 400, 422 | no |
//! | 8 | `ContentRejected` | content policy codes/messages | no |
//! | 9 | `PayloadTooLarge` | 413, context length codes/messages | no |
//! | 10 | `Unknown` | anything else | only when status >= 500 or absent |
//!
//! A 400 that carries a content-policy or context-length signal is reported
//! under the more specific kind; its retryability is the same either way.

use std::time::Duration;

use promptgate_domain::constants::DEFAULT_RATE_LIMIT_RETRY_AFTER_SECS;
use promptgate_domain::{ClassifiedError, ErrorKind, ProviderFailure, TransportErrorKind};

const CREDENTIAL_CODES: &[&str] =
    &["invalid_api_key", "authentication_error", "invalid_credentials", "unauthorized"];
const CREDENTIAL_PATTERNS: &[&str] =
    &["invalid api key", "invalid_api_key", "incorrect api key", "api key not valid"];

const RATE_LIMIT_CODES: &[&str] = &["rate_limit_exceeded", "rate_limited", "rate_limit_error"];
const RATE_LIMIT_PATTERNS: &[&str] = &["rate limit", "rate_limit", "too many requests"];

const QUOTA_CODES: &[&str] =
    &["insufficient_quota", "quota_exceeded", "billing_hard_limit_reached", "billing_not_active"];
const QUOTA_PATTERNS: &[&str] = &["quota", "billing"];

const UNAVAILABLE_CODES: &[&str] =
    &["model_not_available", "service_unavailable", "overloaded_error", "engine_overloaded"];
const UNAVAILABLE_PATTERNS: &[&str] = &["service unavailable", "overloaded", "model is unavailable"];

const TIMEOUT_PATTERNS: &[&str] = &["timed out", "timeout", "deadline exceeded"];

const CONTENT_CODES: &[&str] = &["content_policy_violation", "content_filter", "safety"];
const CONTENT_PATTERNS: &[&str] =
    &["content policy", "content_policy", "content filter", "flagged by", "safety system"];

const PAYLOAD_CODES: &[&str] =
    &["context_length_exceeded", "request_too_large", "content_too_large", "string_above_max_length"];
const PAYLOAD_PATTERNS: &[&str] = &[
    "context_length_exceeded",
    "maximum context length",
    "context window",
    "too many tokens",
    "request too large",
    "payload too large",
    "token limit",
];

/// Stateless failure classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorClassifier {
    rate_limit_retry_after: Duration,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self { rate_limit_retry_after: Duration::from_secs(DEFAULT_RATE_LIMIT_RETRY_AFTER_SECS) }
    }
}

impl ErrorClassifier {
    /// Classifier with the built-in status and provider-code tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the hint used when a rate-limited response carries none
    #[must_use]
    pub const fn with_rate_limit_retry_after(mut self, retry_after: Duration) -> Self {
        self.rate_limit_retry_after = retry_after;
        self
    }

    /// Classify one failed attempt
    pub fn classify(&self, failure: &ProviderFailure) -> ClassifiedError {
        let signals = Signals::new(failure);
        let (kind, retryable) = Self::kind_of(&signals, failure);

        let mut error = ClassifiedError::new(kind, failure.message.clone(), retryable)
            .with_status(failure.status);

        if kind == ErrorKind::RateLimited {
            error = error.with_retry_after(failure.retry_after.unwrap_or(self.rate_limit_retry_after));
        } else if let Some(hint) = failure.retry_after.filter(|_| retryable) {
            error = error.with_retry_after(hint);
        }
        error
    }

    fn kind_of(signals: &Signals, failure: &ProviderFailure) -> (ErrorKind, bool) {
        let status = failure.status;

        if status == Some(401) || signals.matches(CREDENTIAL_CODES, CREDENTIAL_PATTERNS) {
            return (ErrorKind::InvalidCredential, false);
        }
        if status == Some(429) || signals.matches(RATE_LIMIT_CODES, RATE_LIMIT_PATTERNS) {
            return (ErrorKind::RateLimited, true);
        }
        if signals.matches(QUOTA_CODES, QUOTA_PATTERNS) {
            return (ErrorKind::QuotaExceeded, false);
        }
        if status == Some(503) || signals.matches(UNAVAILABLE_CODES, UNAVAILABLE_PATTERNS) {
            return (ErrorKind::ServiceUnavailable, true);
        }
        if failure.transport == Some(TransportErrorKind::TimedOut)
            || status == Some(408)
            || (status.is_none() && signals.message_contains(TIMEOUT_PATTERNS))
        {
            return (ErrorKind::Timeout, true);
        }
        if matches!(
            failure.transport,
            Some(
                TransportErrorKind::ConnectionRefused
                    | TransportErrorKind::DnsFailure
                    | TransportErrorKind::ConnectionReset
            )
        ) {
            return (ErrorKind::NetworkFailure, true);
        }

        let content = signals.matches(CONTENT_CODES, CONTENT_PATTERNS);
        let payload = status == Some(413) || signals.matches(PAYLOAD_CODES, PAYLOAD_PATTERNS);

        if matches!(status, Some(400 | 422)) && !content && !payload {
            return (ErrorKind::InvalidRequest, false);
        }
        if content {
            return (ErrorKind::ContentRejected, false);
        }
        if payload {
            return (ErrorKind::PayloadTooLarge, false);
        }

        let retryable = status.map_or(true, |code| code >= 500);
        (ErrorKind::Unknown, retryable)
    }
}

/// Lower-cased views of the textual parts of a failure
struct Signals {
    code: Option<String>,
    message: String,
}

impl Signals {
    fn new(failure: &ProviderFailure) -> Self {
        Self {
            code: failure.code.as_deref().map(str::to_ascii_lowercase),
            message: failure.message.to_lowercase(),
        }
    }

    fn code_is(&self, codes: &[&str]) -> bool {
        self.code.as_deref().is_some_and(|code| codes.contains(&code))
    }

    fn message_contains(&self, patterns: &[&str]) -> bool {
        patterns.iter().any(|pattern| self.message.contains(pattern))
    }

    fn matches(&self, codes: &[&str], patterns: &[&str]) -> bool {
        self.code_is(codes) || self.message_contains(patterns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(failure: ProviderFailure) -> ClassifiedError {
        ErrorClassifier::new().classify(&failure)
    }

    /// Validates credential failures are never retried.
    ///
    /// Assertions:
    /// - HTTP 401 and an "invalid api key" message both classify as credential errors.
    /// - Neither is retryable and both carry remediation text.
    #[test]
    fn test_credential_failures_not_retryable() {
        for failure in [
            ProviderFailure::http(401, "unauthorized"),
            ProviderFailure::new("Invalid API key provided: sk-****"),
            ProviderFailure::http(500, "upstream said invalid_api_key"),
        ] {
            let error = classify(failure);
            assert_eq!(error.kind, ErrorKind::InvalidCredential);
            assert!(!error.retryable);
            assert!(error.remediation.is_some());
        }
    }

    /// Validates rate limits are retryable with a populated hint.
    ///
    /// Assertions:
    /// - Missing `Retry-After` defaults to 60 seconds.
    /// - A provider-supplied hint wins over the default.
    #[test]
    fn test_rate_limit_retry_after() {
        let defaulted = classify(ProviderFailure::http(429, "slow down"));
        assert_eq!(defaulted.kind, ErrorKind::RateLimited);
        assert!(defaulted.retryable);
        assert_eq!(defaulted.retry_after, Some(Duration::from_secs(60)));

        let hinted = classify(ProviderFailure::http(429, "slow down").with_retry_after_header("7"));
        assert_eq!(hinted.retry_after, Some(Duration::from_secs(7)));

        let by_code = classify(ProviderFailure::new("busy").with_code("rate_limit_exceeded"));
        assert_eq!(by_code.kind, ErrorKind::RateLimited);
    }

    #[test]
    fn test_precedence_credential_before_rate_limit() {
        let error = classify(ProviderFailure::http(401, "rate limit reached for key"));
        assert_eq!(error.kind, ErrorKind::InvalidCredential);
    }

    #[test]
    fn test_quota_exceeded() {
        let by_code = classify(ProviderFailure::http(402, "payment").with_code("insufficient_quota"));
        assert_eq!(by_code.kind, ErrorKind::QuotaExceeded);
        assert!(!by_code.retryable);

        let by_message = classify(ProviderFailure::new("You exceeded your current quota"));
        assert_eq!(by_message.kind, ErrorKind::QuotaExceeded);
    }

    /// Validates transient infrastructure failures are retryable.
    #[test]
    fn test_transient_failures() {
        let unavailable = classify(ProviderFailure::http(503, "down").with_retry_after_header("3"));
        assert_eq!(unavailable.kind, ErrorKind::ServiceUnavailable);
        assert!(unavailable.retryable);
        assert_eq!(unavailable.retry_after, Some(Duration::from_secs(3)));

        let timeout =
            classify(ProviderFailure::transport(TransportErrorKind::TimedOut, "read timed out"));
        assert_eq!(timeout.kind, ErrorKind::Timeout);
        assert!(timeout.retryable);

        for kind in [
            TransportErrorKind::ConnectionRefused,
            TransportErrorKind::DnsFailure,
            TransportErrorKind::ConnectionReset,
        ] {
            let error = classify(ProviderFailure::transport(kind, "connect failed"));
            assert_eq!(error.kind, ErrorKind::NetworkFailure);
            assert!(error.retryable);
        }
    }

    /// Validates permanent request-shape failures.
    ///
    /// Assertions:
    /// - Plain 400 is an invalid request.
    /// - 400 with a content-policy code reports `ContentRejected`.
    /// - 413 and context-length codes report `PayloadTooLarge`.
    #[test]
    fn test_request_shape_failures() {
        assert_eq!(classify(ProviderFailure::http(400, "bad field")).kind, ErrorKind::InvalidRequest);

        let content =
            classify(ProviderFailure::http(400, "rejected").with_code("content_policy_violation"));
        assert_eq!(content.kind, ErrorKind::ContentRejected);
        assert!(!content.retryable);

        assert_eq!(classify(ProviderFailure::http(413, "big")).kind, ErrorKind::PayloadTooLarge);
        let context = classify(
            ProviderFailure::http(400, "This model's maximum context length is 8192 tokens"),
        );
        assert_eq!(context.kind, ErrorKind::PayloadTooLarge);
        assert!(!context.retryable);
    }

    /// Validates the fallback rule for unrecognized failures.
    ///
    /// Assertions:
    /// - 5xx and status-less failures are retryable.
    /// - Other 4xx failures are not.
    #[test]
    fn test_unknown_retryability() {
        let server = classify(ProviderFailure::http(502, "bad gateway"));
        assert_eq!(server.kind, ErrorKind::Unknown);
        assert!(server.retryable);

        let transport = classify(ProviderFailure::transport(TransportErrorKind::Other, "eof"));
        assert_eq!(transport.kind, ErrorKind::Unknown);
        assert!(transport.retryable);

        let not_found = classify(ProviderFailure::http(404, "no such model"));
        assert_eq!(not_found.kind, ErrorKind::Unknown);
        assert!(!not_found.retryable);
        assert_eq!(not_found.status, Some(404));
    }

    #[test]
    fn test_non_retryable_ignores_retry_after() {
        let error = classify(ProviderFailure::http(400, "bad").with_retry_after_header("5"));
        assert_eq!(error.retry_after, None);
    }
}
