//! Raw provider failures, before classification

use std::fmt;
use std::io;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transport-level failure categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    TimedOut,
    ConnectionRefused,
    DnsFailure,
    ConnectionReset,
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::TimedOut => "timed_out",
            Self::ConnectionRefused => "connection_refused",
            Self::DnsFailure => "dns_failure",
            Self::ConnectionReset => "connection_reset",
            Self::Other => "other",
        };
        f.write_str(label)
    }
}

/// What an operation reports when it fails
///
/// Any combination of fields may be present: an HTTP status, a
/// provider-specific error code, a transport category and a `Retry-After`
/// hint. The classifier reads all of them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProviderFailure {
    pub status: Option<u16>,
    pub code: Option<String>,
    pub transport: Option<TransportErrorKind>,
    pub message: String,
    pub retry_after: Option<Duration>,
}

impl ProviderFailure {
    /// Failure with only a message (no status, no transport category)
    pub fn new(message: impl Into<String>) -> Self {
        Self { status: None, code: None, transport: None, message: message.into(), retry_after: None }
    }

    /// HTTP response with a non-success status
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self { status: Some(status), ..Self::new(message) }
    }

    /// Connection-level failure with no response
    pub fn transport(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self { transport: Some(kind), ..Self::new(message) }
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    #[must_use]
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// Parse a `Retry-After` header given in whole seconds
    ///
    /// Unparseable values are ignored.
    #[must_use]
    pub fn with_retry_after_header(mut self, header: &str) -> Self {
        if let Ok(seconds) = header.trim().parse::<u64>() {
            self.retry_after = Some(Duration::from_secs(seconds));
        }
        self
    }
}

impl From<io::Error> for ProviderFailure {
    fn from(error: io::Error) -> Self {
        let kind = match error.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportErrorKind::TimedOut,
            io::ErrorKind::ConnectionRefused => TransportErrorKind::ConnectionRefused,
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => TransportErrorKind::ConnectionReset,
            _ => TransportErrorKind::Other,
        };
        Self::transport(kind, error.to_string())
    }
}
