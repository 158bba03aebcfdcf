//! Error types shared by the resilience primitives

use std::time::Duration;

use thiserror::Error;

pub use crate::error::{ConfigError, ConfigResult};

/// Errors that can occur in circuit-protected operations
///
/// Generic over the underlying operation error type `E` so the original
/// failure is preserved untouched.
#[derive(Debug, Error)]
pub enum ResilienceError<E> {
    /// Circuit breaker is open, rejecting calls
    #[error("Circuit breaker is open, retry in {retry_after:?}")]
    CircuitOpen { retry_after: Duration },

    /// The underlying operation failed
    #[error("Operation failed: {error}")]
    OperationFailed { error: E },
}

/// Result type for resilience operations
pub type ResilienceResult<T, E> = Result<T, ResilienceError<E>>;
