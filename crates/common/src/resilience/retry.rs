//! Retry executor with exponential backoff and jitter
//!
//! The executor is stateless per call: every invocation carries its own
//! attempt counter, so a single [`RetryExecutor`] can be shared by any number
//! of concurrent callers. Whether a failure is worth another attempt is
//! decided by the error itself through [`ErrorClassification`].
//!
//! Backoff sleeps and operation attempts both race a
//! [`CancellationToken`]; cancellation stops the loop and is reported as
//! [`RetryError::Cancelled`], never as an operation failure.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::error::{ConfigError, ConfigResult};
use crate::error::ErrorClassification;

/// Lower and upper bound of the uniform jitter factor (±25%).
const JITTER_RANGE: (f64, f64) = (0.75, 1.25);

//==============================================================================
// Errors & Outcome
//==============================================================================

/// Errors that can occur during retry operations
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// All retry attempts have been exhausted
    #[error("All retry attempts exhausted after {attempts} tries: {last_error}")]
    Exhausted { attempts: u32, last_error: E },

    /// The operation failed with a non-retryable error
    #[error("Operation failed with non-retryable error after {attempts} tries: {error}")]
    NonRetryable { attempts: u32, error: E },

    /// The caller cancelled before the operation succeeded
    #[error("Retry loop cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

impl<E> RetryError<E> {
    /// The last operation error, if the loop ended on one
    pub fn last_error(&self) -> Option<&E> {
        match self {
            Self::Exhausted { last_error, .. } => Some(last_error),
            Self::NonRetryable { error, .. } => Some(error),
            Self::Cancelled { .. } => None,
        }
    }

    /// Consume the error and return the last operation error
    pub fn into_last_error(self) -> Option<E> {
        match self {
            Self::Exhausted { last_error, .. } => Some(last_error),
            Self::NonRetryable { error, .. } => Some(error),
            Self::Cancelled { .. } => None,
        }
    }

    /// Whether the loop stopped because of cancellation
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Result type for retry operations
pub type RetryResult<T, E> = Result<T, RetryError<E>>;

/// Outcome of a retry execution including result and summary statistics.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: RetryResult<T, E>,
    /// Number of times the operation was invoked
    pub attempts: u32,
    /// Sum of backoff sleeps actually taken
    pub total_delay: Duration,
}

impl<T, E> RetryOutcome<T, E> {
    /// Consume the outcome and return only the result.
    pub fn into_result(self) -> RetryResult<T, E> {
        self.result
    }
}

//==============================================================================
// Policy
//==============================================================================

/// Retry budget and backoff shape
///
/// Invariants enforced by [`RetryPolicy::validate`]: `max_attempts >= 1`,
/// `max_delay >= initial_delay > 0`, `backoff_multiplier >= 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter_enabled: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            backoff_multiplier: 2.0,
            jitter_enabled: true,
        }
    }
}

impl RetryPolicy {
    /// Create a policy builder starting from the defaults
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("max_attempts must be at least 1"));
        }
        if self.initial_delay.is_zero() {
            return Err(ConfigError::invalid("initial_delay must be greater than 0"));
        }
        if self.max_delay < self.initial_delay {
            return Err(ConfigError::invalid("max_delay must be >= initial_delay"));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::invalid("backoff_multiplier must be a finite value >= 1.0"));
        }
        Ok(())
    }

    /// Deterministic backoff for a 1-based attempt number
    ///
    /// `min(max_delay, initial_delay * backoff_multiplier^(attempt - 1))`
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let initial_ms = self.initial_delay.as_secs_f64() * 1000.0;
        let max_ms = self.max_delay.as_secs_f64() * 1000.0;
        let raw_ms = initial_ms * self.backoff_multiplier.powi(exponent);
        let clamped_ms = if raw_ms.is_finite() { raw_ms.min(max_ms) } else { max_ms };
        Duration::from_secs_f64(clamped_ms / 1000.0)
    }

    /// Backoff for `attempt` with jitter applied when enabled
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.backoff_delay(attempt);
        if self.jitter_enabled {
            let factor = rand::thread_rng().gen_range(JITTER_RANGE.0..=JITTER_RANGE.1);
            delay.mul_f64(factor)
        } else {
            delay
        }
    }

    /// Un-jittered delays for attempts `1..=attempts`
    pub fn delay_sequence(&self, attempts: u32) -> Vec<Duration> {
        (1..=attempts).map(|attempt| self.backoff_delay(attempt)).collect()
    }
}

/// Builder for RetryPolicy with fluent API
#[derive(Debug, Default)]
pub struct RetryPolicyBuilder {
    policy: RetryPolicy,
}

impl RetryPolicyBuilder {
    /// Builder seeded with the default policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Total attempts, including the first
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.policy.max_attempts = attempts;
        self
    }

    /// Delay before the first retry
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.policy.initial_delay = delay;
        self
    }

    /// Upper bound on any single backoff
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.policy.max_delay = delay;
        self
    }

    /// Growth factor applied per attempt
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.policy.backoff_multiplier = multiplier;
        self
    }

    /// Randomize each delay to spread out retries
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.policy.jitter_enabled = enabled;
        self
    }

    pub fn build(self) -> ConfigResult<RetryPolicy> {
        self.policy.validate()?;
        Ok(self.policy)
    }
}

//==============================================================================
// Executor
//==============================================================================

/// Runs an operation under a [`RetryPolicy`]
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    /// Create an executor from a validated policy
    pub fn new(policy: RetryPolicy) -> ConfigResult<Self> {
        policy.validate()?;
        Ok(Self { policy })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute `operation` until it succeeds, fails permanently, exhausts the
    /// attempt budget or `cancel` fires.
    ///
    /// A provider-supplied `retry_after` replaces the computed backoff. The
    /// last attempt and non-retryable failures return without sleeping.
    #[instrument(
        skip(self, operation, cancel),
        fields(max_attempts = self.policy.max_attempts)
    )]
    pub async fn execute<F, Fut, T, E>(
        &self,
        label: &str,
        mut operation: F,
        cancel: &CancellationToken,
    ) -> RetryOutcome<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ErrorClassification + fmt::Display,
    {
        let mut total_delay = Duration::ZERO;
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return RetryOutcome {
                    result: Err(RetryError::Cancelled { attempts: attempt }),
                    attempts: attempt,
                    total_delay,
                };
            }

            attempt += 1;
            debug!(attempt, "retry_attempt_started");

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!(attempt, "retry_attempt_cancelled");
                    return RetryOutcome {
                        result: Err(RetryError::Cancelled { attempts: attempt }),
                        attempts: attempt,
                        total_delay,
                    };
                }
                result = operation() => result,
            };

            let error = match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "retry_succeeded_after_failures");
                    }
                    return RetryOutcome { result: Ok(value), attempts: attempt, total_delay };
                }
                Err(error) => error,
            };

            if !error.is_retryable() {
                warn!(attempt, severity = %error.severity(), error = %error, "retry_non_retryable");
                return RetryOutcome {
                    result: Err(RetryError::NonRetryable { attempts: attempt, error }),
                    attempts: attempt,
                    total_delay,
                };
            }

            if attempt >= self.policy.max_attempts {
                warn!(attempt, error = %error, "retry_exhausted");
                return RetryOutcome {
                    result: Err(RetryError::Exhausted { attempts: attempt, last_error: error }),
                    attempts: attempt,
                    total_delay,
                };
            }

            let delay =
                error.retry_after().unwrap_or_else(|| self.policy.delay_for_attempt(attempt));
            debug!(
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "retry_backoff"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!(attempt, "retry_backoff_cancelled");
                    return RetryOutcome {
                        result: Err(RetryError::Cancelled { attempts: attempt }),
                        attempts: attempt,
                        total_delay,
                    };
                }
                () = tokio::time::sleep(delay) => {}
            }
            total_delay += delay;
        }
    }
}
