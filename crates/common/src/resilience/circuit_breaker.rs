//! Circuit breaker state machine
//!
//! One breaker guards one logical service. State lives behind a single
//! `parking_lot::Mutex`, so concurrent callers agree on exactly when the
//! failure threshold is crossed. The lock is never held across an `.await`:
//! callers take a [`CallPermit`] with [`CircuitBreaker::try_acquire`], run
//! their operation unlocked, then hand the permit back to
//! [`CircuitBreaker::record`].
//!
//! Transitions:
//! - `Closed -> Open` after `failure_threshold` consecutive failures.
//! - `Open -> HalfOpen` lazily, on the first acquire after `timeout` has
//!   elapsed since the last failure. There is no background timer.
//! - `HalfOpen -> Closed` after `success_threshold` trial successes.
//! - `HalfOpen -> Open` on any trial failure.
//!
//! Every transition bumps a generation counter. Results carried by permits
//! from an older generation are discarded, which keeps a slow call from a
//! previous state from flipping the current one.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::clock::{Clock, SystemClock};
use super::error::{ConfigError, ConfigResult, ResilienceError, ResilienceResult};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed, allowing requests
    Closed,
    /// Circuit is open, rejecting requests
    Open,
    /// Circuit is half-open, allowing limited requests to test recovery
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

//==============================================================================
// Configuration
//==============================================================================

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Trial successes needed to close the circuit from half-open
    pub success_threshold: u32,
    /// Time to wait after the last failure before probing again
    pub timeout: Duration,
    /// Concurrent trial calls allowed while half-open
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(60),
            half_open_max_calls: 1,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration builder
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::invalid("failure_threshold must be greater than 0"));
        }
        if self.success_threshold == 0 {
            return Err(ConfigError::invalid("success_threshold must be greater than 0"));
        }
        if self.half_open_max_calls == 0 {
            return Err(ConfigError::invalid("half_open_max_calls must be greater than 0"));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::invalid("timeout must be greater than 0"));
        }
        Ok(())
    }
}

/// Builder for CircuitBreakerConfig
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    /// Builder seeded with the default thresholds
    pub fn new() -> Self {
        Self::default()
    }

    /// Consecutive failures that open the circuit
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    /// Consecutive trial successes that close it again
    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.config.success_threshold = threshold;
        self
    }

    /// How long the circuit stays open before a trial call
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Trial calls admitted while half-open
    pub fn half_open_max_calls(mut self, max_calls: u32) -> Self {
        self.config.half_open_max_calls = max_calls;
        self
    }

    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

//==============================================================================
// Permits, Results & Metrics
//==============================================================================

/// Rejection returned while the circuit is open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("circuit open, retry in {retry_after:?}")]
pub struct CircuitOpenError {
    /// Time until the breaker will admit a probe
    pub retry_after: Duration,
}

/// Admission ticket handed out by [`CircuitBreaker::try_acquire`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a permit must be returned through CircuitBreaker::record"]
pub struct CallPermit {
    trial: bool,
    generation: u64,
}

impl CallPermit {
    /// Whether this call is a half-open recovery probe
    pub const fn is_trial(&self) -> bool {
        self.trial
    }
}

/// How a permitted call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallResult {
    Success,
    Failure,
    /// Neither success nor failure (e.g. the caller cancelled)
    Ignored,
}

/// A state change produced by acquiring, recording or resetting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: CircuitState,
    pub to: CircuitState,
}

/// Circuit breaker metrics for monitoring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub half_open_successes: u32,
    pub half_open_in_flight: u32,
    /// Calls admitted since creation
    pub total_calls: u64,
    /// Calls rejected while open
    pub rejected_calls: u64,
    pub time_in_state: Duration,
    pub since_last_failure: Option<Duration>,
}

#[derive(Debug)]
struct BreakerCore {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    half_open_in_flight: u32,
    last_failure_at: Option<Instant>,
    state_changed_at: Instant,
    generation: u64,
}

impl BreakerCore {
    fn new(now: Instant) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            half_open_successes: 0,
            half_open_in_flight: 0,
            last_failure_at: None,
            state_changed_at: now,
            generation: 0,
        }
    }

    fn transition(&mut self, to: CircuitState, now: Instant) -> Transition {
        let from = self.state;
        self.state = to;
        self.state_changed_at = now;
        self.generation = self.generation.wrapping_add(1);
        self.half_open_successes = 0;
        self.half_open_in_flight = 0;
        Transition { from, to }
    }
}

//==============================================================================
// Circuit Breaker
//==============================================================================

/// Per-service circuit breaker
pub struct CircuitBreaker<C: Clock = SystemClock> {
    name: String,
    config: RwLock<CircuitBreakerConfig>,
    core: Mutex<BreakerCore>,
    total_calls: AtomicU64,
    rejected_calls: AtomicU64,
    clock: Arc<C>,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.core.lock();
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &core.state)
            .field("consecutive_failures", &core.consecutive_failures)
            .field("generation", &core.generation)
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a new circuit breaker using the system clock
    pub fn new(config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a new circuit breaker with a custom clock (useful for testing)
    pub fn with_clock(config: CircuitBreakerConfig, clock: C) -> ConfigResult<Self> {
        Self::with_shared_clock(config, Arc::new(clock))
    }

    /// Create a breaker sharing a clock with other components
    pub fn with_shared_clock(config: CircuitBreakerConfig, clock: Arc<C>) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self::from_validated(config, clock))
    }

    pub(crate) fn from_validated(config: CircuitBreakerConfig, clock: Arc<C>) -> Self {
        let now = clock.now();
        Self {
            name: String::from("default"),
            config: RwLock::new(config),
            core: Mutex::new(BreakerCore::new(now)),
            total_calls: AtomicU64::new(0),
            rejected_calls: AtomicU64::new(0),
            clock,
        }
    }

    /// Attach a name used in log events
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> CircuitBreakerConfig {
        self.config.read().clone()
    }

    /// Replace thresholds and timeout; current state is retained
    pub fn update_config(&self, config: CircuitBreakerConfig) -> ConfigResult<()> {
        config.validate()?;
        *self.config.write() = config;
        Ok(())
    }

    /// Ask for admission
    ///
    /// Open circuits whose timeout has elapsed move to half-open here, so the
    /// first caller after the cooldown becomes the probe. A half-open circuit
    /// whose probes never reported back within `timeout` admits a fresh probe.
    pub fn try_acquire(&self) -> Result<CallPermit, CircuitOpenError> {
        let config = self.config.read().clone();
        let now = self.clock.now();
        let mut core = self.core.lock();

        if core.state == CircuitState::Open {
            let opened_at = core.last_failure_at.unwrap_or(core.state_changed_at);
            let elapsed = now.saturating_duration_since(opened_at);
            if elapsed < config.timeout {
                drop(core);
                self.rejected_calls.fetch_add(1, Ordering::Relaxed);
                return Err(CircuitOpenError { retry_after: config.timeout - elapsed });
            }
            core.transition(CircuitState::HalfOpen, now);
            info!(service_id = %self.name, "circuit_half_open");
        }

        let permit = if core.state == CircuitState::Closed {
            CallPermit { trial: false, generation: core.generation }
        } else {
            if core.half_open_in_flight >= config.half_open_max_calls {
                let waited = now.saturating_duration_since(core.state_changed_at);
                if waited < config.timeout {
                    drop(core);
                    self.rejected_calls.fetch_add(1, Ordering::Relaxed);
                    return Err(CircuitOpenError { retry_after: config.timeout - waited });
                }
                debug!(service_id = %self.name, "circuit_half_open_probe_stale");
                core.half_open_in_flight = 0;
                core.state_changed_at = now;
            }
            core.half_open_in_flight += 1;
            CallPermit { trial: true, generation: core.generation }
        };
        drop(core);

        self.total_calls.fetch_add(1, Ordering::Relaxed);
        Ok(permit)
    }

    /// Report the end of a permitted call
    ///
    /// Returns the transition it caused, if any. Permits issued before the
    /// most recent transition are ignored.
    pub fn record(&self, permit: CallPermit, result: CallResult) -> Option<Transition> {
        let config = self.config.read().clone();
        let now = self.clock.now();
        let mut core = self.core.lock();

        if permit.generation != core.generation {
            debug!(service_id = %self.name, "circuit_stale_result_ignored");
            return None;
        }

        if permit.trial {
            core.half_open_in_flight = core.half_open_in_flight.saturating_sub(1);
        }

        match (core.state, result) {
            (_, CallResult::Ignored) | (CircuitState::Open, _) => None,
            (CircuitState::Closed, CallResult::Success) => {
                core.consecutive_failures = 0;
                None
            }
            (CircuitState::Closed, CallResult::Failure) => {
                core.consecutive_failures = core.consecutive_failures.saturating_add(1);
                core.last_failure_at = Some(now);
                if core.consecutive_failures >= config.failure_threshold {
                    let failures = core.consecutive_failures;
                    let transition = core.transition(CircuitState::Open, now);
                    warn!(service_id = %self.name, failures, "circuit_opened");
                    Some(transition)
                } else {
                    None
                }
            }
            (CircuitState::HalfOpen, CallResult::Success) => {
                core.half_open_successes += 1;
                if core.half_open_successes >= config.success_threshold {
                    let successes = core.half_open_successes;
                    let transition = core.transition(CircuitState::Closed, now);
                    core.consecutive_failures = 0;
                    core.last_failure_at = None;
                    info!(service_id = %self.name, successes, "circuit_closed");
                    Some(transition)
                } else {
                    None
                }
            }
            (CircuitState::HalfOpen, CallResult::Failure) => {
                core.consecutive_failures = core.consecutive_failures.saturating_add(1);
                core.last_failure_at = Some(now);
                let transition = core.transition(CircuitState::Open, now);
                warn!(service_id = %self.name, "circuit_reopened_from_half_open");
                Some(transition)
            }
        }
    }

    /// Execute an operation with circuit breaker protection
    ///
    /// Every `Err` counts as a failure. Callers that need finer control over
    /// what counts use [`try_acquire`](Self::try_acquire) and
    /// [`record`](Self::record) directly.
    #[instrument(skip(self, operation), fields(service_id = %self.name))]
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self
            .try_acquire()
            .map_err(|open| ResilienceError::CircuitOpen { retry_after: open.retry_after })?;

        match operation().await {
            Ok(value) => {
                self.record(permit, CallResult::Success);
                Ok(value)
            }
            Err(error) => {
                self.record(permit, CallResult::Failure);
                Err(ResilienceError::OperationFailed { error })
            }
        }
    }

    /// Current state without triggering the lazy open-to-half-open check
    pub fn state(&self) -> CircuitState {
        self.core.lock().state
    }

    /// Snapshot of counters for monitoring
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let now = self.clock.now();
        let core = self.core.lock();
        CircuitBreakerMetrics {
            state: core.state,
            consecutive_failures: core.consecutive_failures,
            half_open_successes: core.half_open_successes,
            half_open_in_flight: core.half_open_in_flight,
            total_calls: self.total_calls.load(Ordering::Relaxed),
            rejected_calls: self.rejected_calls.load(Ordering::Relaxed),
            time_in_state: now.saturating_duration_since(core.state_changed_at),
            since_last_failure: core.last_failure_at.map(|at| now.saturating_duration_since(at)),
        }
    }

    /// Force the breaker closed and clear its counters
    ///
    /// Idempotent. Returns the transition when the state actually changed.
    pub fn reset(&self) -> Option<Transition> {
        let now = self.clock.now();
        let mut core = self.core.lock();
        let previous = core.state;
        core.transition(CircuitState::Closed, now);
        core.consecutive_failures = 0;
        core.last_failure_at = None;
        drop(core);

        info!(service_id = %self.name, from = %previous, "circuit_reset");
        (previous != CircuitState::Closed)
            .then_some(Transition { from: previous, to: CircuitState::Closed })
    }
}
