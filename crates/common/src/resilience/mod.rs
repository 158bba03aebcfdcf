//! Resilience patterns for fault tolerance
//!
//! This module provides **generic, reusable** building blocks:
//! - **Clock**: time abstraction with a controllable [`MockClock`]
//! - **Retry Executor**: exponential backoff with ±25% jitter, driven by
//!   [`ErrorClassification`](crate::error::ErrorClassification), cancellable
//! - **Circuit Breaker**: closed/open/half-open state machine with lazy
//!   recovery probes
//! - **Registry**: sharded map of breakers keyed by service id
//!
//! None of these know what they protect. The gateway crates decide what a
//! failure is and which service a call belongs to.

pub mod circuit_breaker;
pub mod clock;
pub mod error;
pub mod registry;
pub mod retry;

pub use circuit_breaker::{
    CallPermit, CallResult, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder,
    CircuitBreakerMetrics, CircuitOpenError, CircuitState, Transition,
};
pub use clock::{Clock, MockClock, SystemClock};
pub use error::{ConfigError, ConfigResult, ResilienceError, ResilienceResult};
pub use registry::CircuitBreakerRegistry;
pub use retry::{
    RetryError, RetryExecutor, RetryOutcome, RetryPolicy, RetryPolicyBuilder, RetryResult,
};
