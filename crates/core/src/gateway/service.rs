//! Gateway facade
//!
//! One [`Gateway`] owns the circuit registry, the fallback orchestrator with
//! its response cache, and the usage tracker. Construct it once per process
//! (or per tenant) and share it behind an `Arc`.
//!
//! ```text
//! reserve quota ──► circuit permit ──► cache ──► candidates (retry each) ──► commit usage
//!      │ denied           │ open                         │ all failed
//!      ▼                  ▼                              ▼
//!   Denied           CircuitOpen                Degraded / Failed
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use promptgate_common::resilience::{
    CallPermit, CallResult, CircuitBreaker, CircuitBreakerRegistry, CircuitState, ConfigResult, RetryExecutor,
    Transition,
};
use promptgate_common::{Clock, SystemClock};
use promptgate_domain::{GatewayConfig, GatewayError, UsagePeriod, UsageRecord};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn, Span};

use super::health::{GatewayHealth, ServiceHealth};
use super::request::{Execution, ExecutionRequest, ResponseSource};
use crate::fallback::{FallbackOrchestrator, FallbackOutcome, Operation};
use crate::ports::{EventSink, GatewayEvent, NullEventSink};
use crate::settings::{breaker_config, cache_config, retry_policy, tracker_settings};
use crate::usage::{Reservation, UsageTracker};

//==============================================================================
// Builder
//==============================================================================

/// Builder for [`Gateway`]
pub struct GatewayBuilder<C: Clock = SystemClock> {
    config: GatewayConfig,
    events: Arc<dyn EventSink>,
    clock: Arc<C>,
}

impl Default for GatewayBuilder<SystemClock> {
    fn default() -> Self {
        Self {
            config: GatewayConfig::default(),
            events: Arc::new(NullEventSink),
            clock: Arc::new(SystemClock),
        }
    }
}

impl<C: Clock> GatewayBuilder<C> {
    #[must_use]
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Drive every time-dependent component from `clock`
    pub fn clock<C2: Clock>(self, clock: Arc<C2>) -> GatewayBuilder<C2> {
        GatewayBuilder { config: self.config, events: self.events, clock }
    }

    /// Validate the configuration and assemble the gateway
    pub fn build(self) -> ConfigResult<Gateway<C>> {
        let Self { config, events, clock } = self;
        config.validate()?;

        let retry = RetryExecutor::new(retry_policy(&config.retry)?)?;
        let breakers = CircuitBreakerRegistry::with_clock(
            breaker_config(&config.circuit_breaker)?,
            Arc::clone(&clock),
        )?;
        let fallback = FallbackOrchestrator::with_clock(
            config.fallback.clone(),
            config.degradation.clone(),
            Arc::clone(&clock),
        )?;
        let usage = Arc::new(
            UsageTracker::with_clock(tracker_settings(&config), Arc::clone(&clock))
                .with_event_sink(Arc::clone(&events)),
        );

        Ok(Gateway {
            config: RwLock::new(config),
            retry: RwLock::new(Arc::new(retry)),
            breakers,
            fallback,
            usage,
            events,
            clock,
        })
    }
}

//==============================================================================
// Gateway
//==============================================================================

/// Resilient, quota-governed execution of provider calls
pub struct Gateway<C: Clock = SystemClock> {
    config: RwLock<GatewayConfig>,
    retry: RwLock<Arc<RetryExecutor>>,
    breakers: CircuitBreakerRegistry<C>,
    fallback: FallbackOrchestrator<C>,
    usage: Arc<UsageTracker<C>>,
    events: Arc<dyn EventSink>,
    clock: Arc<C>,
}

impl<C: Clock> std::fmt::Debug for Gateway<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("breakers", &self.breakers)
            .field("fallback", &self.fallback)
            .field("usage", &self.usage)
            .finish_non_exhaustive()
    }
}

impl Gateway<SystemClock> {
    /// Builder with default configuration and no event sink
    pub fn builder() -> GatewayBuilder<SystemClock> {
        GatewayBuilder::default()
    }

    /// Gateway on the system clock with no event sink
    pub fn new(config: GatewayConfig) -> ConfigResult<Self> {
        Self::builder().config(config).build()
    }
}

impl<C: Clock> Gateway<C> {
    /// Run `primary`, then `fallbacks` in order, under every protective layer
    ///
    /// Quota denial, an open circuit and cancellation come back as distinct
    /// [`GatewayError`] variants. When every candidate fails the result is
    /// either [`Execution::Degraded`] or [`GatewayError::Failed`], depending
    /// on `fallback.degrade_gracefully`.
    #[instrument(
        skip_all,
        fields(operation_id = %request.operation_id, service_id = tracing::field::Empty)
    )]
    pub async fn execute<T>(
        &self,
        request: ExecutionRequest<T>,
        primary: Operation<T>,
        fallbacks: Vec<Operation<T>>,
        cancel: &CancellationToken,
    ) -> Result<Execution<T>, GatewayError>
    where
        T: Serialize + DeserializeOwned + Send,
    {
        let service_id = request.service_id();
        Span::current().record("service_id", service_id.as_str());

        let retry = self.retry_for(&request)?;

        let reservation = self.usage.reserve(request.estimated_tokens, &request.model)?;

        let breaker = self.breakers.get_or_create(&service_id);
        let permit = match breaker.try_acquire() {
            Ok(permit) => permit,
            Err(open) => {
                self.usage.release(reservation);
                let retry_after_ms = u64::try_from(open.retry_after.as_millis()).unwrap_or(u64::MAX);
                debug!(retry_after_ms, "circuit_rejected");
                return Err(GatewayError::CircuitOpen { service_id, retry_after: open.retry_after });
            }
        };

        let started = self.clock.now();
        let mut candidates = Vec::with_capacity(fallbacks.len() + 1);
        candidates.push(primary);
        candidates.extend(fallbacks);

        let outcome = self.fallback.execute(&request.operation_id, candidates, &retry, cancel).await;
        let elapsed = self.clock.now().saturating_duration_since(started);
        let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

        match outcome {
            FallbackOutcome::Cached(value) => {
                self.record_circuit(&breaker, permit, CallResult::Ignored);
                self.usage.release(reservation);
                Ok(Execution::Completed { value, source: ResponseSource::Cache, attempts: 0 })
            }
            FallbackOutcome::Completed { value, candidate, attempts } => {
                self.record_circuit(&breaker, permit, CallResult::Success);
                let tokens = request.usage_of(&value);
                let cost = self.usage.calculate_cost(&request.model, &tokens);
                let record = self.usage_record(&request, duration_ms).with_usage(tokens.total(), cost);
                self.usage.commit(reservation, record);

                let source = match candidate {
                    0 => ResponseSource::Primary,
                    n => ResponseSource::Fallback { index: n - 1 },
                };
                Ok(Execution::Completed { value, source, attempts })
            }
            FallbackOutcome::Degraded { payload, error, attempts } => {
                self.record_circuit(&breaker, permit, CallResult::Failure);
                self.commit_failure(reservation, &request, duration_ms);
                self.events.emit(GatewayEvent::Degraded {
                    operation_id: request.operation_id.clone(),
                    kind: error.kind,
                });
                Ok(Execution::Degraded { payload, error, attempts })
            }
            FallbackOutcome::Failed { error, attempts } => {
                self.record_circuit(&breaker, permit, CallResult::Failure);
                self.commit_failure(reservation, &request, duration_ms);
                warn!(kind = %error.kind, attempts, "execution_failed");
                Err(GatewayError::Failed(error))
            }
            FallbackOutcome::Cancelled { attempts } => {
                self.record_circuit(&breaker, permit, CallResult::Ignored);
                if attempts > 0 {
                    self.commit_failure(reservation, &request, duration_ms);
                } else {
                    self.usage.release(reservation);
                }
                Err(GatewayError::Cancelled { attempts })
            }
        }
    }

    fn retry_for<T>(&self, request: &ExecutionRequest<T>) -> Result<Arc<RetryExecutor>, GatewayError> {
        match request.retry_override() {
            Some(settings) => retry_policy(settings)
                .and_then(RetryExecutor::new)
                .map(Arc::new)
                .map_err(|error| GatewayError::Configuration(error.to_string())),
            None => Ok(Arc::clone(&self.retry.read())),
        }
    }

    fn usage_record<T>(&self, request: &ExecutionRequest<T>, duration_ms: u64) -> UsageRecord {
        UsageRecord::new(
            request.provider.clone(),
            request.model.clone(),
            request.operation_id.clone(),
            DateTime::<Utc>::from(self.clock.system_time()),
        )
        .with_duration_ms(duration_ms)
        .with_user(request.user_id.clone())
        .with_org(request.org_id.clone())
    }

    /// Failed calls count as a request with no tokens and no cost
    fn commit_failure<T>(&self, reservation: Reservation, request: &ExecutionRequest<T>, duration_ms: u64) {
        let record = self.usage_record(request, duration_ms).failed();
        self.usage.commit(reservation, record);
    }

    fn record_circuit(&self, breaker: &CircuitBreaker<C>, permit: CallPermit, result: CallResult) {
        if let Some(transition) = breaker.record(permit, result) {
            self.emit_transition(breaker.name(), transition);
        }
    }

    fn emit_transition(&self, service_id: &str, transition: Transition) {
        match transition.to {
            CircuitState::Open => {
                let consecutive_failures = self
                    .breakers
                    .get(service_id)
                    .map_or(0, |breaker| breaker.metrics().consecutive_failures);
                self.events.emit(GatewayEvent::CircuitOpened {
                    service_id: service_id.to_string(),
                    consecutive_failures,
                });
            }
            CircuitState::Closed => {
                self.events.emit(GatewayEvent::CircuitClosed { service_id: service_id.to_string() });
            }
            CircuitState::HalfOpen => {}
        }
    }

    //--------------------------------------------------------------------------
    // Operator surface
    //--------------------------------------------------------------------------

    /// Validate and apply a new configuration
    ///
    /// Circuit state, cache entries and the usage ledger are kept. The cache
    /// size bound is fixed at construction; everything else takes effect for
    /// subsequent calls.
    pub fn update_config(&self, config: GatewayConfig) -> ConfigResult<()> {
        config.validate()?;
        let retry = RetryExecutor::new(retry_policy(&config.retry)?)?;
        let breaker = breaker_config(&config.circuit_breaker)?;
        cache_config(&config.fallback)?;

        self.breakers.update_config(breaker)?;
        self.fallback.update(config.fallback.clone(), config.degradation.clone())?;
        self.usage.update_settings(tracker_settings(&config));
        *self.retry.write() = Arc::new(retry);
        *self.config.write() = config;
        info!("gateway_config_updated");
        Ok(())
    }

    pub fn config(&self) -> GatewayConfig {
        self.config.read().clone()
    }

    /// Force `service_id` closed; idempotent
    pub fn reset_circuit(&self, service_id: &str) -> Option<Transition> {
        let transition = self.breakers.reset(service_id);
        if let Some(transition) = transition {
            info!(service_id, from = %transition.from, "circuit_reset");
            self.emit_transition(service_id, transition);
        }
        transition
    }

    /// Force every known circuit closed
    pub fn reset_all_circuits(&self) -> usize {
        let transitions = self.breakers.reset_all();
        for (service_id, transition) in &transitions {
            self.emit_transition(service_id, *transition);
        }
        transitions.len()
    }

    pub fn circuit_state(&self, service_id: &str) -> Option<CircuitState> {
        self.breakers.get(service_id).map(|breaker| breaker.state())
    }

    pub fn clear_cache(&self) {
        self.fallback.clear_cache();
    }

    /// Drop expired cache entries; returns how many were removed
    pub fn purge_expired_cache(&self) -> usize {
        self.fallback.purge_expired()
    }

    /// Shared handle to the usage ledger, for persistence and reporting
    pub fn usage(&self) -> Arc<UsageTracker<C>> {
        Arc::clone(&self.usage)
    }

    pub fn health(&self) -> GatewayHealth {
        let services = self
            .breakers
            .snapshot()
            .into_iter()
            .map(|(service_id, metrics)| ServiceHealth::from_metrics(service_id, &metrics))
            .collect();

        GatewayHealth {
            services,
            cache: self.fallback.cache_stats(),
            daily: self.usage.check_quota(UsagePeriod::Daily),
            monthly: self.usage.check_quota(UsagePeriod::Monthly),
        }
    }
}
