//! Lazily populated map of circuit breakers keyed by service id
//!
//! Backed by a `DashMap`, so breakers for unrelated services never contend on
//! a shared lock. All breakers share one clock and one configuration.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::debug;

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, Transition};
use super::clock::{Clock, SystemClock};
use super::error::ConfigResult;

/// Per-service circuit breakers
pub struct CircuitBreakerRegistry<C: Clock = SystemClock> {
    breakers: DashMap<String, Arc<CircuitBreaker<C>>>,
    config: RwLock<CircuitBreakerConfig>,
    clock: Arc<C>,
}

impl<C: Clock> std::fmt::Debug for CircuitBreakerRegistry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreakerRegistry")
            .field("services", &self.breakers.len())
            .field("config", &*self.config.read())
            .finish()
    }
}

impl CircuitBreakerRegistry<SystemClock> {
    /// Registry on the system clock
    pub fn new(config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }
}

impl<C: Clock> CircuitBreakerRegistry<C> {
    /// Registry whose breakers share `clock`
    ///
    /// # Errors
    /// Returns a configuration error if `config` is invalid.
    pub fn with_clock(config: CircuitBreakerConfig, clock: Arc<C>) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self { breakers: DashMap::new(), config: RwLock::new(config), clock })
    }

    /// Breaker for `service_id`, created closed on first use
    pub fn get_or_create(&self, service_id: &str) -> Arc<CircuitBreaker<C>> {
        if let Some(existing) = self.breakers.get(service_id) {
            return Arc::clone(existing.value());
        }

        // Lock order is config, then map shard; `update_config` follows it too
        let config = self.config.read();
        let entry = self.breakers.entry(service_id.to_string()).or_insert_with(|| {
            debug!(service_id, "circuit_created");
            let breaker = CircuitBreaker::from_validated(config.clone(), Arc::clone(&self.clock));
            Arc::new(breaker.named(service_id))
        });
        Arc::clone(entry.value())
    }

    /// Existing breaker, without creating one
    pub fn get(&self, service_id: &str) -> Option<Arc<CircuitBreaker<C>>> {
        self.breakers.get(service_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Force `service_id` closed; creates the entry when absent
    pub fn reset(&self, service_id: &str) -> Option<Transition> {
        self.get_or_create(service_id).reset()
    }

    /// Force every known breaker closed
    pub fn reset_all(&self) -> Vec<(String, Transition)> {
        self.breakers
            .iter()
            .filter_map(|entry| entry.value().reset().map(|t| (entry.key().clone(), t)))
            .collect()
    }

    /// Apply a new configuration to existing and future breakers
    ///
    /// Holds the config write lock for the whole update, so no breaker can be
    /// created from the old configuration once this has started.
    pub fn update_config(&self, config: CircuitBreakerConfig) -> ConfigResult<()> {
        config.validate()?;
        let mut current = self.config.write();
        for entry in &self.breakers {
            entry.value().update_config(config.clone())?;
        }
        *current = config;
        Ok(())
    }

    /// Metrics for every known breaker, sorted by service id
    pub fn snapshot(&self) -> Vec<(String, CircuitBreakerMetrics)> {
        let mut all: Vec<_> = self
            .breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().metrics()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::resilience::circuit_breaker::{CallResult, CircuitState};
    use crate::resilience::clock::MockClock;

    fn registry() -> (CircuitBreakerRegistry<MockClock>, Arc<MockClock>) {
        let clock = Arc::new(MockClock::new());
        let config = CircuitBreakerConfig::builder()
            .failure_threshold(2)
            .timeout(Duration::from_secs(10))
            .build()
            .expect("config");
        (CircuitBreakerRegistry::with_clock(config, Arc::clone(&clock)).expect("registry"), clock)
    }

    fn trip(registry: &CircuitBreakerRegistry<MockClock>, service_id: &str) {
        let breaker = registry.get_or_create(service_id);
        for _ in 0..2 {
            let permit = breaker.try_acquire().expect("admitted");
            breaker.record(permit, CallResult::Failure);
        }
    }

    /// Validates breakers are independent per key.
    ///
    /// Assertions:
    /// - Tripping one service leaves the other closed.
    /// - The same key always returns the same breaker.
    #[test]
    fn test_services_are_isolated() {
        let (registry, _clock) = registry();
        trip(&registry, "openai:gpt-4o");

        assert_eq!(registry.get_or_create("openai:gpt-4o").state(), CircuitState::Open);
        assert_eq!(registry.get_or_create("anthropic:claude-3-haiku").state(), CircuitState::Closed);
        assert!(Arc::ptr_eq(
            &registry.get_or_create("openai:gpt-4o"),
            &registry.get_or_create("openai:gpt-4o")
        ));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_reset_creates_missing_and_closes_existing() {
        let (registry, _clock) = registry();
        assert_eq!(registry.reset("unknown"), None);
        assert_eq!(registry.len(), 1);

        trip(&registry, "openai:gpt-4o");
        let transitions = registry.reset_all();
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].0, "openai:gpt-4o");
        assert_eq!(registry.get_or_create("openai:gpt-4o").state(), CircuitState::Closed);
    }

    /// Validates config updates reach existing breakers.
    #[test]
    fn test_update_config_propagates() {
        let (registry, _clock) = registry();
        let breaker = registry.get_or_create("svc");

        let config = CircuitBreakerConfig { failure_threshold: 7, ..CircuitBreakerConfig::default() };
        registry.update_config(config.clone()).expect("valid");

        assert_eq!(breaker.config(), config);
        assert_eq!(registry.get_or_create("new").config(), config);
        assert!(registry
            .update_config(CircuitBreakerConfig { failure_threshold: 0, ..config })
            .is_err());
    }

    /// Validates breakers created while an update runs end up on the new
    /// configuration.
    ///
    /// Assertions:
    /// - After creators and the updater finish, every breaker carries the
    ///   updated threshold.
    #[test]
    fn test_update_config_races_with_creation() {
        for _ in 0..20 {
            let (registry, _clock) = registry();
            let updated =
                CircuitBreakerConfig { failure_threshold: 9, ..CircuitBreakerConfig::default() };

            std::thread::scope(|scope| {
                for worker in 0..4 {
                    let registry = &registry;
                    scope.spawn(move || {
                        for i in 0..50 {
                            registry.get_or_create(&format!("svc-{worker}-{i}"));
                        }
                    });
                }
                scope.spawn(|| registry.update_config(updated.clone()).expect("valid"));
            });

            for (name, _) in registry.snapshot() {
                let breaker = registry.get(&name).expect("known breaker");
                assert_eq!(breaker.config(), updated, "{name} kept the old config");
            }
        }
    }

    #[test]
    fn test_snapshot_sorted() {
        let (registry, _clock) = registry();
        registry.get_or_create("b");
        registry.get_or_create("a");

        let names: Vec<_> = registry.snapshot().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }
}
