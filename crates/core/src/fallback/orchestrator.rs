//! Fallback orchestrator
//!
//! Drives `[primary, ...fallbacks]` in order, each candidate under its own
//! retry budget (`"{operation_id}#{index}"`). The response cache is checked
//! before the first candidate and written after the first success. When
//! every candidate fails the catalog supplies a degraded placeholder, if
//! allowed.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use promptgate_common::resilience::{ConfigResult, RetryError, RetryExecutor};
use promptgate_common::{CacheStats, Clock, SystemClock, TtlCache};
use promptgate_domain::{
    ClassifiedError, DegradationRule, ErrorKind, FallbackSettings, ProviderFailure,
    TransportErrorKind,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::degradation::DegradationCatalog;
use crate::classifier::ErrorClassifier;
use crate::settings::cache_config;

/// A repeatable provider call
///
/// Invoked once per attempt; each invocation must start a fresh call.
pub type Operation<T> = Box<dyn FnMut() -> BoxFuture<'static, Result<T, ProviderFailure>> + Send>;

/// Box a closure returning a future into an [`Operation`]
pub fn operation<T, F, Fut>(mut call: F) -> Operation<T>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, ProviderFailure>> + Send + 'static,
{
    Box::new(move || call().boxed())
}

/// How a fallback chain ended
#[derive(Debug)]
pub enum FallbackOutcome<T> {
    /// Served from the response cache; no candidate ran
    Cached(T),
    /// Candidate `candidate` succeeded after `attempts` total attempts
    Completed { value: T, candidate: usize, attempts: u32 },
    /// Every candidate failed; a placeholder stands in for the result
    Degraded { payload: Value, error: ClassifiedError, attempts: u32 },
    /// Every candidate failed and degradation was not allowed
    Failed { error: ClassifiedError, attempts: u32 },
    Cancelled { attempts: u32 },
}

impl<T> FallbackOutcome<T> {
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Cached(_) => 0,
            Self::Completed { attempts, .. }
            | Self::Degraded { attempts, .. }
            | Self::Failed { attempts, .. }
            | Self::Cancelled { attempts } => *attempts,
        }
    }
}

/// Candidate chain runner with a response cache
pub struct FallbackOrchestrator<C: Clock = SystemClock> {
    cache: TtlCache<String, Value, C>,
    classifier: ErrorClassifier,
    catalog: RwLock<DegradationCatalog>,
    settings: RwLock<FallbackSettings>,
}

impl<C: Clock> std::fmt::Debug for FallbackOrchestrator<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackOrchestrator")
            .field("cache", &self.cache)
            .field("settings", &*self.settings.read())
            .finish_non_exhaustive()
    }
}

impl FallbackOrchestrator<SystemClock> {
    pub fn new(settings: FallbackSettings, rules: Vec<DegradationRule>) -> ConfigResult<Self> {
        Self::with_clock(settings, rules, Arc::new(SystemClock))
    }
}

impl<C: Clock> FallbackOrchestrator<C> {
    pub fn with_clock(
        settings: FallbackSettings,
        rules: Vec<DegradationRule>,
        clock: Arc<C>,
    ) -> ConfigResult<Self> {
        let cache = TtlCache::with_clock(cache_config(&settings)?, clock)?;
        Ok(Self {
            cache,
            classifier: ErrorClassifier::new(),
            catalog: RwLock::new(DegradationCatalog::new(rules)),
            settings: RwLock::new(settings),
        })
    }

    #[must_use]
    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Swap settings and rules; the cache keeps its entries and bound
    pub fn update(&self, settings: FallbackSettings, rules: Vec<DegradationRule>) -> ConfigResult<()> {
        cache_config(&settings)?;
        self.cache.set_ttl(settings.cache_ttl)?;
        *self.catalog.write() = DegradationCatalog::new(rules);
        *self.settings.write() = settings;
        Ok(())
    }

    pub fn settings(&self) -> FallbackSettings {
        self.settings.read().clone()
    }

    /// Run the chain for `operation_id`
    ///
    /// Cached values that no longer deserialize into `T` count as misses.
    /// A non-retryable failure only ends its own candidate; the next one
    /// still runs.
    pub async fn execute<T>(
        &self,
        operation_id: &str,
        candidates: Vec<Operation<T>>,
        retry: &RetryExecutor,
        cancel: &CancellationToken,
    ) -> FallbackOutcome<T>
    where
        T: Serialize + DeserializeOwned,
    {
        let settings = self.settings();

        if settings.cache_responses {
            if let Some(value) = self.cached(operation_id) {
                return FallbackOutcome::Cached(value);
            }
        }

        let limit = if settings.enable_fallback { candidates.len() } else { 1 };
        let mut attempts: u32 = 0;
        let mut last_error: Option<ClassifiedError> = None;

        for (index, mut candidate) in candidates.into_iter().take(limit).enumerate() {
            let label = format!("{operation_id}#{index}");
            let classifier = &self.classifier;
            let attempt_timeout = settings.attempt_timeout;

            let outcome = retry
                .execute(
                    &label,
                    || {
                        let call = candidate();
                        async move {
                            let result = match attempt_timeout {
                                Some(limit) => tokio::time::timeout(limit, call)
                                    .await
                                    .unwrap_or_else(|_| Err(attempt_timed_out(limit))),
                                None => call.await,
                            };
                            result.map_err(|failure| classifier.classify(&failure))
                        }
                    },
                    cancel,
                )
                .await;
            attempts += outcome.attempts;

            match outcome.result {
                Ok(value) => {
                    if index > 0 {
                        info!(operation_id, candidate = index, attempts, "fallback_succeeded");
                    }
                    if settings.cache_responses {
                        self.store(operation_id, &value);
                    }
                    return FallbackOutcome::Completed { value, candidate: index, attempts };
                }
                Err(RetryError::Cancelled { .. }) => {
                    debug!(operation_id, candidate = index, attempts, "fallback_cancelled");
                    return FallbackOutcome::Cancelled { attempts };
                }
                Err(RetryError::NonRetryable { error, .. })
                | Err(RetryError::Exhausted { last_error: error, .. }) => {
                    warn!(operation_id, candidate = index, kind = %error.kind, "fallback_candidate_failed");
                    last_error = Some(error);
                }
            }
        }

        let error = last_error.unwrap_or_else(|| {
            ClassifiedError::new(ErrorKind::Unknown, "no candidate operations supplied", false)
        });

        if settings.degrade_gracefully {
            let payload = self.catalog.read().respond(operation_id, &error.kind.to_string());
            warn!(operation_id, kind = %error.kind, attempts, "fallback_degraded");
            FallbackOutcome::Degraded { payload, error, attempts }
        } else {
            FallbackOutcome::Failed { error, attempts }
        }
    }

    fn cached<T: DeserializeOwned>(&self, operation_id: &str) -> Option<T> {
        let value = self.cache.get(operation_id)?;
        match serde_json::from_value(value) {
            Ok(typed) => {
                debug!(operation_id, "cache_hit");
                Some(typed)
            }
            Err(error) => {
                debug!(operation_id, error = %error, "cache_entry_type_mismatch");
                None
            }
        }
    }

    fn store<T: Serialize>(&self, operation_id: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(json) => self.cache.insert(operation_id.to_string(), json),
            Err(error) => warn!(operation_id, error = %error, "cache_store_failed"),
        }
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

fn attempt_timed_out(limit: std::time::Duration) -> ProviderFailure {
    ProviderFailure::transport(
        TransportErrorKind::TimedOut,
        format!("attempt exceeded {}ms deadline", limit.as_millis()),
    )
}
