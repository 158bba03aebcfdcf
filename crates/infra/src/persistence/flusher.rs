//! Background flusher for the usage ledger
//!
//! Periodically moves unflushed records from a [`UsageTracker`] into a
//! [`UsageStore`] and prunes records past the retention window. Join handles
//! are tracked, cancellation is explicit, and every save is bounded by a
//! timeout. Stopping performs one final flush.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use promptgate_core::UsageTracker;
//! use promptgate_infra::persistence::{JsonLinesUsageStore, UsageFlusher, UsageFlusherConfig};
//!
//! # async fn example(tracker: Arc<UsageTracker>) -> Result<(), promptgate_infra::InfraError> {
//! let store = Arc::new(JsonLinesUsageStore::new("usage.jsonl"));
//! UsageFlusher::restore(tracker.as_ref(), store.as_ref()).await?;
//!
//! let mut flusher = UsageFlusher::new(tracker, store, UsageFlusherConfig::default());
//! flusher.start()?;
//! // ... application runs ...
//! flusher.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use promptgate_common::{Clock, SystemClock};
use promptgate_core::{UsageStore, UsageTracker};
use promptgate_domain::{PersistenceError, PersistenceResult, PersistenceSettings};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::errors::{InfraError, InfraResult};

/// Configuration for the usage flusher
#[derive(Debug, Clone)]
pub struct UsageFlusherConfig {
    /// Interval between flushes
    pub flush_interval: Duration,
    /// Timeout for a single save
    pub save_timeout: Duration,
    /// Join timeout when stopping
    pub join_timeout: Duration,
}

impl Default for UsageFlusherConfig {
    fn default() -> Self {
        Self::from_settings(&PersistenceSettings::default())
    }
}

impl UsageFlusherConfig {
    pub fn from_settings(settings: &PersistenceSettings) -> Self {
        Self {
            flush_interval: settings.flush_interval,
            save_timeout: Duration::from_secs(30),
            join_timeout: Duration::from_secs(5),
        }
    }
}

/// Usage flusher with explicit lifecycle management
pub struct UsageFlusher<C: Clock = SystemClock> {
    tracker: Arc<UsageTracker<C>>,
    store: Arc<dyn UsageStore>,
    config: UsageFlusherConfig,
    cancellation: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
}

impl<C: Clock> UsageFlusher<C> {
    pub fn new(
        tracker: Arc<UsageTracker<C>>,
        store: Arc<dyn UsageStore>,
        config: UsageFlusherConfig,
    ) -> Self {
        Self {
            tracker,
            store,
            config,
            cancellation: CancellationToken::new(),
            task_handle: None,
        }
    }

    /// Load persisted history into `tracker`; returns the number of records
    /// added after skipping repeated ids
    ///
    /// # Errors
    /// Propagates the store's load failure.
    pub async fn restore(tracker: &UsageTracker<C>, store: &dyn UsageStore) -> InfraResult<usize> {
        let records = store.load().await?;
        let count = tracker.restore(records);
        info!(count, "Usage history restored");
        Ok(count)
    }

    /// Start the flusher, spawning the background task
    ///
    /// # Errors
    /// Returns [`InfraError::Worker`] if already running.
    #[instrument(skip(self))]
    pub fn start(&mut self) -> InfraResult<()> {
        if self.is_running() {
            return Err(InfraError::Worker("Usage flusher already running".to_string()));
        }

        self.cancellation = CancellationToken::new();

        let tracker = Arc::clone(&self.tracker);
        let store = Arc::clone(&self.store);
        let config = self.config.clone();
        let cancel = self.cancellation.clone();

        let handle = tokio::spawn(async move {
            Self::flush_loop(tracker, store, config, cancel).await;
        });

        self.task_handle = Some(handle);
        let interval_ms = u64::try_from(self.config.flush_interval.as_millis()).unwrap_or(u64::MAX);
        info!(interval_ms, "Usage flusher started");
        Ok(())
    }

    /// Stop the flusher after a final flush
    ///
    /// # Errors
    /// Returns [`InfraError::Worker`] if not running, if the task panicked, or
    /// if it did not finish within the join timeout.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> InfraResult<()> {
        let Some(handle) = self.task_handle.take() else {
            return Err(InfraError::Worker("Usage flusher not running".to_string()));
        };

        self.cancellation.cancel();

        match tokio::time::timeout(self.config.join_timeout, handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(error = %e, "Usage flusher task panicked");
                return Err(InfraError::Worker("Usage flusher task panicked".to_string()));
            }
            Err(_) => {
                warn!("Usage flusher did not complete within timeout");
                return Err(InfraError::Worker("Usage flusher join timeout".to_string()));
            }
        }

        info!("Usage flusher stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task_handle.is_some()
    }

    /// Flush once now; returns the number of records saved
    ///
    /// Records whose save fails or times out are requeued.
    ///
    /// # Errors
    /// Returns the save failure after requeueing.
    pub async fn flush_now(&self) -> PersistenceResult<usize> {
        Self::flush(&self.tracker, self.store.as_ref(), self.config.save_timeout).await
    }

    async fn flush_loop(
        tracker: Arc<UsageTracker<C>>,
        store: Arc<dyn UsageStore>,
        config: UsageFlusherConfig,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("Usage flusher loop cancelled");
                    if let Err(e) = Self::flush(&tracker, store.as_ref(), config.save_timeout).await {
                        error!(error = %e, "Final usage flush failed");
                    }
                    break;
                }
                () = tokio::time::sleep(config.flush_interval) => {
                    if let Err(e) = Self::flush(&tracker, store.as_ref(), config.save_timeout).await {
                        error!(error = %e, "Usage flush failed");
                    }
                    let pruned = tracker.prune();
                    if pruned > 0 {
                        debug!(pruned, "Usage records pruned");
                    }
                }
            }
        }
    }

    async fn flush(
        tracker: &UsageTracker<C>,
        store: &dyn UsageStore,
        save_timeout: Duration,
    ) -> PersistenceResult<usize> {
        let records = tracker.take_unflushed();
        if records.is_empty() {
            return Ok(0);
        }

        let count = records.len();
        let result = match tokio::time::timeout(save_timeout, store.save(&records)).await {
            Ok(result) => result,
            Err(_) => Err(PersistenceError::Backend(format!(
                "save timed out after {}ms",
                save_timeout.as_millis()
            ))),
        };

        match result {
            Ok(()) => {
                debug!(count, "Usage records flushed");
                Ok(count)
            }
            Err(e) => {
                tracker.requeue(records);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use async_trait::async_trait;
    use promptgate_common::MockClock;
    use promptgate_core::TrackerSettings;
    use promptgate_domain::{AlertSettings, PriceTable, UsageLimits, UsagePeriod, UsageRecord};

    use super::*;
    use crate::persistence::InMemoryUsageStore;

    fn tracker() -> Arc<UsageTracker<MockClock>> {
        let clock = Arc::new(MockClock::with_wall_start(UNIX_EPOCH + Duration::from_secs(1_773_489_600)));
        let settings = TrackerSettings {
            limits: UsageLimits::default(),
            pricing: PriceTable::default(),
            alerts: AlertSettings::default(),
            retention_days: 30,
            max_unflushed: 1_000,
        };
        Arc::new(UsageTracker::with_clock(settings, clock))
    }

    fn record(tracker: &UsageTracker<MockClock>) {
        let at = chrono::DateTime::<chrono::Utc>::from(UNIX_EPOCH + Duration::from_secs(1_773_489_600));
        tracker
            .track_usage(UsageRecord::new("openai", "gpt-4o", "caption", at).with_usage(50, 0.001))
            .expect("within quota");
    }

    /// Validates failed saves are requeued and retried.
    ///
    /// Assertions:
    /// - A failing save returns an error and loses nothing
    /// - The next flush saves the requeued records exactly once
    #[tokio::test]
    async fn test_failed_flush_requeues() {
        let tracker = tracker();
        let store = Arc::new(InMemoryUsageStore::new());
        let flusher = UsageFlusher::new(Arc::clone(&tracker), store.clone(), UsageFlusherConfig::default());

        record(&tracker);
        record(&tracker);
        store.fail_next_saves(1);

        assert!(flusher.flush_now().await.is_err());
        assert!(store.is_empty());

        assert_eq!(flusher.flush_now().await.expect("retry"), 2);
        assert_eq!(flusher.flush_now().await.expect("nothing new"), 0);
        assert_eq!(store.len(), 2);
    }

    /// Writes every batch, then acknowledges late
    struct SlowAckStore {
        inner: InMemoryUsageStore,
        ack_delay: Duration,
    }

    #[async_trait]
    impl UsageStore for SlowAckStore {
        async fn save(&self, records: &[UsageRecord]) -> PersistenceResult<()> {
            self.inner.save(records).await?;
            tokio::time::sleep(self.ack_delay).await;
            Ok(())
        }

        async fn load(&self) -> PersistenceResult<Vec<UsageRecord>> {
            self.inner.load().await
        }
    }

    /// Validates a save that lands but times out does not inflate usage
    /// after a restart.
    ///
    /// Assertions:
    /// - The late acknowledgement causes the batch to be written twice
    /// - Restoring from that store counts the record once
    #[tokio::test(start_paused = true)]
    async fn test_late_ack_does_not_double_count_on_restore() {
        let source = tracker();
        let store = Arc::new(SlowAckStore {
            inner: InMemoryUsageStore::new(),
            ack_delay: Duration::from_millis(200),
        });
        let config = UsageFlusherConfig {
            save_timeout: Duration::from_millis(50),
            ..UsageFlusherConfig::default()
        };
        let flusher = UsageFlusher::new(Arc::clone(&source), store.clone(), config);

        record(&source);
        assert!(flusher.flush_now().await.is_err());
        assert!(flusher.flush_now().await.is_err());
        assert_eq!(store.inner.len(), 2);

        let restarted = tracker();
        let added = UsageFlusher::restore(restarted.as_ref(), store.as_ref()).await.expect("restore");
        assert_eq!(added, 1);
        assert_eq!(
            restarted.totals(UsagePeriod::Daily).tokens,
            source.totals(UsagePeriod::Daily).tokens
        );
    }

    #[tokio::test]
    async fn test_lifecycle_misuse_rejected() {
        let tracker = tracker();
        let store = Arc::new(InMemoryUsageStore::new());
        let mut flusher = UsageFlusher::new(tracker, store, UsageFlusherConfig::default());

        assert!(matches!(flusher.stop().await, Err(InfraError::Worker(_))));
        flusher.start().expect("start");
        assert!(matches!(flusher.start(), Err(InfraError::Worker(_))));
        flusher.stop().await.expect("stop");
        assert!(!flusher.is_running());
    }
}
