//! Sharded TTL cache with lazy expiry

use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::debug;

use super::config::CacheConfig;
use super::stats::{CacheStats, MetricsCollector};
use crate::resilience::clock::{Clock, SystemClock};
use crate::error::ConfigResult;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
}

/// Concurrent cache whose entries expire `ttl` after insertion
///
/// Expired entries are never returned. They are removed when a lookup trips
/// over them or when [`purge_expired`](Self::purge_expired) runs; there is no
/// background sweeper. Keys live in a `DashMap`, so unrelated keys do not
/// contend.
///
/// # Example
/// ```
/// use std::time::Duration;
///
/// use promptgate_common::cache::{CacheConfig, TtlCache};
///
/// let cache: TtlCache<String, u32> =
///     TtlCache::new(CacheConfig::ttl(Duration::from_secs(60))).unwrap();
/// cache.insert("answer".to_string(), 42);
/// assert_eq!(cache.get("answer"), Some(42));
/// ```
pub struct TtlCache<K, V, C: Clock = SystemClock>
where
    K: Eq + Hash,
{
    entries: DashMap<K, CacheEntry<V>>,
    ttl: RwLock<Duration>,
    max_entries: Option<usize>,
    metrics: MetricsCollector,
    clock: Arc<C>,
}

impl<K, V, C> std::fmt::Debug for TtlCache<K, V, C>
where
    K: Eq + Hash,
    C: Clock,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("len", &self.entries.len())
            .field("ttl", &*self.ttl.read())
            .field("max_entries", &self.max_entries)
            .finish()
    }
}

impl<K, V> TtlCache<K, V, SystemClock>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(config: CacheConfig) -> ConfigResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }
}

impl<K, V, C> TtlCache<K, V, C>
where
    K: Eq + Hash + Clone,
    V: Clone,
    C: Clock,
{
    pub fn with_clock(config: CacheConfig, clock: Arc<C>) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            entries: DashMap::new(),
            ttl: RwLock::new(config.ttl),
            max_entries: config.max_entries,
            metrics: MetricsCollector::default(),
            clock,
        })
    }

    fn is_expired(&self, stored_at: Instant, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(stored_at) > ttl
    }

    /// Live value for `key`; expired entries are removed and reported absent
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let now = self.clock.now();
        let ttl = *self.ttl.read();

        match self.entries.get(key) {
            None => {
                self.metrics.record_miss();
                return None;
            }
            Some(entry) if !self.is_expired(entry.stored_at, now, ttl) => {
                self.metrics.record_hit();
                return Some(entry.value.clone());
            }
            Some(_) => {}
        }

        // Another writer may have refreshed the entry since the read above.
        if self.entries.remove_if(key, |_, entry| self.is_expired(entry.stored_at, now, ttl)).is_some()
        {
            self.metrics.record_expirations(1);
        }
        self.metrics.record_miss();
        None
    }

    /// Store `value`, replacing any previous entry for `key`
    pub fn insert(&self, key: K, value: V) {
        let now = self.clock.now();

        if let Some(max) = self.max_entries {
            if self.entries.len() >= max && !self.entries.contains_key(&key) {
                self.make_room(max, now);
            }
        }

        self.entries.insert(key, CacheEntry { value, stored_at: now });
        self.metrics.record_insert();
    }

    fn make_room(&self, max: usize, now: Instant) {
        self.purge_expired_at(now);
        while self.entries.len() >= max {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().stored_at)
                .map(|entry| entry.key().clone());
            let Some(oldest) = oldest else { break };
            if self.entries.remove(&oldest).is_some() {
                self.metrics.record_eviction();
            }
        }
    }

    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries.remove(key).map(|(_, entry)| entry.value)
    }

    /// Drop every entry
    pub fn clear(&self) {
        let removed = self.entries.len();
        self.entries.clear();
        debug!(removed, "cache_cleared");
    }

    /// Remove all expired entries, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(self.clock.now())
    }

    fn purge_expired_at(&self, now: Instant) -> usize {
        let ttl = *self.ttl.read();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !self.is_expired(entry.stored_at, now, ttl));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            self.metrics.record_expirations(removed as u64);
            debug!(removed, "cache_expired_purged");
        }
        removed
    }

    pub fn ttl(&self) -> Duration {
        *self.ttl.read()
    }

    /// Change the TTL; existing entries are judged against the new value
    pub fn set_ttl(&self, ttl: Duration) -> ConfigResult<()> {
        CacheConfig { ttl, max_entries: self.max_entries }.validate()?;
        *self.ttl.write() = ttl;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.metrics.snapshot(self.entries.len(), self.max_entries)
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for cache::core.
    use super::*;
    use crate::resilience::clock::MockClock;

    fn cache(ttl_secs: u64, max: Option<usize>) -> (TtlCache<String, i32, MockClock>, Arc<MockClock>) {
        let clock = Arc::new(MockClock::new());
        let config = CacheConfig { ttl: Duration::from_secs(ttl_secs), max_entries: max };
        (TtlCache::with_clock(config, Arc::clone(&clock)).expect("cache"), clock)
    }

    /// Validates lazy expiry at the TTL boundary.
    ///
    /// Assertions:
    /// - An entry exactly `ttl` old is still served.
    /// - One millisecond later it is absent and removed.
    #[test]
    fn test_lazy_expiry_boundary() {
        let (cache, clock) = cache(10, None);
        cache.insert("k".to_string(), 1);

        clock.advance(Duration::from_secs(10));
        assert_eq!(cache.get("k"), Some(1));

        clock.advance(Duration::from_millis(1));
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.expirations, 1);
    }

    #[test]
    fn test_insert_replaces_and_refreshes() {
        let (cache, clock) = cache(10, None);
        cache.insert("k".to_string(), 1);
        clock.advance(Duration::from_secs(8));
        cache.insert("k".to_string(), 2);
        clock.advance(Duration::from_secs(8));

        assert_eq!(cache.get("k"), Some(2));
        assert_eq!(cache.len(), 1);
    }

    /// Validates oldest-first eviction when bounded.
    #[test]
    fn test_evicts_oldest_when_full() {
        let (cache, clock) = cache(60, Some(2));
        cache.insert("a".to_string(), 1);
        clock.advance(Duration::from_secs(1));
        cache.insert("b".to_string(), 2);
        clock.advance(Duration::from_secs(1));
        cache.insert("c".to_string(), 3);

        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(2));
        assert_eq!(cache.get("c"), Some(3));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_purge_expired_and_clear() {
        let (cache, clock) = cache(5, None);
        cache.insert("old".to_string(), 1);
        clock.advance(Duration::from_secs(6));
        cache.insert("new".to_string(), 2);

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    /// Validates a shorter TTL applies to existing entries.
    #[test]
    fn test_set_ttl_applies_to_existing() {
        let (cache, clock) = cache(60, None);
        cache.insert("k".to_string(), 1);
        clock.advance(Duration::from_secs(20));

        cache.set_ttl(Duration::from_secs(10)).expect("valid ttl");
        assert_eq!(cache.get("k"), None);
        assert!(cache.set_ttl(Duration::ZERO).is_err());
    }
}
