//! Integration tests for the TTL cache
//!
//! Covers concurrent access across many keys and expiry driven by a shared
//! mock clock.

#![cfg(feature = "runtime")]

use std::sync::Arc;
use std::time::Duration;

use promptgate_common::cache::{CacheConfig, TtlCache};
use promptgate_common::resilience::MockClock;

/// Validates concurrent writers and readers on disjoint keys.
///
/// # Test Steps
/// 1. Spawn 8 tasks, each inserting and reading back 100 keys
/// 2. Confirm every task reads its own values
/// 3. Confirm final size and insert count
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_disjoint_keys() {
    let cache: Arc<TtlCache<String, usize>> = Arc::new(
        TtlCache::new(CacheConfig::ttl(Duration::from_secs(300))).expect("cache"),
    );

    let mut handles = Vec::new();
    for task in 0..8 {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move {
            for i in 0..100 {
                let key = format!("task{task}:op{i}");
                cache.insert(key.clone(), task * 1000 + i);
                assert_eq!(cache.get(&key), Some(task * 1000 + i));
            }
        }));
    }
    for handle in handles {
        handle.await.expect("task");
    }

    let stats = cache.stats();
    assert_eq!(cache.len(), 800);
    assert_eq!(stats.inserts, 800);
    assert_eq!(stats.hits, 800);
    assert!((stats.hit_rate() - 1.0).abs() < f64::EPSILON);
}

/// Validates expiry across a shared clock and periodic purging.
///
/// # Test Steps
/// 1. Insert entries at staggered times
/// 2. Advance the clock so only the first batch is stale
/// 3. Purge and confirm only fresh entries remain
#[test]
fn test_staggered_expiry_with_purge() {
    let clock = Arc::new(MockClock::new());
    let cache: TtlCache<String, String, MockClock> = TtlCache::with_clock(
        CacheConfig::builder().ttl(Duration::from_secs(60)).unbounded().build().expect("config"),
        Arc::clone(&clock),
    )
    .expect("cache");

    for i in 0..5 {
        cache.insert(format!("early{i}"), "stale".to_string());
    }
    clock.advance(Duration::from_secs(45));
    for i in 0..3 {
        cache.insert(format!("late{i}"), "fresh".to_string());
    }
    clock.advance(Duration::from_secs(30));

    assert_eq!(cache.purge_expired(), 5);
    assert_eq!(cache.len(), 3);
    assert_eq!(cache.get("late0").as_deref(), Some("fresh"));
    assert_eq!(cache.get("early0"), None);
    assert_eq!(cache.stats().expirations, 5);
}
