//! Integration tests for usage persistence
//!
//! Runs gateway executions, flushes the ledger to a store, and restores it
//! into a fresh gateway.

use std::sync::Arc;
use std::time::Duration;

use promptgate_core::{operation, ExecutionRequest, Gateway};
use promptgate_domain::{GatewayConfig, ProviderFailure, UsagePeriod};
use promptgate_infra::{
    InMemoryUsageStore, JsonLinesUsageStore, TracingEventSink, UsageFlusher, UsageFlusherConfig,
};
use tokio_util::sync::CancellationToken;

async fn run_calls(gateway: &Gateway, count: usize) {
    for i in 0..count {
        gateway
            .execute(
                ExecutionRequest::new(format!("caption-{i}"), "openai", "gpt-4o", 200),
                operation(|| async { Ok::<_, ProviderFailure>("text".to_string()) }),
                Vec::new(),
                &CancellationToken::new(),
            )
            .await
            .expect("call succeeds");
    }
}

/// Validates the ledger survives a restart through the JSON-lines store.
///
/// Assertions:
/// - Stopping the flusher writes every pending record
/// - A new gateway restored from the file sees the same daily totals
/// - Restored records are not flushed a second time
#[tokio::test]
async fn test_ledger_round_trip_through_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("usage.jsonl");

    let gateway = Gateway::builder()
        .config(GatewayConfig::default())
        .event_sink(Arc::new(TracingEventSink::new()))
        .build()
        .expect("gateway");
    let store = Arc::new(JsonLinesUsageStore::new(&path));

    let mut flusher = UsageFlusher::new(gateway.usage(), store.clone(), UsageFlusherConfig::default());
    flusher.start().expect("start");
    run_calls(&gateway, 3).await;
    flusher.stop().await.expect("stop");

    let before = gateway.usage().totals(UsagePeriod::Daily);
    assert_eq!(before.requests, 3);

    let restarted = Gateway::new(GatewayConfig::default()).expect("gateway");
    let tracker = restarted.usage();
    let restored = UsageFlusher::restore(tracker.as_ref(), store.as_ref()).await.expect("restore");
    assert_eq!(restored, 3);
    let after = tracker.totals(UsagePeriod::Daily);
    assert_eq!(after.requests, before.requests);
    assert_eq!(after.tokens, before.tokens);
    assert!((after.cost - before.cost).abs() < 1e-9);
    assert!(tracker.take_unflushed().is_empty());
}

/// Validates the background loop flushes on its interval.
#[tokio::test]
async fn test_periodic_flush() {
    let gateway = Gateway::new(GatewayConfig::default()).expect("gateway");
    let store = Arc::new(InMemoryUsageStore::new());
    let config = UsageFlusherConfig {
        flush_interval: Duration::from_millis(20),
        ..UsageFlusherConfig::default()
    };

    let mut flusher = UsageFlusher::new(gateway.usage(), store.clone(), config);
    flusher.start().expect("start");
    run_calls(&gateway, 2).await;

    let mut flushed = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if store.len() == 2 {
            flushed = true;
            break;
        }
    }
    flusher.stop().await.expect("stop");

    assert!(flushed, "records were not flushed before stop");
    assert_eq!(store.len(), 2);
}

/// Validates restored history counts against the daily quota.
#[tokio::test]
async fn test_restored_usage_counts_toward_quota() {
    let source = Gateway::new(GatewayConfig::default()).expect("gateway");
    run_calls(&source, 2).await;
    let store = InMemoryUsageStore::with_records(source.usage().records());

    let mut config = GatewayConfig::default();
    config.limits.daily_requests = 2;
    let gateway = Gateway::new(config).expect("gateway");
    UsageFlusher::restore(gateway.usage().as_ref(), &store).await.expect("restore");

    let error = gateway
        .execute(
            ExecutionRequest::new("caption-new", "openai", "gpt-4o", 200),
            operation(|| async { Ok::<_, ProviderFailure>("text".to_string()) }),
            Vec::new(),
            &CancellationToken::new(),
        )
        .await
        .expect_err("quota exhausted by restored history");
    assert!(error.is_denied());
}
