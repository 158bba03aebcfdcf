use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use promptgate_core::{operation, ErrorClassifier, ExecutionRequest, Gateway};
use promptgate_domain::{GatewayConfig, ProviderFailure};
use tokio_util::sync::CancellationToken;

fn unlimited_config(cache_responses: bool) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.fallback.cache_responses = cache_responses;
    config.limits.daily_tokens = u64::MAX;
    config.limits.daily_requests = u64::MAX;
    config.limits.daily_cost = f64::MAX;
    config.limits.monthly_tokens = u64::MAX;
    config.limits.monthly_requests = u64::MAX;
    config.limits.monthly_cost = f64::MAX;
    config
}

fn gateway_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("gateway");
    group.sample_size(50).measurement_time(std::time::Duration::from_secs(5));

    group.bench_function("cache_hit", |b| {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let gateway = Arc::new(Gateway::new(unlimited_config(true)).expect("gateway"));
        let cancel = CancellationToken::new();

        runtime.block_on(async {
            gateway
                .execute(
                    ExecutionRequest::new("caption", "openai", "gpt-4o", 100),
                    operation(|| async { Ok::<_, ProviderFailure>("warm".to_string()) }),
                    Vec::new(),
                    &cancel,
                )
                .await
                .expect("warm cache");
        });

        b.iter(|| {
            runtime.block_on(async {
                let execution = gateway
                    .execute(
                        ExecutionRequest::new("caption", "openai", "gpt-4o", 100),
                        operation(|| async { Ok::<_, ProviderFailure>("miss".to_string()) }),
                        Vec::new(),
                        &cancel,
                    )
                    .await
                    .expect("cached");
                black_box(execution);
            });
        });
    });

    group.bench_function("closed_circuit_success", |b| {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let gateway = Arc::new(Gateway::new(unlimited_config(false)).expect("gateway"));
        let cancel = CancellationToken::new();

        b.iter(|| {
            runtime.block_on(async {
                let execution = gateway
                    .execute(
                        ExecutionRequest::new("caption", "openai", "gpt-4o", 100),
                        operation(|| async { Ok::<_, ProviderFailure>("fresh".to_string()) }),
                        Vec::new(),
                        &cancel,
                    )
                    .await
                    .expect("success");
                black_box(execution);
            });
        });
    });

    group.bench_function("classify_rate_limit", |b| {
        let classifier = ErrorClassifier::new();
        let failure = ProviderFailure::http(429, "Too Many Requests: rate limit exceeded");
        b.iter(|| black_box(classifier.classify(black_box(&failure))));
    });

    group.finish();
}

criterion_group!(core_benchmarks, gateway_benchmark);
criterion_main!(core_benchmarks);
