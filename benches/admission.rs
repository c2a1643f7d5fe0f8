//! Benchmarks for the admission hot path
//!
//! This benchmark measures:
//! - Cache key normalization for topics and request bodies
//! - Sliding-window checks against a warm bucket
//! - In-process tier inserts at capacity (batched eviction)
//! - A full gateway call served from cache

use ai_lib_gateway::cache::{CacheConfig, KeyNormalizer, MemoryTier, TieredCache};
use ai_lib_gateway::gateway::{Handler, HandlerOutput};
use ai_lib_gateway::resilience::{RateLimiter, WindowPolicy};
use ai_lib_gateway::{Gateway, GatewayConfig, GatewayRequest};
use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;

struct Fixed;

#[async_trait]
impl Handler for Fixed {
    async fn invoke(&self, _request: &GatewayRequest) -> anyhow::Result<HandlerOutput> {
        Ok(HandlerOutput::new(serde_json::json!({ "lesson": "cached" }), 0.02))
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

fn bench_normalization(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalization");
    let normalizer = KeyNormalizer::new();

    group.bench_function("topic", |b| {
        b.iter(|| {
            normalizer.normalize(
                black_box("  Introduction to the Fundamentals of Linear Algebra!! "),
                "lesson",
                "en",
            )
        })
    });

    let request = GatewayRequest::get("/v1/lessons")
        .with_header("accept-language", "en")
        .with_body(serde_json::json!({
            "filters": { "level": "beginner", "tags": ["math", "algebra"] },
            "page": 1,
        }));
    let vary = vec!["accept-language".to_string()];
    group.bench_function("request", |b| {
        b.iter(|| normalizer.request_key(black_box(&request), &vary))
    });

    group.finish();
}

fn bench_rate_limiter(c: &mut Criterion) {
    let rt = runtime();
    let limiter = RateLimiter::new(WindowPolicy::new(1_000_000, 1_000_000, 1_000_000));

    c.bench_function("rate_limiter/check_and_record", |b| {
        b.to_async(&rt)
            .iter(|| limiter.check_and_record(black_box("bench-user"), "/v1/lessons"))
    });
}

fn bench_memory_tier(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory_tier");
    for capacity in [100usize, 1_000, 10_000] {
        let tier = MemoryTier::new(capacity);
        for i in 0..capacity {
            tier.insert(&format!("warm-{i}"), vec![0u8; 64], Duration::from_secs(3600), i as u64);
        }
        let mut n = 0u64;
        group.bench_with_input(BenchmarkId::new("insert_at_capacity", capacity), &capacity, |b, _| {
            b.iter(|| {
                n += 1;
                tier.insert(
                    &format!("new-{n}"),
                    vec![0u8; 64],
                    Duration::from_secs(3600),
                    capacity as u64 + n,
                )
            })
        });
    }
    group.finish();
}

fn bench_gateway(c: &mut Criterion) {
    let rt = runtime();
    let config = GatewayConfig::default().with_limits(u32::MAX, u32::MAX, u32::MAX);
    let gateway = Gateway::builder(config).build().unwrap();
    let request = GatewayRequest::get("/v1/lessons").with_caller("bench");
    rt.block_on(gateway.call(&request, &Fixed)).unwrap();

    c.bench_function("gateway/cache_hit", |b| {
        b.to_async(&rt).iter(|| gateway.call(black_box(&request), &Fixed))
    });

    let cache = TieredCache::new(CacheConfig::new().with_compression(true, 256));
    let payload = serde_json::json!({ "text": "lesson body ".repeat(500) });
    c.bench_function("tiered_cache/set_json_compressed", |b| {
        b.to_async(&rt).iter(|| cache.set_json("big", black_box(&payload), None))
    });
}

criterion_group!(
    benches,
    bench_normalization,
    bench_rate_limiter,
    bench_memory_tier,
    bench_gateway
);
criterion_main!(benches);
