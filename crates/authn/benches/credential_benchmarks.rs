#![allow(clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use multitoken_authn::{
    CredentialEngine, HashCost, PrincipalId, TokenConfig, split_credential, testutil::fast_hash_cost,
};
use multitoken_storage::MemoryBackend;
use tokio::runtime::Runtime;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn rt() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to create tokio runtime")
}

fn engine(rt: &Runtime, cost: HashCost) -> CredentialEngine {
    let config = TokenConfig::builder().hash_cost(cost).build().expect("valid config");
    rt.block_on(async { CredentialEngine::new(Arc::new(MemoryBackend::new()), config) })
        .expect("valid engine")
}

// ---------------------------------------------------------------------------
// 1. parsing
// ---------------------------------------------------------------------------

fn parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("parsing");
    let well_formed = format!("{}:hash:$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA", "ab".repeat(20));

    group.bench_function("split_well_formed", |b| {
        b.iter(|| split_credential(std::hint::black_box(&well_formed)));
    });
    group.bench_function("split_malformed", |b| {
        b.iter(|| split_credential(std::hint::black_box("a:hash:b:hash:c")));
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// 2. issue / resolve at test and production hash cost
// ---------------------------------------------------------------------------

fn lifecycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("lifecycle");
    group.sample_size(20);
    let rt = rt();

    for (label, cost) in [("fast", fast_hash_cost()), ("default", HashCost::default())] {
        let engine = engine(&rt, cost);
        let p = PrincipalId::from(1u64);

        group.bench_with_input(BenchmarkId::new("issue", label), &engine, |b, engine| {
            b.to_async(&rt).iter(|| async {
                engine.issue(&p).await.expect("issue failed");
            });
        });

        let issued = rt.block_on(engine.issue(&p)).expect("issue failed");
        group.bench_with_input(BenchmarkId::new("resolve", label), &engine, |b, engine| {
            b.to_async(&rt).iter(|| async {
                engine.resolve(&issued.credential).await.expect("resolve failed");
            });
        });

        group.bench_with_input(BenchmarkId::new("resolve_malformed", label), &engine, |b, engine| {
            b.to_async(&rt).iter(|| async {
                let _ = engine.resolve("garbage").await;
            });
        });
    }

    group.finish();
}

criterion_group!(benches, parsing, lifecycle);
criterion_main!(benches);
