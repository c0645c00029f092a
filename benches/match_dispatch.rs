//! Benchmarks for the fast and general match paths.
//!
//! Every encoder runs the same pattern over the same inputs, so the
//! difference between groups is the cost of the dispatch path and the
//! encoding itself.

use std::path::PathBuf;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rosie_engine::{Engine, EngineConfig, EnginePool, PoolConfig};

fn engine() -> Engine {
    let home = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("rosie");
    Engine::with_config(EngineConfig::new().with_home(home)).expect("engine boots")
}

/// Log-like lines with a mix of matching and non-matching records.
fn lines(n: usize) -> Vec<Vec<u8>> {
    (0..n)
        .map(|i| {
            if i % 4 == 0 {
                format!("status ok after {i} retries").into_bytes()
            } else {
                format!("{i} bytes from 10.0.{}.{} in {}.{}ms", i % 256, i % 7, i % 13, i % 10)
                    .into_bytes()
            }
        })
        .collect()
}

fn bench_encoders(c: &mut Criterion) {
    let engine = engine();
    assert!(engine.import("num", None).unwrap().ok);
    let handle = engine.compile(b"num.int [:alpha:]+").unwrap().handle;
    let inputs = lines(1000);

    let mut group = c.benchmark_group("encoders");
    group.throughput(Throughput::Elements(inputs.len() as u64));
    for encoder in ["bool", "line", "json", "byte", "matches", "data", "color"] {
        group.bench_with_input(BenchmarkId::from_parameter(encoder), &encoder, |b, encoder| {
            b.iter(|| {
                for input in &inputs {
                    black_box(engine.match_pattern(handle, 1, encoder, input).unwrap());
                }
            })
        });
    }
    group.finish();
}

fn bench_governor(c: &mut Criterion) {
    let inputs = lines(1000);
    let mut group = c.benchmark_group("governor");
    for limit in [0u32, 10] {
        let engine = engine();
        engine.set_alloc_limit(limit).unwrap();
        let handle = engine.compile(b"[:digit:]+").unwrap().handle;
        group.bench_with_input(BenchmarkId::new("limit_mb", limit), &limit, |b, _| {
            b.iter(|| {
                for input in &inputs {
                    black_box(engine.match_pattern(handle, 1, "json", input).unwrap());
                }
            })
        });
    }
    group.finish();
}

fn bench_pool(c: &mut Criterion) {
    let home = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("rosie");
    let inputs = lines(10_000);
    let refs: Vec<&[u8]> = inputs.iter().map(Vec::as_slice).collect();

    let mut group = c.benchmark_group("pool");
    group.throughput(Throughput::Elements(refs.len() as u64));
    for engines in [1usize, 2, 4] {
        let pool = EnginePool::new(
            b"[:digit:]+",
            PoolConfig::default()
                .with_engines(engines)
                .with_engine_config(EngineConfig::new().with_home(home.clone())),
        )
        .unwrap();
        group.bench_with_input(BenchmarkId::new("engines", engines), &engines, |b, _| {
            b.iter(|| black_box(pool.match_batch("json", &refs).unwrap()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encoders, bench_governor, bench_pool);
criterion_main!(benches);
