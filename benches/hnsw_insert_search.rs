//! HNSW insert/search benchmarks.
//!
//! Run with: cargo bench --bench hnsw_insert_search
//!
//! Exercises [`vg_index::VectorIndex`] directly — no storage, graph, or
//! mode-gating overhead — to isolate the HNSW hot path across dimension
//! and index-size scaling.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;
use vg_core::NounId;
use vg_index::{VectorIndex, VectorIndexConfig};
use vg_storage::MemoryAdapter;

const BENCH_SEED: u64 = 0xDEADBEEF_CAFEBABE;

fn lcg_next(state: &mut u64) -> u64 {
    *state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
    *state
}

fn random_vector(dimension: usize, seed: u64) -> Vec<f32> {
    let mut state = seed;
    (0..dimension)
        .map(|_| {
            let bits = lcg_next(&mut state);
            (bits as f32 / u64::MAX as f32) * 2.0 - 1.0
        })
        .collect()
}

const DIMENSIONS: [usize; 3] = [128, 384, 768];
const INDEX_SIZES: [usize; 3] = [100, 1_000, 10_000];
const K_VALUES: [usize; 3] = [1, 10, 100];

fn populated_index(dimension: usize, size: usize) -> VectorIndex {
    let index = VectorIndex::new(VectorIndexConfig::for_dimensions(dimension));
    for i in 0..size {
        let vector = random_vector(dimension, BENCH_SEED.wrapping_add(i as u64));
        index.insert(NounId::new(), vector).expect("insert");
    }
    index
}

fn hnsw_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("hnsw_insert");
    group.measurement_time(Duration::from_secs(5));

    for dimension in &DIMENSIONS {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("dim", dimension), dimension, |b, &dimension| {
            let index = VectorIndex::new(VectorIndexConfig::for_dimensions(dimension));
            let mut seed = BENCH_SEED;
            b.iter(|| {
                let vector = random_vector(dimension, seed);
                seed = lcg_next(&mut seed);
                index.insert(NounId::new(), vector).expect("insert");
            });
        });
    }

    group.finish();
}

fn hnsw_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("hnsw_search");
    group.measurement_time(Duration::from_secs(10));
    let dimension = 384;
    let storage = MemoryAdapter::new();

    for &size in &INDEX_SIZES {
        let index = populated_index(dimension, size);

        for k in &K_VALUES {
            if *k > size {
                continue;
            }
            group.throughput(Throughput::Elements(*k as u64));
            group.bench_with_input(BenchmarkId::new(format!("n_{size}/k"), k), k, |b, &k| {
                let rt = tokio::runtime::Runtime::new().unwrap();
                let mut seed = BENCH_SEED;
                b.iter(|| {
                    let query = random_vector(dimension, seed);
                    seed = lcg_next(&mut seed);
                    black_box(rt.block_on(index.search(&query, k, &storage)).expect("search"))
                });
            });
        }
    }

    group.finish();
}

fn hnsw_dimension_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("hnsw_dimension_scaling");
    group.measurement_time(Duration::from_secs(5));
    let size = 1_000;
    let k = 10;
    let storage = MemoryAdapter::new();
    let rt = tokio::runtime::Runtime::new().unwrap();

    for dimension in &DIMENSIONS {
        let index = populated_index(*dimension, size);

        group.bench_function(format!("search/dim_{dimension}"), |b| {
            let mut seed = BENCH_SEED;
            b.iter(|| {
                let query = random_vector(*dimension, seed);
                seed = lcg_next(&mut seed);
                black_box(rt.block_on(index.search(&query, k, &storage)).expect("search"))
            });
        });
    }

    group.finish();
}

criterion_group!(
    name = hnsw_benches;
    config = Criterion::default().sample_size(30);
    targets = hnsw_insert, hnsw_search, hnsw_dimension_scaling,
);

criterion_main!(hnsw_benches);
