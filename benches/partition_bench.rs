//! End-to-end benchmarks for the Partition Manager: bulk insert, forced
//! HNSW build, and cross-partition `findNearest`/`findNearestHnsw`.
//!
//! Run with: `cargo bench --bench partition_bench`

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use shardvec::config::ManagerConfig;
use shardvec::partition::{PartitionManager, SearchOptions};
use tempfile::TempDir;

const SEED: u64 = 42;
const DIMS: usize = 128;

fn generate_vectors(count: usize, dims: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..count)
        .map(|_| (0..dims).map(|_| rng.gen_range(-1.0..1.0)).collect())
        .collect()
}

fn seeded_manager(n: usize) -> (TempDir, PartitionManager) {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = ManagerConfig::new(dir.path());
    config.partition_capacity = n.max(1) as u64;
    let mut db = PartitionManager::new(config);
    db.initialize().expect("initialize");
    for v in generate_vectors(n, DIMS, SEED) {
        db.add_vector(None, v, None).expect("add_vector");
    }
    (dir, db)
}

fn bench_bulk_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition_bulk_insert");
    for n in [100usize, 1_000] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |bencher, &n| {
            bencher.iter_batched(
                || {
                    let dir = tempfile::tempdir().expect("tempdir");
                    let mut config = ManagerConfig::new(dir.path());
                    config.partition_capacity = n.max(1) as u64;
                    let mut db = PartitionManager::new(config);
                    db.initialize().expect("initialize");
                    (dir, db, generate_vectors(n, DIMS, SEED))
                },
                |(_dir, mut db, vectors)| {
                    for v in vectors {
                        db.add_vector(None, v, None).expect("add_vector");
                    }
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_find_nearest(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition_find_nearest");
    for n in [1_000usize] {
        let (_dir, db) = seeded_manager(n);
        let query = generate_vectors(1, DIMS, SEED + 1).remove(0);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |bencher, _| {
            bencher.iter(|| db.find_nearest(&query, 10, &SearchOptions::default()));
        });
    }
    group.finish();
}

fn bench_find_nearest_hnsw(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition_find_nearest_hnsw");
    for n in [1_000usize] {
        let (_dir, mut db) = seeded_manager(n);
        db.build_index_hnsw(None, None).expect("build index");
        let query = generate_vectors(1, DIMS, SEED + 1).remove(0);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |bencher, _| {
            bencher.iter(|| db.find_nearest_hnsw(&query, 10, &SearchOptions::default()));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_bulk_insert,
    bench_find_nearest,
    bench_find_nearest_hnsw
);
criterion_main!(benches);
