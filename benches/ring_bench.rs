// Ring Construction and Placement Benchmarks
//
// The ring is rebuilt from the member snapshot on every tick, and every
// client operation resolves a replica triple, so both paths sit on the
// per-tick hot loop.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use gossipdb::{Address, Ring};

const RING_SIZE: u64 = 512;

fn members(count: i32) -> Vec<Address> {
    (1..=count).map(|id| Address::new(id, 0)).collect()
}

fn bench_ring_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_build");
    for size in [4, 16, 64, 256] {
        let snapshot = members(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &snapshot, |b, snapshot| {
            b.iter(|| Ring::build(black_box(snapshot), RING_SIZE));
        });
    }
    group.finish();
}

fn bench_replica_placement(c: &mut Criterion) {
    let mut group = c.benchmark_group("replicas_of");
    for size in [4, 16, 64, 256] {
        let ring = Ring::build(&members(size), RING_SIZE);
        let keys: Vec<String> = (0..128).map(|i| format!("key{i}")).collect();
        group.bench_with_input(BenchmarkId::from_parameter(size), &ring, |b, ring| {
            b.iter(|| {
                for key in &keys {
                    black_box(ring.replicas_of(black_box(key)));
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_ring_build, bench_replica_placement);
criterion_main!(benches);
