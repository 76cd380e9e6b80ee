// Criterion benchmarks for weighted node selection
//
// Run benchmarks with:
//   cargo bench -p wirebridge-client

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use wirebridge_client::{NodePool, WeightedPool};
use wirebridge_common::{Balancer, Node, NodeFilter};

const SERVICE: &str = "default/helloworld";

fn populated(balancer: Balancer, nodes: usize) -> WeightedPool {
    let pool = WeightedPool::with_balancer(balancer);
    for i in 0..nodes {
        pool.upsert(&format!("{SERVICE}/10.0.{}.{}:9000", i / 256, i % 256), (i % 50) as u32 + 1);
    }
    pool
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");

    for nodes in [4usize, 32, 256] {
        for balancer in [Balancer::WeightedRoundRobin, Balancer::WeightedRandom] {
            let pool = populated(balancer, nodes);
            group.bench_with_input(
                BenchmarkId::new(format!("{:?}", balancer), nodes),
                &nodes,
                |b, _| b.iter(|| pool.resolve(black_box(SERVICE), &[])),
            );
        }
    }

    group.finish();
}

fn bench_filtered(c: &mut Criterion) {
    let pool = populated(Balancer::WeightedRoundRobin, 64);
    let even: NodeFilter = Arc::new(|nodes: Vec<Node>| {
        nodes.into_iter().filter(|n| n.weight % 2 == 0).collect()
    });

    c.bench_function("resolve_filtered", |b| {
        b.iter(|| pool.resolve(black_box(SERVICE), std::slice::from_ref(&even)))
    });
}

fn bench_upsert(c: &mut Criterion) {
    let pool = populated(Balancer::WeightedRoundRobin, 256);
    c.bench_function("upsert_existing", |b| {
        b.iter(|| pool.upsert(black_box("default/helloworld/10.0.0.7:9000"), 25))
    });
}

criterion_group!(benches, bench_resolve, bench_filtered, bench_upsert);
criterion_main!(benches);
