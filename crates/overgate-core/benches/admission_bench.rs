// Criterion benchmarks for overgate-core
//
// Run benchmarks with:
//   cargo bench -p overgate-core
//
// For detailed output with plots:
//   cargo bench -p overgate-core -- --save-baseline main

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use overgate_core::{Controller, ControllerConfig};
use std::collections::HashMap;
use std::time::Duration;

fn controller(refill_rate: u64) -> Controller {
    let mut slo = HashMap::new();
    for name in ["method_a", "method_b", "method_c", "method_d", "method_e"] {
        slo.insert(name.to_string(), Duration::from_millis(100));
    }
    Controller::new(ControllerConfig::new(slo, u64::MAX / 2, refill_rate, false)).unwrap()
}

fn bench_allow(c: &mut Criterion) {
    let mut group = c.benchmark_group("allow");

    // Capacity large enough that the bucket never empties mid-run.
    let ctrl = controller(1_000_000);

    group.bench_function("single_method", |b| {
        b.iter(|| ctrl.allow(black_box("method_a")).unwrap());
    });

    let methods = ["method_a", "method_b", "method_c", "method_d", "method_e"];
    group.bench_function("five_methods", |b| {
        b.iter(|| {
            for method in &methods {
                ctrl.allow(black_box(method)).unwrap();
            }
        });
    });

    group.finish();
}

fn bench_post_process(c: &mut Criterion) {
    let mut group = c.benchmark_group("post_process");

    let ctrl = controller(0);

    group.bench_function("single_record", |b| {
        b.iter(|| {
            ctrl.post_process(black_box("method_a"), black_box(Duration::from_millis(42)))
                .unwrap();
        });
    });

    group.finish();
}

fn bench_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate_once");

    let ctrl = controller(0);

    group.bench_function("five_methods_1000_samples", |b| {
        b.iter_batched(
            || {
                for i in 0..1000u64 {
                    let method = ["method_a", "method_b", "method_c", "method_d", "method_e"]
                        [(i % 5) as usize];
                    ctrl.post_process(method, Duration::from_micros(i)).unwrap();
                }
            },
            |_| ctrl.aggregate_once(),
            criterion::BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_allow, bench_post_process, bench_aggregate);
criterion_main!(benches);
