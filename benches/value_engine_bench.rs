// benches/value_engine_bench.rs
//! Benchmark: value engine refresh cost
//!
//! Every inbound query refreshes one provider before the reply, so
//! `compute_value` sits on the request path.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;
use snmpsim_engine::model::{ProviderDefinition, UpdatePattern, ValueType};
use snmpsim_engine::simulation::{compute_value, Sample};

fn provider(pattern: UpdatePattern) -> ProviderDefinition {
    ProviderDefinition::new("bench", "1.3.6.1.4.1.99999.1".parse().unwrap(), pattern)
        .with_value_type(ValueType::Gauge)
        .with_interval(1_000)
}

fn bench_compute_value(c: &mut Criterion) {
    let mut group = c.benchmark_group("compute_value");
    let mut rng = StdRng::seed_from_u64(42);

    let range = provider(UpdatePattern::range("0.00", "1000.00").unwrap());
    group.bench_function("range/fresh", |b| {
        b.iter(|| black_box(compute_value(&range, None, black_box(10_000), &mut rng).unwrap()));
    });

    let held = compute_value(&range, None, 10_000, &mut rng).unwrap().sample;
    group.bench_function("range/throttled", |b| {
        b.iter(|| {
            black_box(compute_value(&range, Some(&held), black_box(10_500), &mut rng).unwrap())
        });
    });

    let ramp = provider(UpdatePattern::ramp("-40.5", "85.25").unwrap());
    let mut now = 0u64;
    group.bench_function("ramp", |b| {
        b.iter(|| {
            now += 7;
            black_box(compute_value(&ramp, None, now, &mut rng).unwrap())
        });
    });

    let random = provider(UpdatePattern::random(["1", "2", "3", "5", "8", "13"]).unwrap());
    let previous: Option<Sample> = None;
    group.bench_function("random/fresh", |b| {
        b.iter(|| {
            black_box(compute_value(&random, previous.as_ref(), black_box(0), &mut rng).unwrap())
        });
    });

    group.finish();
}

criterion_group!(benches, bench_compute_value);
criterion_main!(benches);
