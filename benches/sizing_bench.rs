use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use swarm_trader::coordinator::types::{jittered_sol, percent_of_position};
use swarm_trader::mirror::types::{copy_amount, MirrorConfig};

fn bench_copy_sizing(c: &mut Criterion) {
    let config = MirrorConfig {
        multiplier: 0.5,
        min_per_trade_sol: 0.01,
        max_per_trade_sol: 0.2,
        ..Default::default()
    };

    c.bench_function("copy_amount_clamp", |b| {
        b.iter(|| copy_amount(black_box(0.8), black_box(&config)))
    });

    c.bench_function("percent_of_position", |b| {
        b.iter(|| percent_of_position(black_box(1_000_000), black_box(50.0)))
    });

    c.bench_function("jittered_sol", |b| {
        b.iter(|| jittered_sol(black_box(0.1), black_box(10.0)))
    });
}

criterion_group!(benches, bench_copy_sizing);
criterion_main!(benches);
