//! Benchmarks the calibrator itself and the calibrated busy body it hands to
//! every executor thread, so a change to either can be checked against the
//! 500ms startup budget (§4.A) without spinning up a whole server.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use taskd_executor::{busy_work, Calibration};

fn bench_measure(c: &mut Criterion) {
    c.bench_function("calibration_measure", |b| {
        b.iter(Calibration::measure);
    });
}

fn bench_busy_work(c: &mut Criterion) {
    let mut group = c.benchmark_group("busy_work");
    for iterations in [1_000u64, 10_000, 100_000] {
        group.bench_with_input(
            BenchmarkId::from_parameter(iterations),
            &iterations,
            |b, &iterations| {
                b.iter(|| busy_work(black_box(iterations)));
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_measure, bench_busy_work);
criterion_main!(benches);
