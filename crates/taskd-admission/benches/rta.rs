//! Benchmarks the cost of one admission decision as the prospective active
//! set grows, since `admit` re-runs RTA over every task in the set rather
//! than only the candidate (see `is_schedulable`'s doc comment).

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use taskd_admission::admit;
use taskd_catalog::Catalog;

fn bench_admit(c: &mut Criterion) {
    let catalog = Catalog::builtin();
    let mut group = c.benchmark_group("admit");

    for active_len in [0usize, 4, 8, 16] {
        let t1 = catalog.lookup("t1").unwrap().clone();
        let active = vec![t1; active_len];

        group.bench_with_input(
            BenchmarkId::from_parameter(active_len),
            &active,
            |b, active| {
                b.iter(|| admit(black_box(&catalog), black_box(active), "t1", 64));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_admit);
criterion_main!(benches);
