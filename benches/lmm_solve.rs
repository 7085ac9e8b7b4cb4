//! Benchmarks the progressive-filling solver's `solve()` pass under a
//! growing number of competing variables, mirroring the teacher's
//! `[[bench]] name = "phold"` (a single hot-path benchmark rather than a
//! full suite).

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use simkernel::lmm::{SharingPolicy, System};

/// Builds a system with `n` variables all competing on one shared
/// bottleneck constraint, plus a private unconstrained constraint each, so
/// the solver must actually iterate rather than converge in one pass.
fn build_system(n: usize) -> System {
    let mut sys = System::new();
    let bottleneck = sys.add_constraint(1_000_000.0, SharingPolicy::Shared);
    for _ in 0..n {
        let private = sys.add_constraint(1_000.0, SharingPolicy::Shared);
        let v = sys.add_variable(1.0, None);
        sys.expand(v, bottleneck, 1.0);
        sys.expand(v, private, 1.0);
    }
    sys
}

fn bench_solve(c: &mut Criterion) {
    let mut group = c.benchmark_group("lmm_solve");
    for &n in &[8usize, 64, 512, 2048] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            let mut sys = build_system(n);
            b.iter(|| {
                black_box(sys.solve());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_solve);
criterion_main!(benches);
