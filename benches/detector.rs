use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use binwatch::{Bin, BinId, BinSnapshot, BinStatus, ChangeDetector};

fn make_snapshot(bins: u32, full_every: u32, phase: u32) -> BinSnapshot {
    BinSnapshot::from_bins((0..bins).map(|i| {
        let full = (i + phase) % full_every == 0;
        let (level, status) = if full {
            (95, BinStatus::Full)
        } else {
            (40, BinStatus::Normal)
        };
        Bin::new(BinId::new(format!("bin{i:05}")).unwrap(), level, status).unwrap()
    }))
}

fn bench_observe_steady(c: &mut Criterion) {
    // No transitions after the first pass: measures the cache-hit path.
    let snapshot = make_snapshot(2_000, 7, 0);
    let mut group = c.benchmark_group("detector");
    group.throughput(Throughput::Elements(snapshot.len() as u64));
    group.bench_function("observe_steady_2k", |b| {
        let mut detector = ChangeDetector::new(90);
        detector.seed(&snapshot);
        b.iter(|| black_box(detector.observe(black_box(&snapshot))));
    });
    group.finish();
}

fn bench_observe_churn(c: &mut Criterion) {
    // Alternating phases so a seventh of the bins enter FULL on every pass.
    let snapshots = [make_snapshot(2_000, 7, 0), make_snapshot(2_000, 7, 3)];
    let mut group = c.benchmark_group("detector");
    group.throughput(Throughput::Elements(2_000));
    group.bench_function("observe_churn_2k", |b| {
        let mut detector = ChangeDetector::new(90);
        let mut turn = 0usize;
        b.iter(|| {
            turn ^= 1;
            black_box(detector.observe(&snapshots[turn]))
        });
    });
    group.finish();
}

criterion_group!(benches, bench_observe_steady, bench_observe_churn);
criterion_main!(benches);
