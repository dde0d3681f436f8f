//! Profile diff benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use engage_bench::{generate_record, mutate_record};
use engage_codec::{decode_versioned, encode_versioned};
use engage_core::{diff, ProfileKind, ProfileRecord};

/// Benchmark diffing records of growing width.
fn bench_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff");

    for fields in [8, 64, 512].iter() {
        let baseline = generate_record(*fields);
        let current = mutate_record(&baseline, 4);
        group.throughput(Throughput::Elements(*fields as u64));
        group.bench_with_input(BenchmarkId::new("changed", fields), fields, |b, _| {
            b.iter(|| black_box(diff(Some(black_box(&baseline)), black_box(&current))));
        });
        group.bench_with_input(BenchmarkId::new("unchanged", fields), fields, |b, _| {
            b.iter(|| black_box(diff(Some(black_box(&baseline)), black_box(&baseline))));
        });
    }

    group.finish();
}

/// Benchmark applying a diff and building its wire body.
fn bench_apply_and_encode(c: &mut Criterion) {
    let baseline = generate_record(64);
    let current = mutate_record(&baseline, 4);
    let Some(changes) = diff(Some(&baseline), &current) else {
        return;
    };

    c.bench_function("apply_diff_64", |b| {
        b.iter(|| {
            let mut record = baseline.clone();
            changes.apply_to(black_box(&mut record));
            black_box(record);
        });
    });

    c.bench_function("diff_payload_body_64", |b| {
        b.iter(|| black_box(changes.to_payload_body(ProfileKind::Person).unwrap()));
    });
}

/// Benchmark persisting a baseline record.
fn bench_baseline_codec(c: &mut Criterion) {
    let record = generate_record(64);
    let bytes = encode_versioned(1, &record).unwrap();

    c.bench_function("baseline_encode_64", |b| {
        b.iter(|| black_box(encode_versioned(1, black_box(&record)).unwrap()));
    });

    c.bench_function("baseline_decode_64", |b| {
        b.iter(|| {
            let decoded: ProfileRecord = decode_versioned(1, black_box(&bytes)).unwrap();
            black_box(decoded);
        });
    });
}

criterion_group!(benches, bench_diff, bench_apply_and_encode, bench_baseline_codec);

criterion_main!(benches);
