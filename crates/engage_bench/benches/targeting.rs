//! Targeting benchmarks: criteria evaluation and interaction resolution.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use engage_bench::generate_facts;
use engage_targeting::{evaluate, resolve, Criterion as Criteria, EventName, Operator, RuleSet};
use engage_testkit::{rule_set, TestEngine, LAUNCH_SURVEY_RULES, LAYERED_RULES};

/// Benchmark parsing a rule payload.
fn bench_parse_rules(c: &mut Criterion) {
    c.bench_function("parse_layered_rules", |b| {
        b.iter(|| {
            let rules = RuleSet::from_json(black_box(LAYERED_RULES.as_bytes())).unwrap();
            black_box(rules);
        });
    });
}

/// Benchmark evaluating a single comparison against snapshots of growing size.
fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate");
    let criterion = Criteria::compare(
        "code_point/local#app#event_0/invokes/total",
        Operator::Gte,
        1,
    );

    for count in [1, 10, 100, 1000].iter() {
        let facts = generate_facts(*count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &facts, |b, facts| {
            b.iter(|| black_box(evaluate(black_box(&criterion), facts)));
        });
    }

    group.finish();
}

/// Benchmark resolving events against the layered fixture.
fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");
    let rules = rule_set(LAYERED_RULES);
    let facts = generate_facts(10);

    let events = [
        ("launch", EventName::local("launch")),
        ("checkout", EventName::new("com.acme", "checkout", "done")),
        ("no_targets", EventName::local("exit")),
    ];
    for (name, event) in events.iter() {
        group.bench_function(*name, |b| {
            b.iter(|| black_box(resolve(&rules, black_box(event), &facts)));
        });
    }

    group.finish();
}

/// Benchmark recording an event through the engine, including persistence.
fn bench_record_event(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_event");

    group.bench_function("memory", |b| {
        let t = TestEngine::memory();
        t.install(LAUNCH_SURVEY_RULES);
        b.iter(|| black_box(t.record_local_event(black_box("launch"))));
    });

    group.sample_size(20);
    group.bench_function("file", |b| {
        let t = TestEngine::file();
        t.install(LAUNCH_SURVEY_RULES);
        b.iter(|| black_box(t.record_local_event(black_box("launch"))));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_parse_rules,
    bench_evaluate,
    bench_resolve,
    bench_record_event,
);

criterion_main!(benches);
