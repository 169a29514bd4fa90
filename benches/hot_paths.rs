use std::sync::Arc;
use std::time::SystemTime;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use telesink::agent::router::{MetricRouter, Route};
use telesink::agent::stats::AgentStats;
use telesink::aggregate::BasicStats;
use telesink::metric::{FieldValue, Metric};
use telesink::output::Aggregator;

fn cpu_metric(core: u32, usage: f64) -> Metric {
    let core = format!("cpu{core}");
    Metric::new(
        "cpu",
        [("cpu", core.as_str()), ("host", "bench-node")],
        [
            ("usage_user", FieldValue::Float(usage)),
            ("usage_system", FieldValue::Float(usage / 2.0)),
            ("usage_idle", FieldValue::Float(100.0 - usage)),
            ("online", FieldValue::Bool(true)),
        ],
        SystemTime::now(),
    )
}

fn sample_metrics() -> Vec<Metric> {
    (0..256u32)
        .map(|i| cpu_metric(i % 32, f64::from(i % 100)))
        .collect()
}

fn bench_basic_stats(c: &mut Criterion) {
    let metrics = sample_metrics();

    c.bench_function("basic_stats/add_256", |b| {
        let agg = BasicStats::default();
        b.iter(|| {
            for m in &metrics {
                agg.add(black_box(m));
            }
        })
    });

    c.bench_function("basic_stats/push_32_series", |b| {
        let agg = BasicStats::default();
        for m in &metrics {
            agg.add(m);
        }
        b.iter(|| {
            let out = agg.push();
            black_box(out.len())
        })
    });
}

fn bench_router(c: &mut Criterion) {
    let metrics = sample_metrics();
    let stats = Arc::new(AgentStats::new());
    let aggregator: Arc<dyn Aggregator> = Arc::new(BasicStats::default());
    let router = MetricRouter::new(
        vec![Route::Aggregating { aggregator }],
        vec![("region".to_string(), "eu-central".to_string())],
        stats,
    );

    c.bench_function("router/add_aggregating_256", |b| {
        b.iter(|| {
            for m in &metrics {
                router.add(black_box(m.clone()));
            }
        })
    });
}

fn bench_suite(c: &mut Criterion) {
    bench_basic_stats(c);
    bench_router(c);
}

criterion_group!(benches, bench_suite);
criterion_main!(benches);
