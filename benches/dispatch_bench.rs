//! Benchmarks for inbound frame dispatch
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use liveseries::{key, ClientConfig, LiveSeriesClient};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

fn append_frame(series_key: &str, t: u64) -> String {
    json!({
        "type": "append",
        "key": series_key,
        "point": {"t": t, "v": 0.42, "entity": {"namespace": "default", "pod": "nginx"}}
    })
    .to_string()
}

fn init_frame(series: usize, points: usize) -> String {
    let data: serde_json::Map<String, serde_json::Value> = (0..series)
        .map(|s| {
            let samples: Vec<_> = (0..points).map(|t| json!({"t": t, "v": t as f64 * 0.5})).collect();
            (format!("pod-cpu-default/pod-{}", s), json!(samples))
        })
        .collect();

    json!({"type": "init", "groupId": "bench", "data": {"series": data, "capabilities": {}}}).to_string()
}

fn client_with_listeners(per_series: usize) -> (LiveSeriesClient, Arc<AtomicU64>) {
    let client = LiveSeriesClient::new(&ClientConfig::default()).unwrap();
    let hits = Arc::new(AtomicU64::new(0));

    let counter = Arc::clone(&hits);
    client.on(key::APPEND, move |_| {
        counter.fetch_add(1, Ordering::Relaxed);
    });
    for s in 0..per_series {
        let counter = Arc::clone(&hits);
        client.on_append(&format!("pod-cpu-default/pod-{}", s), move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        });
    }

    (client, hits)
}

fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");
    group.throughput(Throughput::Elements(1));

    for listeners in [1, 100, 1000] {
        let (client, _hits) = client_with_listeners(listeners);
        let frame = append_frame("pod-cpu-default/pod-0", 1_699_000_000_000);

        group.bench_function(format!("dispatch_{}_series_listeners", listeners), |b| {
            b.iter(|| client.handle_message(black_box(&frame)))
        });
    }

    let (client, _hits) = client_with_listeners(1);
    let malformed = "{\"type\": \"append\", \"key\": ";
    group.bench_function("malformed", |b| {
        b.iter(|| client.handle_message(black_box(malformed)))
    });

    group.finish();
}

fn bench_init(c: &mut Criterion) {
    let mut group = c.benchmark_group("init");

    for (series, points) in [(10, 100), (100, 100), (10, 3600)] {
        let (client, _hits) = client_with_listeners(0);
        let frame = init_frame(series, points);

        group.throughput(Throughput::Elements((series * points) as u64));
        group.bench_function(format!("backfill_{}x{}", series, points), |b| {
            b.iter(|| client.handle_message(black_box(&frame)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_append, bench_init);
criterion_main!(benches);
