//! Exposition annotation benchmarks
//!
//! Measures `inject_identity` on payloads shaped like a typical sidecar scrape:
//! HELP/TYPE comments, labelled series and bare `name value` samples.
//!
//! Run with: `cargo bench`

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use metrics_k8s_proxy::scrape::exposition::inject_identity;
use std::hint::black_box;

fn payload(families: usize) -> String {
    let mut text = String::new();
    for i in 0..families {
        text.push_str(&format!("# HELP family_{i} Synthetic family {i}\n"));
        text.push_str(&format!("# TYPE family_{i} counter\n"));
        text.push_str(&format!(
            "family_{i}{{direction=\"inbound\",reporter=\"destination\"}} {i}\n"
        ));
        text.push_str(&format!("family_{i}_bare {i}\n"));
    }
    text
}

fn bench_inject_identity(c: &mut Criterion) {
    let mut group = c.benchmark_group("inject_identity");

    for families in [10, 100, 1000] {
        let text = payload(families);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(families), &text, |b, text| {
            b.iter(|| inject_identity(black_box(text), "ztunnel-7x2kq", "istio-system"));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_inject_identity);
criterion_main!(benches);
