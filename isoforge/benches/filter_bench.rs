//! Benchmarks for tool output filtering.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use isoforge::process::OutputFilter;

fn authoring_stderr(lines: usize) -> String {
    (1..=lines)
        .map(|i| format!("{:5.2}% done, estimate finish Mon Jan  1 00:00:{:02} 2024", i as f64 / 10.0, i % 60))
        .collect::<Vec<_>>()
        .join("\n")
}

fn filter_benchmark(c: &mut Criterion) {
    let noisy = authoring_stderr(1_000);
    let head_tail = OutputFilter::head_tail(7, 6);
    c.bench_function("head_tail_1000_lines", |b| {
        b.iter(|| black_box(head_tail.apply(black_box(&noisy))))
    });

    let unmount = format!("Committing changes\n{}\nUsing XPRESS compression with 8 threads\n{noisy}", "x".repeat(80));
    let truncate = OutputFilter::truncate_at("Using XPRESS compression with");
    c.bench_function("truncate_at_marker", |b| {
        b.iter(|| black_box(truncate.apply(black_box(&unmount))))
    });
}

criterion_group!(benches, filter_benchmark);
criterion_main!(benches);
