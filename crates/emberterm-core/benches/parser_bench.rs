//! Feed-path throughput benchmarks.

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

use emberterm_core::Terminal;

fn plain_ascii(c: &mut Criterion) {
    let mut line = b"The quick brown fox jumps over the lazy dog. ".repeat(40);
    line.push(b'\r');
    line.push(b'\n');
    let chunk: Vec<u8> = line.repeat(64);

    let mut group = c.benchmark_group("feed");
    group.throughput(Throughput::Bytes(chunk.len() as u64));
    group.bench_function("plain_ascii", |b| {
        let mut term = Terminal::new(200, 50, 10_000);
        b.iter(|| term.feed(black_box(&chunk)));
    });
    group.finish();
}

fn sgr_heavy(c: &mut Criterion) {
    let mut chunk = Vec::new();
    for i in 0..2_000u32 {
        let seq = format!("\x1b[1;3{};4{}mstyled\x1b[0m ", i % 8, (i + 3) % 8);
        chunk.extend_from_slice(seq.as_bytes());
    }

    let mut group = c.benchmark_group("feed");
    group.throughput(Throughput::Bytes(chunk.len() as u64));
    group.bench_function("sgr_heavy", |b| {
        let mut term = Terminal::new(200, 50, 10_000);
        b.iter(|| term.feed(black_box(&chunk)));
    });
    group.finish();
}

fn utf8_cjk(c: &mut Criterion) {
    let mut line = "端末エミュレータの再流し込み性能試験。".repeat(16);
    line.push_str("\r\n");
    let chunk: Vec<u8> = line.repeat(64).into_bytes();

    let mut group = c.benchmark_group("feed");
    group.throughput(Throughput::Bytes(chunk.len() as u64));
    group.bench_function("utf8_cjk", |b| {
        let mut term = Terminal::new(200, 50, 10_000);
        b.iter(|| term.feed(black_box(&chunk)));
    });
    group.finish();
}

fn scroll_pressure(c: &mut Criterion) {
    let chunk: Vec<u8> = b"line of text pushed through the scroll region\r\n".repeat(512);

    let mut group = c.benchmark_group("feed");
    group.throughput(Throughput::Bytes(chunk.len() as u64));
    group.bench_function("scroll_pressure", |b| {
        let mut term = Terminal::new(80, 24, 10_000);
        b.iter(|| term.feed(black_box(&chunk)));
    });
    group.finish();
}

fn snapshot_production(c: &mut Criterion) {
    let mut term = Terminal::new(200, 50, 10_000);
    term.feed(&b"some visible content to pack\r\n".repeat(40));

    c.bench_function("snapshot", |b| {
        b.iter(|| {
            term.feed(b"x");
            black_box(term.snapshot());
        });
    });
}

criterion_group!(
    benches,
    plain_ascii,
    sgr_heavy,
    utf8_cjk,
    scroll_pressure,
    snapshot_production
);
criterion_main!(benches);
