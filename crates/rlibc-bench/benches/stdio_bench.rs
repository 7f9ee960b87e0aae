//! Stdio benchmarks: formatting, scanning and buffered stream writes.
//!
//! Stream writes run against the in-memory system so the numbers measure
//! buffering, not the kernel.

use criterion::{
    BatchSize, BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main,
};
use rlibc_core::stdio::{BufMode, FormatArg, Stream, format_bounded, format_to_vec, scan_slice};
use rlibc_core::sys::STDOUT_FILENO;
use rlibc_core::sys::sim::SimSys;

fn bench_format(c: &mut Criterion) {
    let mut group = c.benchmark_group("printf");

    group.bench_function("mixed_conversions", |b| {
        b.iter(|| {
            let out = format_to_vec(
                black_box(b"%s=%-8d|%08.3f|%#x|%c\n"),
                &[
                    FormatArg::Str(Some(b"answer")),
                    FormatArg::Int(42),
                    FormatArg::Float(3.14159),
                    FormatArg::Uint(0xbeef),
                    FormatArg::Char(b'!'),
                ],
            );
            black_box(out);
        });
    });

    group.bench_function("snprintf_truncating", |b| {
        let mut buf = [0u8; 16];
        b.iter(|| {
            let total = format_bounded(
                &mut buf,
                black_box(b"%s %s %s"),
                &[
                    FormatArg::Str(Some(b"a fairly long string")),
                    FormatArg::Str(Some(b"that will not fit")),
                    FormatArg::Str(None),
                ],
            );
            black_box(total);
        });
    });

    group.finish();
}

fn bench_scan(c: &mut Criterion) {
    c.bench_function("sscanf_int_word_hex", |b| {
        b.iter(|| {
            let result = scan_slice(black_box(b"  -12345 token 0x7f"), b"%d %s %x");
            black_box(result.c_return());
        });
    });
}

fn bench_stream_write(c: &mut Criterion) {
    let line = b"the quick brown fox jumps over the lazy dog\n";
    let lines = 256;
    let mut group = c.benchmark_group("stream_write");
    group.throughput(Throughput::Bytes((line.len() * lines) as u64));

    for (name, mode) in [
        ("full", BufMode::Full),
        ("line", BufMode::Line),
        ("none", BufMode::None),
    ] {
        group.bench_with_input(BenchmarkId::new("mode", name), &mode, |b, &mode| {
            b.iter_batched(
                || (SimSys::new(), Stream::standard(STDOUT_FILENO, 8192, mode)),
                |(mut sys, mut stream)| {
                    for _ in 0..lines {
                        stream.write_bytes(&mut sys, line).expect("write");
                    }
                    stream.flush(&mut sys).expect("flush");
                    black_box(sys.stdout().len());
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_format, bench_scan, bench_stream_write);
criterion_main!(benches);
