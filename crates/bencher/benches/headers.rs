use std::hint::black_box;

use bencher::header_cases;
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use micro_client::codec::{decode_header_lines, HeaderEncoder};
use micro_client::Headers;
use tokio_util::bytes::BytesMut;
use tokio_util::codec::Encoder;

fn benchmark_header_decode(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("header_decode");

    for case in header_cases() {
        let lines = case.lines();
        group.throughput(Throughput::Bytes(case.file().content().len() as u64));
        group.bench_with_input(BenchmarkId::new(case.name(), case.parameter()), &lines, |b, lines| {
            b.iter(|| black_box(decode_header_lines(lines.as_slice())));
        });
    }

    group.finish();
}

fn benchmark_layered_encode(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("layered_encode");

    for case in header_cases() {
        let defaults = decode_header_lines(case.lines().as_slice());
        let headers = Headers::new();
        headers.get_defaults_from(&defaults).expect("fresh layers never form a cycle");
        headers.set("X-Trace", "bench");
        headers.set("Content-Type", "application/octet-stream");

        group.throughput(Throughput::Elements(headers.header_count() as u64));
        group.bench_with_input(BenchmarkId::new(case.name(), case.parameter()), &headers, |b, headers| {
            let mut encoder = HeaderEncoder;
            b.iter_batched_ref(
                || BytesMut::with_capacity(4096),
                |dst| {
                    encoder.encode(headers, dst).expect("fixture headers are valid");
                    black_box(dst);
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(headers, benchmark_header_decode, benchmark_layered_encode);
criterion_main!(headers);
