use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use service_runtime::core::stream::{Endian, Stream};

#[allow(clippy::unwrap_used)]
fn bench_primitives(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_primitives");
    let count = 1024usize;
    group.throughput(Throughput::Bytes((count * 8) as u64));

    for endian in [Endian::Big, Endian::Little] {
        group.bench_function(format!("write_u64_{endian:?}"), |b| {
            b.iter_batched(
                || Stream::with_capacity(count * 8).with_endian(endian),
                |mut stream| {
                    for i in 0..count as u64 {
                        stream.write(black_box(i));
                    }
                    stream
                },
                BatchSize::SmallInput,
            )
        });

        let mut source = Stream::new().with_endian(endian);
        for i in 0..count as u64 {
            source.write(i);
        }
        let bytes = source.into_vec();
        group.bench_function(format!("read_u64_{endian:?}"), |b| {
            b.iter_batched(
                || Stream::from_vec(bytes.clone()).with_endian(endian),
                |mut stream| {
                    let mut sum = 0u64;
                    for _ in 0..count {
                        sum = sum.wrapping_add(stream.read::<u64>().unwrap());
                    }
                    sum
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_strings(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_strings");
    let sizes = [16usize, 256, 4096];

    for &size in &sizes {
        let text = "x".repeat(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("string_roundtrip_{size}b"), |b| {
            b.iter(|| {
                let mut stream = Stream::with_capacity(size + 4);
                stream.write_string(black_box(&text)).unwrap();
                let mut reader = Stream::from_vec(stream.into_vec());
                reader.read_string().unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_primitives, bench_strings);
criterion_main!(benches);
