use callerid_core::NumberNormalizer;
use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};

const INPUTS: &[&str] = &[
    "(650) 253-0000",
    "1-650-253-0000",
    "555-1234",
    "+44 20 7946 0000",
    "011 81 90 2889 4539",
    "not a number",
];

fn bench_normalize(c: &mut Criterion) {
    let normalizer = NumberNormalizer::new("US").expect("US is supported");
    let mut group = c.benchmark_group("normalize");
    group.throughput(Throughput::Elements(INPUTS.len() as u64));

    group.bench_function("mixed", |b| {
        b.iter(|| {
            for input in INPUTS {
                let _ = black_box(normalizer.normalize(black_box(input)));
            }
        });
    });

    group.bench_function("format", |b| {
        b.iter(|| {
            for input in INPUTS {
                black_box(normalizer.format(black_box(input), None));
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_normalize);
criterion_main!(benches);
