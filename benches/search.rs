use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use paper_rag::retrieval::FlatIndex;
use std::hint::black_box;

const DIMENSION: usize = 384;

fn pseudo_random_rows(count: usize) -> Vec<Vec<f32>> {
    let mut state = 0x2545_f491_4f6c_dd1d_u64;
    (0..count)
        .map(|_| {
            (0..DIMENSION)
                .map(|_| {
                    state ^= state << 13;
                    state ^= state >> 7;
                    state ^= state << 17;
                    (state % 2000) as f32 / 1000.0 - 1.0
                })
                .collect()
        })
        .collect()
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("flat_search");
    for chunks in [16, 256, 4096] {
        let rows = pseudo_random_rows(chunks + 1);
        let query = rows[chunks].clone();
        let index = FlatIndex::from_rows(&rows[..chunks]).expect("rows share a dimension");

        group.bench_with_input(BenchmarkId::from_parameter(chunks), &index, |b, index| {
            b.iter(|| index.search(black_box(&query), black_box(3)))
        });
    }
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
