//! Sampling pipeline benchmarks
//!
//! - Discretization of a dataset
//! - Randomized response over the code table
//! - Full breadth-first sampling (sequential vs parallel expansion sizes)
//!
//! Toyota Way: Measure before optimizing (Genchi Genbutsu)

use arrow::array::{Int32Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema as ArrowSchema};
use arrow::record_batch::RecordBatch;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use trueno_dp::{discretize, randomize, Dataset, SamplerConfig, Schema};

/// Dataset with `age` (0..=100), `city` (10 values) and `segment` (4 values)
fn create_dataset(num_rows: i32) -> Dataset {
    let schema = ArrowSchema::new(vec![
        Field::new("age", DataType::Int32, false),
        Field::new("city", DataType::Utf8, false),
        Field::new("segment", DataType::Utf8, false),
    ]);
    let ages = Int32Array::from_iter_values((0..num_rows).map(|i| (i * 37) % 101));
    let cities = StringArray::from_iter_values((0..num_rows).map(|i| format!("city_{}", i % 10)));
    let segments = StringArray::from_iter_values((0..num_rows).map(|i| format!("seg_{}", i % 4)));
    let batch = RecordBatch::try_new(
        Arc::new(schema),
        vec![Arc::new(ages), Arc::new(cities), Arc::new(segments)],
    )
    .unwrap();

    let schema = Schema::builder()
        .integer("age", 0, 100)
        .categorical("city")
        .categorical("segment")
        .build()
        .unwrap();
    Dataset::from_batches(schema, vec![batch]).unwrap()
}

fn bench_discretize(c: &mut Criterion) {
    let mut group = c.benchmark_group("discretize");

    for size in [1_000, 10_000, 100_000].iter() {
        let dataset = create_dataset(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(discretize::<&str>(&dataset, &[]).unwrap()));
        });
    }

    group.finish();
}

fn bench_randomize(c: &mut Criterion) {
    let mut group = c.benchmark_group("randomize");

    for size in [10_000, 100_000].iter() {
        let (table, _, _) = discretize::<&str>(&create_dataset(*size), &[]).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            let mut rng = ChaCha8Rng::seed_from_u64(1);
            b.iter(|| black_box(randomize(&table, 0.27, true, &mut rng).unwrap()));
        });
    }

    group.finish();
}

fn bench_randomized_sample(c: &mut Criterion) {
    let mut group = c.benchmark_group("randomized_sample");
    let dataset = create_dataset(20_000);

    for max_depth in [1usize, 2, 3].iter() {
        let config = SamplerConfig {
            max_depth: *max_depth,
            interleave: 0.5,
            ..SamplerConfig::default()
        };
        group.bench_with_input(BenchmarkId::from_parameter(max_depth), max_depth, |b, _| {
            let mut rng = ChaCha8Rng::seed_from_u64(2);
            b.iter(|| {
                let count = dataset
                    .randomized_sample(&config, &mut rng)
                    .unwrap()
                    .count();
                black_box(count);
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_discretize,
    bench_randomize,
    bench_randomized_sample
);
criterion_main!(benches);
