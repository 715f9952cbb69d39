//! Synthetic sampling end to end
//!
//! This demo:
//! - Builds a 1000-row people table (age, city)
//! - Answers exact and budgeted aggregates
//! - Draws a synthetic sample forced to `city = "A"`
//!
//! Run with: `RUST_LOG=trueno_dp=debug cargo run --example synthetic_sample`

use anyhow::Context;
use arrow::array::{Int32Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema as ArrowSchema};
use arrow::record_batch::RecordBatch;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use trueno_dp::{Dataset, Evaluate, EvaluationMode, SamplerConfig, Schema};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== Trueno-DP Synthetic Sample ===\n");

    let dataset = people(1_000)?;
    println!("  ✓ Dataset: {} rows\n", dataset.num_rows());

    let mut rng = ChaCha8Rng::seed_from_u64(42);

    println!("Aggregates (exact vs ε = 1.0):");
    let age = dataset.attribute("age")?;
    for (name, expr) in [("len", dataset.len()), ("sum(age)", age.sum()), ("mean(age)", age.mean())] {
        let exact = expr.evaluate(EvaluationMode::Exact, &mut rng)?.as_scalar();
        let noisy = expr.evaluate(EvaluationMode::Budgeted(1.0), &mut rng)?.as_scalar();
        println!("  {name:<10} exact={exact:?} noisy={noisy:?}");
    }

    let config = SamplerConfig::from_json(
        r#"{"epsilon": 1.0, "min_depth": 1, "max_depth": 2, "limit": 20, "interleave": 0.5,
            "target": {"city": "A"}}"#,
    )
    .context("parsing sampler config")?;

    println!("\nSynthetic records (city = A, depth 1..=2, limit 20):");
    for record in dataset.randomized_sample(&config, &mut rng)? {
        let record = record?;
        println!(
            "  depth={} source={:?} w_real={:.4} w_rand={:.4} {:?}",
            record.depth(),
            record.source(),
            record.weight_real(),
            record.weight_randomized(),
            record.values()
        );
    }

    Ok(())
}

fn people(num_rows: i32) -> anyhow::Result<Dataset> {
    let arrow_schema = ArrowSchema::new(vec![
        Field::new("age", DataType::Int32, false),
        Field::new("city", DataType::Utf8, false),
    ]);
    let ages = Int32Array::from_iter_values((0..num_rows).map(|i| (i * 37) % 101));
    let cities = StringArray::from_iter_values((0..num_rows).map(|i| ["A", "B", "C"][(i % 3) as usize]));
    let batch = RecordBatch::try_new(Arc::new(arrow_schema), vec![Arc::new(ages), Arc::new(cities)])?;

    let schema = Schema::builder()
        .integer("age", 0, 100)
        .categorical("city")
        .build()?;
    Ok(Dataset::from_batches(schema, vec![batch])?)
}
