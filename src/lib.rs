//! # Trueno-DP: Differential Privacy over Arrow Tables
//!
//! **Version**: 0.1.0
//!
//! Trueno-DP answers two kinds of requests over a tabular dataset:
//!
//! - exact or ε-budgeted aggregates (`len`, `sum`, `mean`) with Laplace and
//!   geometric noise calibrated to declared attribute bounds;
//! - synthetic samples built by discretizing attributes, applying randomized
//!   response, and walking attribute combinations level by level.
//!
//! ## Pipeline
//!
//! ```text
//! Dataset ──discretize──> DiscretizedTable ──randomize(pf)──> randomized table
//!                │                                                  │
//!                └────────── Mapping / ReverseMapping ──────> Sampler ──> SyntheticRecord*
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use trueno_dp::config::SamplerConfig;
//! use trueno_dp::dataset::{Dataset, Schema};
//! use rand::SeedableRng;
//!
//! let schema = Schema::builder().integer("age", 0, 100).categorical("city").build()?;
//! let dataset = Dataset::load_parquet(schema, "data/people.parquet")?;
//!
//! let config = SamplerConfig::from_json(r#"{"max_depth": 2, "limit": 50, "target": {"city": "A"}}"#)?;
//! let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(42);
//! for record in dataset.randomized_sample(&config, &mut rng)? {
//!     println!("{:?}", record?.values());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod backend;
pub mod config;
pub mod dataset;
pub mod discretize;
pub mod error;
pub mod expr;
pub mod mechanism;
pub mod privacy;
pub mod sampler;
pub mod storage;
pub mod topk;

pub use config::SamplerConfig;
pub use dataset::{Attribute, AttributeType, Dataset, Schema, Value};
pub use discretize::{discretize, DiscretizedTable, Mapping, ReverseMapping};
pub use error::{Error, Result};
pub use expr::{Evaluate, EvaluationMode, Expression, Output};
pub use mechanism::Mechanism;
pub use privacy::{epsilon, epsilon_flip, randomize, PrivacyParameters, RandomizationMethod};
pub use sampler::{sample, SampleTables, Sampler, SamplerOptions, Source, SyntheticRecord};
