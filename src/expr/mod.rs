//! Expressions over datasets with exact and budgeted evaluation
//!
//! Every expression answers two questions: its value (exact, or with noise
//! calibrated to a budget) and its sensitivity.
//!
//! ```rust
//! use trueno_dp::expr::{Evaluate, EvaluationMode};
//! # use trueno_dp::dataset::{Dataset, Schema};
//! # use arrow::array::{Int32Array, RecordBatch};
//! # use arrow::datatypes::{DataType, Field, Schema as ArrowSchema};
//! # use rand::SeedableRng;
//! # use std::sync::Arc;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let batch = RecordBatch::try_new(
//! #     Arc::new(ArrowSchema::new(vec![Field::new("age", DataType::Int32, false)])),
//! #     vec![Arc::new(Int32Array::from(vec![30, 40, 50]))],
//! # )?;
//! # let schema = Schema::builder().integer("age", 0, 100).build()?;
//! # let dataset = Dataset::from_batches(schema, vec![batch])?;
//! let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(7);
//! let total = dataset.attribute("age")?.sum();
//!
//! let exact = total.evaluate(EvaluationMode::Exact, &mut rng)?.as_scalar();
//! let noisy = total.evaluate(EvaluationMode::Budgeted(1.0), &mut rng)?.as_scalar();
//! assert_eq!(exact, Some(120.0));
//! assert!(noisy.is_some());
//! # Ok(())
//! # }
//! ```

use crate::dataset::{Attribute, Dataset, Value};
use crate::mechanism::Mechanism;
use crate::{Error, Result};
use rand::Rng;

/// How an expression is evaluated
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EvaluationMode {
    /// True value, no privacy protection
    Exact,
    /// Noisy value spending the given epsilon
    Budgeted(f64),
}

/// Result of evaluating an expression
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// Scalar aggregate
    Scalar(f64),
    /// Whole column
    Column(Vec<Value>),
}

impl Output {
    /// Scalar value, if this is a scalar
    #[must_use]
    pub const fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => Some(*v),
            Self::Column(_) => None,
        }
    }
}

/// Capability set shared by every expression
pub trait Evaluate {
    /// Evaluate in the given mode
    ///
    /// # Errors
    /// Returns error if the expression cannot be evaluated in `mode`
    fn evaluate<R: Rng>(&self, mode: EvaluationMode, rng: &mut R) -> Result<Output>;

    /// Maximum change of the result when one record changes
    ///
    /// # Errors
    /// Returns error if the sensitivity is undefined for the expression
    fn sensitivity(&self) -> Result<f64>;
}

/// Expression over a borrowed dataset
#[derive(Debug, Clone, Copy)]
pub enum Expression<'a> {
    /// Number of records
    Length(&'a Dataset),
    /// Raw column values
    Column(Attribute<'a>),
    /// Sum of a numeric column
    Sum(Attribute<'a>),
    /// Mean of a numeric column
    Mean(Attribute<'a>),
}

impl Expression<'_> {
    /// Exact value
    ///
    /// # Errors
    /// Returns error if the underlying column cannot be read
    pub fn true_value(&self) -> Result<Output> {
        match self {
            Self::Length(dataset) => Ok(Output::Scalar(row_count(dataset))),
            Self::Column(attr) => Ok(Output::Column(attr.values()?)),
            Self::Sum(attr) => Ok(Output::Scalar(numeric_values(attr, false)?.iter().sum())),
            Self::Mean(attr) => {
                let values = numeric_values(attr, false)?;
                if values.is_empty() {
                    return Err(Error::InvalidInput(format!(
                        "Mean of empty column '{}'",
                        attr.name()
                    )));
                }
                Ok(Output::Scalar(values.iter().sum::<f64>() / len_f64(&values)))
            }
        }
    }

    /// Value with noise calibrated to `epsilon`
    ///
    /// # Errors
    /// Returns `NotYetSupported` for raw columns and `InvalidInput` for an
    /// invalid budget
    pub fn dp<R: Rng>(&self, epsilon: f64, rng: &mut R) -> Result<Output> {
        match self {
            Self::Length(dataset) => {
                let noise = Mechanism::Geometric.noise(epsilon, 1.0, rng)?;
                Ok(Output::Scalar(row_count(dataset) + noise))
            }
            Self::Column(attr) => Err(Error::NotYetSupported(format!(
                "budgeted evaluation of raw column '{}'",
                attr.name()
            ))),
            Self::Sum(attr) => {
                let sum: f64 = numeric_values(attr, true)?.iter().sum();
                let noise = Mechanism::Laplace.noise(epsilon, attr.sensitivity()?, rng)?;
                Ok(Output::Scalar(sum + noise))
            }
            Self::Mean(attr) => {
                // Half the budget each for the noisy sum and the noisy count
                let half = epsilon / 2.0;
                let values = numeric_values(attr, true)?;
                let sum = values.iter().sum::<f64>()
                    + Mechanism::Laplace.noise(half, attr.sensitivity()?, rng)?;
                let count = len_f64(&values) + Mechanism::Geometric.noise(half, 1.0, rng)?;
                Ok(Output::Scalar(sum / count.max(1.0)))
            }
        }
    }
}

impl Evaluate for Expression<'_> {
    fn evaluate<R: Rng>(&self, mode: EvaluationMode, rng: &mut R) -> Result<Output> {
        match mode {
            EvaluationMode::Exact => self.true_value(),
            EvaluationMode::Budgeted(epsilon) => self.dp(epsilon, rng),
        }
    }

    fn sensitivity(&self) -> Result<f64> {
        match self {
            Self::Length(_) => Ok(1.0),
            Self::Column(attr) | Self::Sum(attr) => attr.sensitivity(),
            Self::Mean(attr) => Ok(attr.sensitivity()? / row_count(attr.dataset()).max(1.0)),
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn row_count(dataset: &Dataset) -> f64 {
    dataset.num_rows() as f64
}

#[allow(clippy::cast_precision_loss)]
fn len_f64<T>(values: &[T]) -> f64 {
    values.len() as f64
}

/// Non-null numeric values, clamped to the declared bounds when `clamp` is set
fn numeric_values(attr: &Attribute<'_>, clamp: bool) -> Result<Vec<f64>> {
    let bounds = attr.kind().bounds().ok_or_else(|| Error::DatasetTypeMismatch {
        attribute: attr.name().to_string(),
        expected: "numeric or boolean".to_string(),
        found: "categorical".to_string(),
    })?;

    Ok(attr
        .values()?
        .iter()
        .filter_map(Value::as_f64)
        .map(|v| if clamp { v.clamp(bounds.0, bounds.1) } else { v })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Schema;
    use arrow::array::{Float64Array, RecordBatch, StringArray};
    use arrow::datatypes::{DataType, Field, Schema as ArrowSchema};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::sync::Arc;

    fn dataset() -> Dataset {
        let batch = RecordBatch::try_new(
            Arc::new(ArrowSchema::new(vec![
                Field::new("income", DataType::Float64, true),
                Field::new("city", DataType::Utf8, false),
            ])),
            vec![
                Arc::new(Float64Array::from(vec![Some(10.0), Some(20.0), None, Some(150.0)])),
                Arc::new(StringArray::from(vec!["A", "B", "A", "C"])),
            ],
        )
        .unwrap();
        let schema = Schema::builder()
            .float("income", 0.0, 100.0)
            .categorical("city")
            .build()
            .unwrap();
        Dataset::from_batches(schema, vec![batch]).unwrap()
    }

    #[test]
    fn test_exact_length_and_sum() {
        let ds = dataset();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert_eq!(
            ds.len().evaluate(EvaluationMode::Exact, &mut rng).unwrap(),
            Output::Scalar(4.0)
        );
        let sum = ds.attribute("income").unwrap().sum();
        assert_eq!(sum.true_value().unwrap(), Output::Scalar(180.0));
        let mean = ds.attribute("income").unwrap().mean();
        assert_eq!(mean.true_value().unwrap(), Output::Scalar(60.0));
    }

    #[test]
    fn test_budgeted_length_is_noisy_integer() {
        let ds = dataset();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let noisy = ds.len().dp(1.0, &mut rng).unwrap().as_scalar().unwrap();
        assert_eq!(noisy.fract(), 0.0);
    }

    #[test]
    fn test_budgeted_sum_centered_on_clamped_sum() {
        let ds = dataset();
        let sum = ds.attribute("income").unwrap().sum();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let draws: Vec<f64> = (0..4_000)
            .map(|_| sum.dp(10.0, &mut rng).unwrap().as_scalar().unwrap())
            .collect();
        #[allow(clippy::cast_precision_loss)]
        let mean = draws.iter().sum::<f64>() / draws.len() as f64;
        // 150 is clamped to the declared max of 100
        assert!((mean - 130.0).abs() < 1.0, "mean={mean}");
    }

    #[test]
    fn test_column_dp_not_yet_supported() {
        let ds = dataset();
        let column = ds.attribute("city").unwrap().expr();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let result = column.evaluate(EvaluationMode::Budgeted(1.0), &mut rng);
        assert!(matches!(result, Err(Error::NotYetSupported(_))));
        assert!(matches!(
            column.true_value().unwrap(),
            Output::Column(values) if values.len() == 4
        ));
    }

    #[test]
    fn test_sensitivities() {
        let ds = dataset();
        assert!((ds.len().sensitivity().unwrap() - 1.0).abs() < f64::EPSILON);
        let sum = ds.attribute("income").unwrap().sum();
        assert!((sum.sensitivity().unwrap() - 100.0).abs() < f64::EPSILON);
        let mean = ds.attribute("income").unwrap().mean();
        assert!((mean.sensitivity().unwrap() - 25.0).abs() < f64::EPSILON);
        assert!(ds.attribute("city").unwrap().sum().sensitivity().is_err());
    }

    #[test]
    fn test_categorical_sum_is_type_mismatch() {
        let ds = dataset();
        let result = ds.attribute("city").unwrap().sum().true_value();
        assert!(matches!(result, Err(Error::DatasetTypeMismatch { .. })));
    }

    #[test]
    fn test_invalid_budget() {
        let ds = dataset();
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        assert!(ds.len().dp(0.0, &mut rng).is_err());
    }
}
