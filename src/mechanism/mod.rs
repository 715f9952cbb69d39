//! Noise mechanisms for budgeted scalar aggregates
//!
//! - Laplace: continuous noise with scale `sensitivity / ε`
//! - Geometric: two-sided geometric noise for integer counts,
//!   `P(k) ∝ α^|k|` with `α = e^(-ε / sensitivity)`

use crate::{Error, Result};
use rand::Rng;
use rand_distr::{Distribution, Exp, Geometric};
use serde::{Deserialize, Serialize};

/// Additive noise mechanism
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mechanism {
    /// Laplace mechanism (real-valued queries)
    Laplace,
    /// Two-sided geometric mechanism (integer-valued queries)
    Geometric,
}

impl Mechanism {
    /// Draw one noise sample for a query with the given sensitivity
    ///
    /// # Errors
    /// Returns `InvalidInput` if `epsilon` is not positive and finite or
    /// `sensitivity` is negative or not finite
    pub fn noise<R: Rng>(self, epsilon: f64, sensitivity: f64, rng: &mut R) -> Result<f64> {
        match self {
            Self::Laplace => laplace_noise(epsilon, sensitivity, rng),
            Self::Geometric => geometric_noise(epsilon, sensitivity, rng),
        }
    }
}

fn validate(epsilon: f64, sensitivity: f64) -> Result<()> {
    if !epsilon.is_finite() || epsilon <= 0.0 {
        return Err(Error::InvalidInput(format!(
            "epsilon must be positive and finite, got {epsilon}"
        )));
    }
    if !sensitivity.is_finite() || sensitivity < 0.0 {
        return Err(Error::InvalidInput(format!(
            "sensitivity must be non-negative and finite, got {sensitivity}"
        )));
    }
    Ok(())
}

/// Laplace noise with scale `sensitivity / epsilon`
///
/// # Errors
/// Returns `InvalidInput` for invalid parameters
pub fn laplace_noise<R: Rng>(epsilon: f64, sensitivity: f64, rng: &mut R) -> Result<f64> {
    validate(epsilon, sensitivity)?;
    if sensitivity == 0.0 {
        return Ok(0.0);
    }

    // Laplace noise can be sampled as the difference of two exponentials.
    let dist = Exp::new(epsilon / sensitivity)
        .map_err(|e| Error::InvalidInput(format!("Laplace scale rejected: {e}")))?;
    Ok(dist.sample(rng) - dist.sample(rng))
}

/// Two-sided geometric noise with `α = e^(-epsilon / sensitivity)`
///
/// # Errors
/// Returns `InvalidInput` for invalid parameters
#[allow(clippy::cast_precision_loss)]
pub fn geometric_noise<R: Rng>(epsilon: f64, sensitivity: f64, rng: &mut R) -> Result<f64> {
    validate(epsilon, sensitivity)?;
    if sensitivity == 0.0 {
        return Ok(0.0);
    }

    // Difference of two one-sided geometric draws (failures before success, p = 1 - α)
    let alpha = (-epsilon / sensitivity).exp();
    let dist = Geometric::new(1.0 - alpha)
        .map_err(|e| Error::InvalidInput(format!("Geometric parameter rejected: {e}")))?;
    let positive = dist.sample(rng) as f64;
    let negative = dist.sample(rng) as f64;
    Ok(positive - negative)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[allow(clippy::cast_precision_loss)]
    fn mean_and_abs_mean(samples: &[f64]) -> (f64, f64) {
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let abs_mean = samples.iter().map(|x| x.abs()).sum::<f64>() / n;
        (mean, abs_mean)
    }

    #[test]
    fn test_laplace_statistics() {
        let mut rng = ChaCha8Rng::seed_from_u64(123);
        let samples: Vec<f64> = (0..20_000)
            .map(|_| laplace_noise(0.5, 1.0, &mut rng).unwrap())
            .collect();
        let (mean, abs_mean) = mean_and_abs_mean(&samples);
        // Laplace(b = 2): mean 0, E|X| = b
        assert!(mean.abs() < 0.1, "mean={mean}");
        assert!((abs_mean - 2.0).abs() < 0.1, "abs_mean={abs_mean}");
    }

    #[test]
    fn test_geometric_is_integer_and_centered() {
        let mut rng = ChaCha8Rng::seed_from_u64(321);
        let samples: Vec<f64> = (0..20_000)
            .map(|_| geometric_noise(1.0, 1.0, &mut rng).unwrap())
            .collect();
        assert!(samples.iter().all(|x| x.fract() == 0.0));
        let (mean, abs_mean) = mean_and_abs_mean(&samples);
        // E|X| = 2α / (1 - α²) with α = e^-1
        let alpha = (-1.0f64).exp();
        let expected = 2.0 * alpha / (1.0 - alpha * alpha);
        assert!(mean.abs() < 0.05, "mean={mean}");
        assert!((abs_mean - expected).abs() < 0.05, "abs_mean={abs_mean}");
    }

    #[test]
    fn test_zero_sensitivity_is_noiseless() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert!(Mechanism::Laplace.noise(1.0, 0.0, &mut rng).unwrap().abs() < f64::EPSILON);
        assert!(Mechanism::Geometric.noise(1.0, 0.0, &mut rng).unwrap().abs() < f64::EPSILON);
    }

    #[test]
    fn test_invalid_parameters() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert!(Mechanism::Laplace.noise(0.0, 1.0, &mut rng).is_err());
        assert!(Mechanism::Laplace.noise(f64::NAN, 1.0, &mut rng).is_err());
        assert!(Mechanism::Geometric.noise(1.0, -1.0, &mut rng).is_err());
    }

    #[test]
    fn test_seeded_noise_reproducible() {
        let a = laplace_noise(1.0, 10.0, &mut ChaCha8Rng::seed_from_u64(5)).unwrap();
        let b = laplace_noise(1.0, 10.0, &mut ChaCha8Rng::seed_from_u64(5)).unwrap();
        assert!((a - b).abs() < f64::EPSILON);
    }
}
