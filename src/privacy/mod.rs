//! Randomized response: calibration, perturbation and debiasing
//!
//! ```text
//! ε ──epsilon_flip──> pf ──randomize──> randomized table
//! ```

pub mod calibrate;
pub mod randomize;

pub use calibrate::{epsilon, epsilon_flip};
pub use randomize::{debias, randomize};

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Privacy parameters of one sampling call
///
/// `pr` is the flip probability carried by the "real" table (zero for the
/// untouched original) and `pf` the flip probability used to produce the
/// randomized table. Both are used to debias their table's frequencies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrivacyParameters {
    epsilon: f64,
    pr: f64,
    pf: f64,
}

impl PrivacyParameters {
    /// Create parameters from explicit flip probabilities
    ///
    /// # Errors
    /// Returns `InvalidInput` if `epsilon` is negative or not finite, or a
    /// flip probability lies outside `[0, 1]`
    pub fn new(epsilon: f64, pr: f64, pf: f64) -> Result<Self> {
        if !epsilon.is_finite() || epsilon < 0.0 {
            return Err(Error::InvalidInput(format!(
                "epsilon must be finite and non-negative, got {epsilon}"
            )));
        }
        for (name, p) in [("pr", pr), ("pf", pf)] {
            if !(0.0..=1.0).contains(&p) {
                return Err(Error::InvalidInput(format!(
                    "{name} must lie in [0, 1], got {p}"
                )));
            }
        }
        Ok(Self { epsilon, pr, pf })
    }

    /// Calibrate for budget `epsilon`: untouched real table, `pf = epsilon_flip(ε)`
    ///
    /// # Errors
    /// Returns `InvalidInput` if `epsilon` is negative, not finite, or outside
    /// the range [`epsilon_flip`] can represent
    pub fn from_epsilon(epsilon: f64) -> Result<Self> {
        let pf = epsilon_flip(epsilon)?;
        Self::new(epsilon, 0.0, pf)
    }

    /// Privacy budget
    #[must_use]
    pub const fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Flip probability of the real table
    #[must_use]
    pub const fn pr(&self) -> f64 {
        self.pr
    }

    /// Flip probability of the randomized table
    #[must_use]
    pub const fn pf(&self) -> f64 {
        self.pf
    }
}

/// Randomized-response replacement rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RandomizationMethod {
    /// Replacement always differs from the original code
    Flip,
    /// Replacement drawn from the full domain (may equal the original)
    Resample,
}

impl RandomizationMethod {
    /// Whether this method excludes the original code from replacement draws
    #[must_use]
    pub const fn flips(self) -> bool {
        matches!(self, Self::Flip)
    }
}

impl FromStr for RandomizationMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "flip" => Ok(Self::Flip),
            "resample" => Ok(Self::Resample),
            other => Err(Error::UnsupportedMechanism(other.to_string())),
        }
    }
}

impl fmt::Display for RandomizationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flip => write!(f, "flip"),
            Self::Resample => write!(f, "resample"),
        }
    }
}
