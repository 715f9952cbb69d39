//! Randomized-response calibration
//!
//! A flip probability `p` and a privacy budget `ε` are related by
//! `p = 1 / (1 + e^ε)`, equivalently `ε = ln((1 - p) / p)`.
//!
//! | ε    | p      |
//! |------|--------|
//! | 0    | 0.5    |
//! | 1    | 0.2689 |
//! | 5    | 0.0067 |

use crate::{Error, Result};

/// Privacy budget spent by flipping with probability `p`
///
/// # Errors
/// Returns `InvalidInput` unless `0 < p <= 0.5`
pub fn epsilon(p: f64) -> Result<f64> {
    if !(p > 0.0 && p <= 0.5) {
        return Err(Error::InvalidInput(format!(
            "flip probability must lie in (0, 0.5], got {p}"
        )));
    }
    Ok(((1.0 - p) / p).ln())
}

/// Flip probability that spends budget `epsilon`
///
/// `epsilon_flip(0)` is exactly 0.5; any positive budget maps strictly
/// inside (0, 0.5).
///
/// # Errors
/// Returns `InvalidInput` unless `epsilon` is finite and non-negative, and
/// for budgets so small or so large that `p` rounds to 0.5 or to 0
/// (roughly ε < 1e-16 or ε > 709)
pub fn epsilon_flip(epsilon: f64) -> Result<f64> {
    if !epsilon.is_finite() || epsilon < 0.0 {
        return Err(Error::InvalidInput(format!(
            "epsilon must be finite and non-negative, got {epsilon}"
        )));
    }
    if epsilon == 0.0 {
        return Ok(0.5);
    }
    let p = 1.0 / (1.0 + epsilon.exp());
    if !(p > 0.0 && p < 0.5) {
        return Err(Error::InvalidInput(format!(
            "epsilon {epsilon} is outside the representable range, flip probability would be {p}"
        )));
    }
    Ok(p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_is_zero_budget() {
        assert!(epsilon(0.5).unwrap().abs() < 1e-12);
        assert!((epsilon_flip(0.0).unwrap() - 0.5).abs() < 1e-12);
        assert!((epsilon_flip(epsilon(0.5).unwrap()).unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_known_values() {
        assert!((epsilon_flip(1.0).unwrap() - 0.268_941_421_369_995).abs() < 1e-12);
        assert!((epsilon(0.25).unwrap() - 3.0_f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_large_epsilon_stays_positive() {
        let p = epsilon_flip(50.0).unwrap();
        assert!(p > 0.0 && p < 1e-20);
    }

    #[test]
    fn test_unrepresentable_budgets_rejected() {
        assert!(matches!(epsilon_flip(1e-17), Err(Error::InvalidInput(_))));
        assert!(matches!(epsilon_flip(710.0), Err(Error::InvalidInput(_))));
        assert!(matches!(epsilon_flip(800.0), Err(Error::InvalidInput(_))));

        let p = epsilon_flip(700.0).unwrap();
        assert!(p > 0.0 && p < 0.5);
        let p = epsilon_flip(1e-15).unwrap();
        assert!(p > 0.0 && p < 0.5);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(epsilon(0.0).is_err());
        assert!(epsilon(0.6).is_err());
        assert!(epsilon(f64::NAN).is_err());
        assert!(epsilon_flip(-1.0).is_err());
        assert!(epsilon_flip(f64::INFINITY).is_err());
        assert!(epsilon_flip(f64::NAN).is_err());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: epsilon_flip(epsilon(p)) == p
            #[test]
            fn prop_round_trip(p in 1e-6f64..=0.5) {
                let back = epsilon_flip(epsilon(p).unwrap()).unwrap();
                prop_assert!((back - p).abs() < 1e-9, "p={} back={}", p, back);
            }

            /// Property: flip probability strictly inside (0, 0.5) for positive budgets
            #[test]
            fn prop_flip_in_open_interval(eps in 1e-6f64..30.0) {
                let p = epsilon_flip(eps).unwrap();
                prop_assert!(p > 0.0 && p < 0.5);
            }
        }
    }

    mod quickcheck_tests {
        use super::*;
        use quickcheck::quickcheck;

        fn to_probability(raw: u32) -> f64 {
            // Map onto (0, 0.5) avoiding the endpoints
            (f64::from(raw) + 1.0) / (f64::from(u32::MAX) + 2.0) * 0.5
        }

        quickcheck! {
            fn qc_epsilon_decreasing_in_p(a: u32, b: u32) -> bool {
                let (pa, pb) = (to_probability(a), to_probability(b));
                if pa == pb {
                    return true;
                }
                let (lo, hi) = if pa < pb { (pa, pb) } else { (pb, pa) };
                epsilon(lo).unwrap() > epsilon(hi).unwrap()
            }

            fn qc_flip_decreasing_in_epsilon(a: u16, b: u16) -> bool {
                let (ea, eb) = (f64::from(a) / 1000.0, f64::from(b) / 1000.0);
                if a == b {
                    return true;
                }
                let (lo, hi) = if ea < eb { (ea, eb) } else { (eb, ea) };
                epsilon_flip(lo).unwrap() > epsilon_flip(hi).unwrap()
            }
        }
    }
}
