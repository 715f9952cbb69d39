//! Randomized response over discretized tables
//!
//! Every code is perturbed independently: with probability `f` it is
//! replaced by a uniform draw from its attribute's domain. In flip mode the
//! draw excludes the original code, so a perturbed entry always changes.
//! [`debias`] inverts the perturbation on observed frequencies.

use crate::discretize::{Code, DiscretizedTable};
use crate::{Error, Result};
use rand::Rng;

/// Denominators smaller than this make the inversion numerically meaningless
const DEGENERATE_DENOMINATOR: f64 = 1e-12;

/// Apply randomized response to every code of `table`
///
/// Draws happen in row-major order, one Bernoulli trial per entry plus one
/// uniform draw per perturbed entry.
///
/// # Errors
/// Returns `InvalidInput` unless `0 <= flip_probability <= 1`
#[tracing::instrument(skip(table, rng), fields(rows = table.num_rows()))]
pub fn randomize<R: Rng>(
    table: &DiscretizedTable,
    flip_probability: f64,
    flip: bool,
    rng: &mut R,
) -> Result<DiscretizedTable> {
    if !(0.0..=1.0).contains(&flip_probability) {
        return Err(Error::InvalidInput(format!(
            "flip probability must lie in [0, 1], got {flip_probability}"
        )));
    }

    let width = table.num_attributes();
    let domain_sizes = table.domain_sizes();
    let mut changed = 0usize;

    let codes: Vec<Code> = table
        .codes()
        .iter()
        .enumerate()
        .map(|(i, &code)| {
            if !rng.gen_bool(flip_probability) {
                return code;
            }
            let replacement = replacement_code(code, domain_sizes[i % width], flip, &mut *rng);
            if replacement != code {
                changed += 1;
            }
            replacement
        })
        .collect();

    tracing::debug!(
        entries = codes.len(),
        changed,
        flip_probability,
        flip,
        "randomized table"
    );
    Ok(table.with_codes(codes))
}

#[allow(clippy::cast_possible_truncation)]
fn replacement_code<R: Rng>(code: Code, domain_size: usize, flip: bool, rng: &mut R) -> Code {
    if flip {
        if domain_size <= 1 {
            return code;
        }
        // Draw from the domain minus `code`
        let draw = rng.gen_range(0..domain_size - 1) as Code;
        if draw >= code {
            draw + 1
        } else {
            draw
        }
    } else {
        rng.gen_range(0..domain_size) as Code
    }
}

/// Recover true code frequencies from frequencies observed after randomization
///
/// `observed` holds one frequency per code of a single attribute. For flip
/// mode the estimate is `((k-1)·o - f) / (k - 1 - k·f)`; for resample mode it
/// is `(o - f/k) / (1 - f)`. Negative estimates are clamped to zero and the
/// result renormalized. When the inversion is degenerate the observed
/// frequencies are returned unchanged.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn debias(observed: &[f64], flip_probability: f64, flip: bool) -> Vec<f64> {
    let k = observed.len() as f64;
    if observed.len() <= 1 || flip_probability == 0.0 {
        return observed.to_vec();
    }

    let f = flip_probability;
    let corrected: Vec<f64> = if flip {
        let denominator = k - 1.0 - k * f;
        if denominator.abs() < DEGENERATE_DENOMINATOR {
            tracing::warn!(k, f, "randomized response not invertible, using observed frequencies");
            return observed.to_vec();
        }
        observed
            .iter()
            .map(|o| ((k - 1.0).mul_add(*o, -f) / denominator).max(0.0))
            .collect()
    } else {
        let denominator = 1.0 - f;
        if denominator.abs() < DEGENERATE_DENOMINATOR {
            tracing::warn!(k, f, "randomized response not invertible, using observed frequencies");
            return observed.to_vec();
        }
        observed
            .iter()
            .map(|o| ((o - f / k) / denominator).max(0.0))
            .collect()
    };

    let mass: f64 = corrected.iter().sum();
    if mass <= 0.0 {
        return observed.to_vec();
    }
    corrected.into_iter().map(|t| t / mass).collect()
}
