//! Monotone coefficient constraint.
//!
//! A Bernstein polynomial is non-decreasing on [0, 1] exactly when its
//! coefficient sequence is non-decreasing, so the constraint below is the
//! sole guarantee of invertibility. The construction is the cumulative
//! softplus: the first unconstrained value passes through unchanged and
//! every later value contributes a softplus-positive increment. It is
//! smooth in the unconstrained vector end-to-end, so an upstream parameter
//! network can be trained through it.

use crate::utils::{nan_to_num_scalar, softplus_scalar};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Slack allowed when checking the non-decreasing invariant.
const MONOTONICITY_SLACK: f64 = 1e-9;

/// Map an unconstrained vector of length M + 1 into a strictly increasing
/// coefficient vector of the same length.
///
/// `theta_0 = raw[0]`, `theta_i = theta_{i-1} + softplus(raw[i])`. The
/// softplus carries a 1e-6 floor, so consecutive coefficients always differ
/// by at least that much. Large negative tail entries therefore degenerate
/// the polynomial toward locally constant, which is a valid low-information
/// region rather than an error.
pub fn constrain_thetas(raw: &ArrayView1<f64>) -> Array1<f64> {
    let mut thetas = Array1::zeros(raw.len());
    if raw.is_empty() {
        return thetas;
    }
    thetas[0] = nan_to_num_scalar(raw[0], 0.0);
    for i in 1..raw.len() {
        thetas[i] = thetas[i - 1] + softplus_scalar(raw[i]);
    }
    thetas
}

/// Row-wise [`constrain_thetas`] for a batch of unconstrained vectors.
pub fn constrain_thetas_batch(raw: &ArrayView2<f64>) -> Array2<f64> {
    let mut out = Array2::zeros(raw.dim());
    for (i, row) in raw.rows().into_iter().enumerate() {
        out.row_mut(i).assign(&constrain_thetas(&row));
    }
    out
}

/// Check the non-decreasing invariant up to floating-point slack.
pub fn is_non_decreasing(thetas: &ArrayView1<f64>) -> bool {
    thetas
        .windows(2)
        .into_iter()
        .all(|w| w[1] >= w[0] - MONOTONICITY_SLACK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_constrained_thetas_increasing() {
        let raw = array![-3.0, 2.0, -1.0, 0.0, 4.0];
        let thetas = constrain_thetas(&raw.view());
        assert!(is_non_decreasing(&thetas.view()));
        for w in thetas.windows(2) {
            assert!(w[1] > w[0]);
        }
        assert_relative_eq!(thetas[0], -3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_constrain_matches_cumulative_softplus() {
        let raw = array![0.0, 1.0, 1.0];
        let thetas = constrain_thetas(&raw.view());
        let sp1 = crate::utils::softplus_scalar(1.0);
        assert_relative_eq!(thetas[1], sp1, epsilon = 1e-12);
        assert_relative_eq!(thetas[2], 2.0 * sp1, epsilon = 1e-12);
    }

    #[test]
    fn test_large_negative_tail_degenerates_gracefully() {
        let raw = array![0.5, -40.0, -40.0];
        let thetas = constrain_thetas(&raw.view());
        assert!(is_non_decreasing(&thetas.view()));
        // Increments collapse to the softplus floor but never to zero.
        assert!(thetas[1] - thetas[0] > 0.0);
        assert!(thetas[1] - thetas[0] < 1e-5);
    }

    #[test]
    fn test_non_finite_raw_guarded() {
        let raw = array![f64::NAN, f64::INFINITY, 1.0];
        let thetas = constrain_thetas(&raw.view());
        assert!(thetas.iter().all(|v| v.is_finite()));
        assert!(is_non_decreasing(&thetas.view()));
    }

    #[test]
    fn test_batch_matches_rows() {
        let raw = array![[0.0, 1.0, 1.0], [-2.0, 0.5, 3.0]];
        let batch = constrain_thetas_batch(&raw.view());
        for (i, row) in raw.rows().into_iter().enumerate() {
            let single = constrain_thetas(&row);
            for j in 0..row.len() {
                assert_relative_eq!(batch[[i, j]], single[j], epsilon = 1e-14);
            }
        }
    }

    #[test]
    fn test_is_non_decreasing() {
        assert!(is_non_decreasing(&array![0.0, 0.0, 1.0].view()));
        assert!(!is_non_decreasing(&array![0.0, -0.5, 1.0].view()));
    }
}
