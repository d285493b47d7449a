//! Utility functions for parameter transformations.
//!
//! Response functions map unconstrained values (as produced by an external
//! parameter network) into the space a flow parameter lives in, e.g. a
//! strictly positive scale.

use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

/// Response function types for transforming flow parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ResponseFn {
    /// Identity transformation (no change).
    Identity,
    /// Exponential transformation for strictly positive values.
    Exp,
    /// Softplus transformation for strictly positive values.
    Softplus,
    /// Squareplus transformation for strictly positive values.
    Squareplus,
}

impl ResponseFn {
    /// Apply the response function to an array of values.
    pub fn apply(&self, x: &ArrayView1<f64>) -> Array1<f64> {
        x.mapv(|v| self.apply_scalar(v))
    }

    /// Apply the response function to a single value.
    pub fn apply_scalar(&self, x: f64) -> f64 {
        match self {
            ResponseFn::Identity => identity_scalar(x),
            ResponseFn::Exp => exp_scalar(x),
            ResponseFn::Softplus => softplus_scalar(x),
            ResponseFn::Squareplus => squareplus_scalar(x),
        }
    }

    /// Compute the derivative of the response function at x.
    pub fn derivative(&self, x: f64) -> f64 {
        match self {
            ResponseFn::Identity => 1.0,
            ResponseFn::Exp => x.exp(),
            // d/dx softplus(x) = sigmoid(x)
            ResponseFn::Softplus => 1.0 / (1.0 + (-x).exp()),
            // d/dx squareplus(x) = 0.5 * (1 + x / sqrt(x^2 + 4))
            ResponseFn::Squareplus => 0.5 * (1.0 + x / (x * x + 4.0).sqrt()),
        }
    }
}

pub(crate) const EPSILON: f64 = 1e-6;

/// Replace a non-finite scalar with a replacement value.
pub(crate) fn nan_to_num_scalar(x: f64, replacement: f64) -> f64 {
    if x.is_finite() { x } else { replacement }
}

fn identity_scalar(x: f64) -> f64 {
    nan_to_num_scalar(x, 0.0)
}

fn exp_scalar(x: f64) -> f64 {
    nan_to_num_scalar(x, 0.0).exp() + EPSILON
}

/// Numerically stable softplus: ln(1 + exp(x)), floored at `EPSILON` so the
/// result is strictly positive.
pub fn softplus_scalar(x: f64) -> f64 {
    let x = nan_to_num_scalar(x, 0.0);
    if x > 20.0 {
        x + EPSILON
    } else if x < -20.0 {
        EPSILON
    } else {
        (1.0 + x.exp()).ln() + EPSILON
    }
}

/// Inverse softplus: ln(exp(y) - 1), the preimage of a positive value.
pub fn inverse_softplus(y: f64) -> f64 {
    if y > 20.0 {
        y
    } else if y < EPSILON {
        -20.0
    } else {
        (y.exp() - 1.0).ln()
    }
}

fn squareplus_scalar(x: f64) -> f64 {
    let x = nan_to_num_scalar(x, 0.0);
    0.5 * (x + (x * x + 4.0).sqrt()) + EPSILON
}
