//! Invertible affine stages.

use crate::bijector::Bijector;
use crate::error::{BernsteinFlowError, Result};
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

/// A scale/shift map `x -> scale * x + shift` with strictly positive scale.
///
/// Positivity makes the map invertible and order-preserving; its
/// log-det-Jacobian is the constant `ln(scale)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AffineBijector {
    scale: f64,
    shift: f64,
}

impl AffineBijector {
    /// Build an affine map, rejecting non-positive or non-finite scale.
    pub fn new(scale: f64, shift: f64) -> Result<Self> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(BernsteinFlowError::InvalidParameter(format!(
                "affine scale must be strictly positive and finite, got {scale}"
            )));
        }
        if !shift.is_finite() {
            return Err(BernsteinFlowError::InvalidParameter(format!(
                "affine shift must be finite, got {shift}"
            )));
        }
        Ok(Self { scale, shift })
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn shift(&self) -> f64 {
        self.shift
    }

    /// Forward evaluation at a single point.
    pub fn forward_one(&self, x: f64) -> f64 {
        self.scale * x + self.shift
    }

    /// Inverse evaluation at a single point.
    pub fn inverse_one(&self, y: f64) -> f64 {
        (y - self.shift) / self.scale
    }

    /// The constant log-det-Jacobian, `ln(scale)`.
    pub fn log_det_jacobian(&self) -> f64 {
        self.scale.ln()
    }
}

impl Bijector for AffineBijector {
    fn forward(&self, x: &ArrayView1<f64>) -> Result<Array1<f64>> {
        Ok(x.mapv(|v| self.forward_one(v)))
    }

    fn inverse(&self, y: &ArrayView1<f64>) -> Result<Array1<f64>> {
        Ok(y.mapv(|v| self.inverse_one(v)))
    }

    fn forward_log_det_jacobian(&self, x: &ArrayView1<f64>) -> Result<Array1<f64>> {
        Ok(Array1::from_elem(x.len(), self.log_det_jacobian()))
    }
}
