//! Error types for BernsteinFlow.

use ndarray::ShapeError;
use thiserror::Error;

/// Result type alias for BernsteinFlow operations.
pub type Result<T> = std::result::Result<T, BernsteinFlowError>;

/// Errors that can occur in BernsteinFlow operations.
#[derive(Error, Debug)]
pub enum BernsteinFlowError {
    /// Invalid configuration or parameter value (non-positive scale,
    /// order below one, non-monotone coefficients).
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    /// Invalid input data.
    #[error("Invalid input data: {0}")]
    InvalidInput(String),
    /// Shape mismatch in arrays.
    #[error("Shape mismatch: expected {expected_shape}, got {actual_shape}")]
    ShapeMismatch {
        expected_shape: String,
        actual_shape: String,
    },
    /// An inverse target outside the transform's range. The bisection
    /// bracket precondition is violated, which usually points at a bug in
    /// the upstream parameter source rather than a numerical accident.
    #[error("Inverse target {value} outside the transform range [{lower}, {upper}]")]
    TargetOutOfSupport {
        value: f64,
        lower: f64,
        upper: f64,
    },
    /// A generic error from the argmin crate.
    #[error("Argmin error: {0}")]
    ArgminError(String),
}

impl From<argmin::core::Error> for BernsteinFlowError {
    fn from(err: argmin::core::Error) -> Self {
        BernsteinFlowError::ArgminError(err.to_string())
    }
}

impl From<ShapeError> for BernsteinFlowError {
    fn from(err: ShapeError) -> Self {
        BernsteinFlowError::ShapeMismatch {
            expected_shape: "unknown".to_string(),
            actual_shape: err.to_string(),
        }
    }
}
