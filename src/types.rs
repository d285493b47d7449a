//! Core data types for reporting numerical health of flow evaluations.

use ndarray::Array1;

/// Outcome of a batched numerical inversion.
///
/// The root finder always returns its best estimate; `converged` tells the
/// caller whether every element reached the position tolerance within the
/// iteration budget. Training loops can watch this instead of failing on
/// isolated hard samples.
#[derive(Debug, Clone)]
pub struct InversionReport {
    /// Best root estimates, one per input element.
    pub positions: Array1<f64>,
    /// Whether all elements reached the position tolerance.
    pub converged: bool,
    /// Number of bisection iterations performed.
    pub iterations: usize,
    /// Widest remaining bracket over the batch, in unit-interval units.
    pub max_interval: f64,
}

/// Outcome of a log-det-Jacobian evaluation.
///
/// Where the polynomial derivative vanishes (near-equal consecutive
/// coefficients) the log-derivative is clamped to a finite floor instead of
/// propagating `-inf` into a loss; `floored` counts how often that happened.
#[derive(Debug, Clone)]
pub struct LogDetReport {
    /// Log-det-Jacobian values, one per input element.
    pub values: Array1<f64>,
    /// Number of elements whose derivative was clamped to the floor.
    pub floored: usize,
}
