//! Bijective transform contract and the Bernstein bijector.
//!
//! The [`Bijector`] trait is the whole interface a normalizing-flow stage
//! needs: forward map, inverse map, and forward log-det-Jacobian. It is
//! implemented by the affine stages, by [`BernsteinBijector`], and by the
//! composed flow, a closed set of concrete types rather than an
//! inheritance hierarchy.

use crate::error::{BernsteinFlowError, Result};
use crate::polynomial::BernsteinPolynomial;
use crate::types::{InversionReport, LogDetReport};
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

/// An invertible, differentiable map with a computable log-det-Jacobian.
///
/// All three operations act elementwise on batches of scalars; there is no
/// cross-element coupling.
pub trait Bijector {
    /// Forward evaluation, one output per input element.
    fn forward(&self, x: &ArrayView1<f64>) -> Result<Array1<f64>>;
    /// Inverse evaluation, `forward(inverse(y)) = y` up to tolerance.
    fn inverse(&self, y: &ArrayView1<f64>) -> Result<Array1<f64>>;
    /// Log of the forward derivative, evaluated at the forward input.
    fn forward_log_det_jacobian(&self, x: &ArrayView1<f64>) -> Result<Array1<f64>>;
}

/// Absolute tolerance on the unit-interval position at which the bisection
/// inverse stops.
pub const ROOT_TOLERANCE: f64 = 1e-9;

/// Iteration cap for the bisection inverse. Bisection halves the bracket
/// each step, so the cap is far above the ~30 iterations the default
/// tolerance needs.
pub const MAX_ROOT_ITERATIONS: usize = 100;

/// Floor applied to the polynomial derivative before taking its log, so a
/// locally flat transform yields a large negative but finite
/// log-det-Jacobian instead of `-inf`.
pub const DERIVATIVE_FLOOR: f64 = 1e-30;

/// Margin keeping evaluation strictly inside the open unit interval.
pub const DOMAIN_EPS: f64 = f64::EPSILON;

/// How the Bernstein stage treats inputs outside `[DOMAIN_EPS, 1 - DOMAIN_EPS]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundaryPolicy {
    /// Clip to the closed unit interval. Lossy at the boundary; inverse
    /// targets outside the polynomial range are an error.
    Clamp,
    /// Continue the polynomial by its tangent lines beyond the boundary,
    /// keeping the map a bijection on the whole real line.
    LinearExtrapolate,
}

/// Tangent line of the polynomial at one end of the evaluation domain.
#[derive(Debug, Clone, Copy)]
struct Tangent {
    at: f64,
    value: f64,
    slope: f64,
}

impl Tangent {
    fn extend(&self, u: f64) -> f64 {
        self.value + self.slope * (u - self.at)
    }

    fn invert(&self, y: f64) -> f64 {
        self.at + (y - self.value) / self.slope
    }
}

/// Bijective map on the unit interval defined by a monotone Bernstein
/// polynomial.
///
/// The forward direction is closed form; the inverse has no closed form for
/// orders above one and is computed by a batched bisection over the bracket
/// [0, 1], which is always valid because the polynomial is monotone there.
#[derive(Debug, Clone)]
pub struct BernsteinBijector {
    poly: BernsteinPolynomial,
    boundary: BoundaryPolicy,
    root_tol: f64,
    max_iterations: usize,
    lower_tangent: Tangent,
    upper_tangent: Tangent,
}

impl BernsteinBijector {
    /// Build a bijector with the default clamping boundary policy.
    pub fn new(thetas: Array1<f64>) -> Result<Self> {
        Self::with_boundary(thetas, BoundaryPolicy::Clamp)
    }

    /// Build a bijector with an explicit boundary policy.
    pub fn with_boundary(thetas: Array1<f64>, boundary: BoundaryPolicy) -> Result<Self> {
        let poly = BernsteinPolynomial::new(thetas)?;
        let lower_tangent = Tangent {
            at: DOMAIN_EPS,
            value: poly.evaluate(DOMAIN_EPS),
            slope: poly.derivative(DOMAIN_EPS).max(DERIVATIVE_FLOOR),
        };
        let upper_tangent = Tangent {
            at: 1.0 - DOMAIN_EPS,
            value: poly.evaluate(1.0 - DOMAIN_EPS),
            slope: poly.derivative(1.0 - DOMAIN_EPS).max(DERIVATIVE_FLOOR),
        };
        Ok(Self {
            poly,
            boundary,
            root_tol: ROOT_TOLERANCE,
            max_iterations: MAX_ROOT_ITERATIONS,
            lower_tangent,
            upper_tangent,
        })
    }

    /// Override the root-finder tolerance and iteration cap.
    pub fn with_root_parameters(mut self, tolerance: f64, max_iterations: usize) -> Self {
        self.root_tol = tolerance;
        self.max_iterations = max_iterations;
        self
    }

    /// The underlying polynomial.
    pub fn polynomial(&self) -> &BernsteinPolynomial {
        &self.poly
    }

    /// The active boundary policy.
    pub fn boundary(&self) -> BoundaryPolicy {
        self.boundary
    }

    /// Forward evaluation at a single point.
    pub fn forward_one(&self, u: f64) -> f64 {
        match self.boundary {
            BoundaryPolicy::Clamp => self.poly.evaluate(u.clamp(0.0, 1.0)),
            BoundaryPolicy::LinearExtrapolate => {
                if u <= self.lower_tangent.at {
                    self.lower_tangent.extend(u)
                } else if u >= self.upper_tangent.at {
                    self.upper_tangent.extend(u)
                } else {
                    self.poly.evaluate(u)
                }
            }
        }
    }

    /// Log-derivative at a single point; the bool flags whether the
    /// derivative had to be floored.
    pub fn log_derivative_one(&self, u: f64) -> (f64, bool) {
        let derivative = match self.boundary {
            BoundaryPolicy::Clamp => self.poly.derivative(u.clamp(0.0, 1.0)),
            BoundaryPolicy::LinearExtrapolate => {
                if u <= self.lower_tangent.at {
                    self.lower_tangent.slope
                } else if u >= self.upper_tangent.at {
                    self.upper_tangent.slope
                } else {
                    self.poly.derivative(u)
                }
            }
        };
        let floored = derivative < DERIVATIVE_FLOOR;
        (derivative.max(DERIVATIVE_FLOOR).ln(), floored)
    }

    /// Log-det-Jacobian over a batch, with the floored-derivative count.
    pub fn forward_log_det_jacobian_report(&self, u: &ArrayView1<f64>) -> LogDetReport {
        let mut floored = 0;
        let values = u.mapv(|uk| {
            let (ld, was_floored) = self.log_derivative_one(uk);
            if was_floored {
                floored += 1;
            }
            ld
        });
        LogDetReport { values, floored }
    }

    /// Invert a batch of targets, reporting root-finder health.
    ///
    /// Under [`BoundaryPolicy::Clamp`] every target must lie inside the
    /// polynomial range `[theta_0, theta_M]` (up to floating slack);
    /// violations are [`BernsteinFlowError::TargetOutOfSupport`]. Under
    /// [`BoundaryPolicy::LinearExtrapolate`] out-of-range targets are
    /// inverted through the closed-form tangent lines. Non-convergence
    /// within the iteration cap is not an error: the best estimate is
    /// returned with `converged = false`.
    pub fn inverse_report(&self, y: &ArrayView1<f64>) -> Result<InversionReport> {
        let lower = self.poly.lower();
        let upper = self.poly.upper();
        let slack = 1e-9 * (1.0 + (upper - lower).abs());

        if self.boundary == BoundaryPolicy::Clamp {
            for &yk in y.iter() {
                if !yk.is_finite() || yk < lower - slack || yk > upper + slack {
                    return Err(BernsteinFlowError::TargetOutOfSupport {
                        value: yk,
                        lower,
                        upper,
                    });
                }
            }
        }

        let clamped = y.mapv(|yk| yk.clamp(lower, upper));
        let (mut positions, converged, iterations, max_interval) =
            self.bisect(&clamped.view());

        if self.boundary == BoundaryPolicy::LinearExtrapolate {
            for (k, &yk) in y.iter().enumerate() {
                if yk < self.lower_tangent.value {
                    positions[k] = self.lower_tangent.invert(yk);
                } else if yk > self.upper_tangent.value {
                    positions[k] = self.upper_tangent.invert(yk);
                }
            }
        }

        Ok(InversionReport {
            positions,
            converged,
            iterations,
            max_interval,
        })
    }

    /// Batched bisection: every element advances one bracket-halving step
    /// per iteration, so the loop vectorizes over the whole batch.
    fn bisect(&self, targets: &ArrayView1<f64>) -> (Array1<f64>, bool, usize, f64) {
        let n = targets.len();
        let mut lo = Array1::<f64>::zeros(n);
        let mut hi = Array1::<f64>::ones(n);
        let mut width = 1.0;
        let mut iterations = 0;
        while iterations < self.max_iterations && width > self.root_tol {
            let mid = (&lo + &hi) * 0.5;
            let values = self.poly.evaluate_batch(&mid.view());
            for k in 0..n {
                if values[k] < targets[k] {
                    lo[k] = mid[k];
                } else {
                    hi[k] = mid[k];
                }
            }
            width *= 0.5;
            iterations += 1;
        }
        let positions = (&lo + &hi) * 0.5;
        (positions, width <= self.root_tol, iterations, width)
    }
}

impl Bijector for BernsteinBijector {
    fn forward(&self, x: &ArrayView1<f64>) -> Result<Array1<f64>> {
        Ok(x.mapv(|u| self.forward_one(u)))
    }

    fn inverse(&self, y: &ArrayView1<f64>) -> Result<Array1<f64>> {
        Ok(self.inverse_report(y)?.positions)
    }

    fn forward_log_det_jacobian(&self, x: &ArrayView1<f64>) -> Result<Array1<f64>> {
        Ok(self.forward_log_det_jacobian_report(x).values)
    }
}
