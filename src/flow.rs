//! The composed Bernstein flow transform.
//!
//! Chain: `affine_in -> Bernstein polynomial -> affine_out`. The inner
//! affine stage normalizes the input onto the unit interval where the
//! polynomial lives; the outer stage maps the polynomial output onto the
//! target's natural scale. Log-det-Jacobians compose by the chain rule for
//! bijections: the sum of each stage's log-det evaluated at that stage's
//! own input.

use crate::affine::AffineBijector;
use crate::bijector::{Bijector, BernsteinBijector, BoundaryPolicy, DOMAIN_EPS};
use crate::coefficients::{constrain_thetas, is_non_decreasing};
use crate::error::{BernsteinFlowError, Result};
use crate::types::{InversionReport, LogDetReport};
use crate::utils::{nan_to_num_scalar, ResponseFn};
use ndarray::{s, Array1, ArrayView1};
use serde::{Deserialize, Serialize};

/// Per-call parameter bundle for one flow evaluation.
///
/// Produced once per sample (or broadcast) from the output of an external
/// covariate-conditioned parameter source. Owned by the evaluation call;
/// nothing here persists between calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowParameters {
    /// Monotone Bernstein coefficients, length order + 1.
    thetas: Array1<f64>,
    /// Scale of the input-normalizing affine stage.
    scale_in: f64,
    /// Shift of the input-normalizing affine stage.
    shift_in: f64,
    /// Scale of the output affine stage.
    scale_out: f64,
    /// Shift of the output affine stage.
    shift_out: f64,
}

impl FlowParameters {
    /// Build a bundle from already-constrained values.
    pub fn new(
        thetas: Array1<f64>,
        scale_in: f64,
        shift_in: f64,
        scale_out: f64,
        shift_out: f64,
    ) -> Result<Self> {
        if thetas.len() < 2 {
            return Err(BernsteinFlowError::InvalidParameter(format!(
                "flow needs at least 2 coefficients (order >= 1), got {}",
                thetas.len()
            )));
        }
        if !is_non_decreasing(&thetas.view()) {
            return Err(BernsteinFlowError::InvalidParameter(
                "Bernstein coefficients must be non-decreasing".to_string(),
            ));
        }
        for (name, scale) in [("scale_in", scale_in), ("scale_out", scale_out)] {
            if !scale.is_finite() || scale <= 0.0 {
                return Err(BernsteinFlowError::InvalidParameter(format!(
                    "{name} must be strictly positive and finite, got {scale}"
                )));
            }
        }
        for (name, shift) in [("shift_in", shift_in), ("shift_out", shift_out)] {
            if !shift.is_finite() {
                return Err(BernsteinFlowError::InvalidParameter(format!(
                    "{name} must be finite, got {shift}"
                )));
            }
        }
        Ok(Self {
            thetas,
            scale_in,
            shift_in,
            scale_out,
            shift_out,
        })
    }

    /// Build a bundle from a raw unconstrained vector laid out as
    /// `[scale_in_raw, shift_in, theta_raw..., scale_out_raw, shift_out]`,
    /// the order implied by the vector length (`len - 5`).
    ///
    /// Scales go through `scale_response` (softplus by default at the flow
    /// level), coefficients through the cumulative-softplus constraint;
    /// shifts pass through with a NaN guard. The whole map is smooth in the
    /// raw vector, so gradients flow back to the parameter source.
    pub fn from_unconstrained(raw: &ArrayView1<f64>, scale_response: ResponseFn) -> Result<Self> {
        if raw.len() < 6 {
            return Err(BernsteinFlowError::InvalidInput(format!(
                "raw parameter vector needs at least 6 entries \
                 (2 coefficients + 2 affine pairs), got {}",
                raw.len()
            )));
        }
        let n = raw.len();
        let scale_in = scale_response.apply_scalar(raw[0]);
        let shift_in = nan_to_num_scalar(raw[1], 0.0);
        let thetas = constrain_thetas(&raw.slice(s![2..n - 2]));
        let scale_out = scale_response.apply_scalar(raw[n - 2]);
        let shift_out = nan_to_num_scalar(raw[n - 1], 0.0);
        Self::new(thetas, scale_in, shift_in, scale_out, shift_out)
    }

    /// The polynomial order M.
    pub fn order(&self) -> usize {
        self.thetas.len() - 1
    }

    pub fn thetas(&self) -> &Array1<f64> {
        &self.thetas
    }

    pub fn scale_in(&self) -> f64 {
        self.scale_in
    }

    pub fn shift_in(&self) -> f64 {
        self.shift_in
    }

    pub fn scale_out(&self) -> f64 {
        self.scale_out
    }

    pub fn shift_out(&self) -> f64 {
        self.shift_out
    }
}

/// Stateless composer for the affine-Bernstein-affine chain.
///
/// Holds only the order and numeric policy; all coefficients and affine
/// parameters arrive per call in a [`FlowParameters`] bundle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BernsteinFlow {
    order: usize,
    boundary: BoundaryPolicy,
    scale_response: ResponseFn,
}

impl BernsteinFlow {
    /// Create a flow of the given polynomial order with the clamping
    /// boundary policy and softplus scale response.
    pub fn new(order: usize) -> Result<Self> {
        Self::with_config(order, BoundaryPolicy::Clamp, ResponseFn::Softplus)
    }

    /// Create a flow with an explicit boundary policy and scale response.
    pub fn with_config(
        order: usize,
        boundary: BoundaryPolicy,
        scale_response: ResponseFn,
    ) -> Result<Self> {
        if order < 1 {
            return Err(BernsteinFlowError::InvalidParameter(
                "flow order must be at least 1; order 0 degenerates to an affine map"
                    .to_string(),
            ));
        }
        Ok(Self {
            order,
            boundary,
            scale_response,
        })
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn boundary(&self) -> BoundaryPolicy {
        self.boundary
    }

    /// Length of the raw parameter vector this flow consumes: M + 1
    /// coefficients plus two scale/shift pairs.
    pub fn n_raw_params(&self) -> usize {
        self.order + 5
    }

    /// Constrain a raw parameter vector of exactly [`Self::n_raw_params`]
    /// entries into a [`FlowParameters`] bundle.
    pub fn params_from_unconstrained(&self, raw: &ArrayView1<f64>) -> Result<FlowParameters> {
        if raw.len() != self.n_raw_params() {
            return Err(BernsteinFlowError::ShapeMismatch {
                expected_shape: format!("({},)", self.n_raw_params()),
                actual_shape: format!("({},)", raw.len()),
            });
        }
        FlowParameters::from_unconstrained(raw, self.scale_response)
    }

    /// Assemble the composed bijector for one parameter bundle.
    pub fn bijector(&self, params: &FlowParameters) -> Result<ComposedBijector> {
        if params.order() != self.order {
            return Err(BernsteinFlowError::ShapeMismatch {
                expected_shape: format!("({},)", self.order + 1),
                actual_shape: format!("({},)", params.thetas().len()),
            });
        }
        let pre = AffineBijector::new(params.scale_in(), params.shift_in())?;
        let post = AffineBijector::new(params.scale_out(), params.shift_out())?;
        let bernstein =
            BernsteinBijector::with_boundary(params.thetas().clone(), self.boundary)?;
        Ok(ComposedBijector {
            pre,
            bernstein,
            post,
            boundary: self.boundary,
        })
    }

    /// Forward map of a batch through the full chain.
    pub fn forward(&self, params: &FlowParameters, z: &ArrayView1<f64>) -> Result<Array1<f64>> {
        self.bijector(params)?.forward(z)
    }

    /// Inverse map of a batch through the full chain.
    pub fn inverse(&self, params: &FlowParameters, y: &ArrayView1<f64>) -> Result<Array1<f64>> {
        self.bijector(params)?.inverse(y)
    }

    /// Inverse with root-finder health attached.
    pub fn inverse_report(
        &self,
        params: &FlowParameters,
        y: &ArrayView1<f64>,
    ) -> Result<InversionReport> {
        self.bijector(params)?.inverse_report(y)
    }

    /// Composed forward log-det-Jacobian of a batch.
    pub fn forward_log_det_jacobian(
        &self,
        params: &FlowParameters,
        z: &ArrayView1<f64>,
    ) -> Result<Array1<f64>> {
        self.bijector(params)?.forward_log_det_jacobian(z)
    }

    /// Composed log-det-Jacobian with the floored-derivative count.
    pub fn forward_log_det_jacobian_report(
        &self,
        params: &FlowParameters,
        z: &ArrayView1<f64>,
    ) -> Result<LogDetReport> {
        Ok(self.bijector(params)?.forward_log_det_jacobian_report(z))
    }

    /// Scalar forward map, the per-sample path.
    pub fn forward_one(&self, params: &FlowParameters, z: f64) -> Result<f64> {
        Ok(self.bijector(params)?.forward_one(z))
    }

    /// Scalar inverse map.
    pub fn inverse_one(&self, params: &FlowParameters, y: f64) -> Result<f64> {
        let report = self
            .bijector(params)?
            .inverse_report(&Array1::from_elem(1, y).view())?;
        Ok(report.positions[0])
    }

    /// Scalar composed log-det-Jacobian.
    pub fn forward_log_det_jacobian_one(&self, params: &FlowParameters, z: f64) -> Result<f64> {
        Ok(self.bijector(params)?.forward_log_det_jacobian_one(z).0)
    }
}

/// The affine-Bernstein-affine chain bound to one parameter bundle.
#[derive(Debug, Clone)]
pub struct ComposedBijector {
    pre: AffineBijector,
    bernstein: BernsteinBijector,
    post: AffineBijector,
    boundary: BoundaryPolicy,
}

impl ComposedBijector {
    /// Normalize an input onto the polynomial's evaluation domain. Under
    /// the clamping policy values are clipped into `[eps, 1 - eps]`, a
    /// deliberately lossy boundary keeping the basis well-conditioned.
    fn normalize_one(&self, z: f64) -> f64 {
        let u = self.pre.forward_one(z);
        match self.boundary {
            BoundaryPolicy::Clamp => u.clamp(DOMAIN_EPS, 1.0 - DOMAIN_EPS),
            BoundaryPolicy::LinearExtrapolate => u,
        }
    }

    /// Scalar forward map through all three stages.
    pub fn forward_one(&self, z: f64) -> f64 {
        let u = self.normalize_one(z);
        self.post.forward_one(self.bernstein.forward_one(u))
    }

    /// Scalar log-det-Jacobian: `ln(scale_in) + ln(B'(u)) + ln(scale_out)`,
    /// each term at its own stage input. The bool flags a floored
    /// polynomial derivative.
    pub fn forward_log_det_jacobian_one(&self, z: f64) -> (f64, bool) {
        let u = self.normalize_one(z);
        let (log_derivative, floored) = self.bernstein.log_derivative_one(u);
        (
            self.pre.log_det_jacobian() + log_derivative + self.post.log_det_jacobian(),
            floored,
        )
    }

    /// Batched inverse with root-finder health.
    pub fn inverse_report(&self, y: &ArrayView1<f64>) -> Result<InversionReport> {
        let w = y.mapv(|yk| self.post.inverse_one(yk));
        let report = self
            .bernstein
            .inverse_report(&w.view())
            .map_err(|err| match err {
                // Report range violations on the caller's target scale.
                BernsteinFlowError::TargetOutOfSupport {
                    value,
                    lower,
                    upper,
                } => BernsteinFlowError::TargetOutOfSupport {
                    value: self.post.forward_one(value),
                    lower: self.post.forward_one(lower),
                    upper: self.post.forward_one(upper),
                },
                other => other,
            })?;
        let positions = report.positions.mapv(|u| self.pre.inverse_one(u));
        Ok(InversionReport {
            positions,
            converged: report.converged,
            iterations: report.iterations,
            max_interval: report.max_interval,
        })
    }

    /// Batched log-det-Jacobian with the floored-derivative count.
    pub fn forward_log_det_jacobian_report(&self, z: &ArrayView1<f64>) -> LogDetReport {
        let mut floored = 0;
        let values = z.mapv(|zk| {
            let (ldj, was_floored) = self.forward_log_det_jacobian_one(zk);
            if was_floored {
                floored += 1;
            }
            ldj
        });
        LogDetReport { values, floored }
    }
}

impl Bijector for ComposedBijector {
    fn forward(&self, x: &ArrayView1<f64>) -> Result<Array1<f64>> {
        Ok(x.mapv(|z| self.forward_one(z)))
    }

    fn inverse(&self, y: &ArrayView1<f64>) -> Result<Array1<f64>> {
        Ok(self.inverse_report(y)?.positions)
    }

    fn forward_log_det_jacobian(&self, x: &ArrayView1<f64>) -> Result<Array1<f64>> {
        Ok(self.forward_log_det_jacobian_report(x).values)
    }
}
