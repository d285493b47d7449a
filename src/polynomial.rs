//! Bernstein polynomial evaluation and differentiation.

use crate::basis::BernsteinBasis;
use crate::coefficients::is_non_decreasing;
use crate::error::{BernsteinFlowError, Result};
use ndarray::{Array1, ArrayView1};

/// A Bernstein polynomial with monotone coefficients.
///
/// `evaluate(u) = sum_i theta_i * B_{i,M}(u)` on [0, 1]. With non-decreasing
/// coefficients the polynomial is non-decreasing, its range is exactly
/// `[theta_0, theta_M]`, and its derivative
/// `M * sum_i (theta_{i+1} - theta_i) * B_{i,M-1}(u)` is non-negative, with
/// zeros only where consecutive coefficients coincide.
#[derive(Debug, Clone)]
pub struct BernsteinPolynomial {
    thetas: Array1<f64>,
    basis: BernsteinBasis,
    derivative_basis: BernsteinBasis,
    /// Coefficients of the derivative polynomial, `M * (theta_{i+1} - theta_i)`.
    dthetas: Array1<f64>,
}

impl BernsteinPolynomial {
    /// Build a polynomial from constrained coefficients.
    ///
    /// Callers normally obtain `thetas` from
    /// [`constrain_thetas`](crate::coefficients::constrain_thetas); handing
    /// in a non-monotone vector directly is a configuration error.
    pub fn new(thetas: Array1<f64>) -> Result<Self> {
        if thetas.len() < 2 {
            return Err(BernsteinFlowError::InvalidParameter(format!(
                "Bernstein polynomial needs at least 2 coefficients (order >= 1), got {}",
                thetas.len()
            )));
        }
        if thetas.iter().any(|v| !v.is_finite()) {
            return Err(BernsteinFlowError::InvalidParameter(
                "Bernstein coefficients must be finite".to_string(),
            ));
        }
        if !is_non_decreasing(&thetas.view()) {
            return Err(BernsteinFlowError::InvalidParameter(
                "Bernstein coefficients must be non-decreasing".to_string(),
            ));
        }
        let order = thetas.len() - 1;
        let m = order as f64;
        let dthetas = Array1::from_iter(
            thetas.windows(2).into_iter().map(|w| m * (w[1] - w[0])),
        );
        Ok(Self {
            thetas,
            basis: BernsteinBasis::new(order),
            derivative_basis: BernsteinBasis::new(order - 1),
            dthetas,
        })
    }

    /// The polynomial order M.
    pub fn order(&self) -> usize {
        self.basis.order()
    }

    /// The monotone coefficient vector.
    pub fn thetas(&self) -> &Array1<f64> {
        &self.thetas
    }

    /// Lower end of the range, `theta_0 = evaluate(0)`.
    pub fn lower(&self) -> f64 {
        self.thetas[0]
    }

    /// Upper end of the range, `theta_M = evaluate(1)`.
    pub fn upper(&self) -> f64 {
        self.thetas[self.thetas.len() - 1]
    }

    /// Evaluate the polynomial at a point in [0, 1].
    pub fn evaluate(&self, u: f64) -> f64 {
        self.basis.evaluate(u).dot(&self.thetas)
    }

    /// Evaluate the polynomial at each point of a batch.
    pub fn evaluate_batch(&self, u: &ArrayView1<f64>) -> Array1<f64> {
        self.basis.evaluate_batch(u).dot(&self.thetas)
    }

    /// Derivative at a point in [0, 1]; non-negative for monotone
    /// coefficients.
    pub fn derivative(&self, u: f64) -> f64 {
        self.derivative_basis.evaluate(u).dot(&self.dthetas)
    }

    /// Derivative at each point of a batch.
    pub fn derivative_batch(&self, u: &ArrayView1<f64>) -> Array1<f64> {
        self.derivative_basis.evaluate_batch(u).dot(&self.dthetas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coefficients::constrain_thetas;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn poly(thetas: Vec<f64>) -> BernsteinPolynomial {
        BernsteinPolynomial::new(Array1::from_vec(thetas)).unwrap()
    }

    #[test]
    fn test_rejects_degenerate_configs() {
        assert!(BernsteinPolynomial::new(array![1.0]).is_err());
        assert!(BernsteinPolynomial::new(array![1.0, 0.0]).is_err());
        assert!(BernsteinPolynomial::new(array![0.0, f64::NAN]).is_err());
    }

    #[test]
    fn test_boundary_values_exact() {
        let p = poly(vec![-1.5, 0.2, 0.3, 4.0]);
        assert_eq!(p.evaluate(0.0), -1.5);
        assert_eq!(p.evaluate(1.0), 4.0);
        assert_eq!(p.lower(), -1.5);
        assert_eq!(p.upper(), 4.0);
    }

    #[test]
    fn test_linear_case_is_affine() {
        // Order 1 with thetas [0, 2] is the line 2u.
        let p = poly(vec![0.0, 2.0]);
        for &u in &[0.0, 0.25, 0.5, 1.0] {
            assert_relative_eq!(p.evaluate(u), 2.0 * u, epsilon = 1e-12);
            assert_relative_eq!(p.derivative(u), 2.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_order_two_closed_form() {
        let raw = array![0.0, 1.0, 1.0];
        let thetas = constrain_thetas(&raw.view());
        let p = BernsteinPolynomial::new(thetas.clone()).unwrap();
        let expected = thetas[1] * 0.5 + thetas[2] * 0.25;
        assert_relative_eq!(p.evaluate(0.5), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_monotone_in_u() {
        let thetas = constrain_thetas(&array![-2.0, 0.0, 1.0, -1.0, 2.0].view());
        let p = BernsteinPolynomial::new(thetas).unwrap();
        let mut prev = p.evaluate(0.0);
        for k in 1..=50 {
            let u = k as f64 / 50.0;
            let value = p.evaluate(u);
            assert!(value >= prev - 1e-12);
            prev = value;
        }
    }

    #[test]
    fn test_derivative_matches_finite_difference() {
        let thetas = constrain_thetas(&array![0.5, 1.0, -0.5, 2.0].view());
        let p = BernsteinPolynomial::new(thetas).unwrap();
        let h = 1e-6;
        for &u in &[0.2, 0.5, 0.8] {
            let numeric = (p.evaluate(u + h) - p.evaluate(u - h)) / (2.0 * h);
            assert_relative_eq!(p.derivative(u), numeric, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_derivative_non_negative() {
        let thetas = constrain_thetas(&array![0.0, -30.0, 3.0, -30.0].view());
        let p = BernsteinPolynomial::new(thetas).unwrap();
        for k in 0..=20 {
            let u = k as f64 / 20.0;
            assert!(p.derivative(u) >= 0.0);
        }
    }

    #[test]
    fn test_batch_matches_scalar() {
        let thetas = constrain_thetas(&array![0.0, 1.0, 0.5].view());
        let p = BernsteinPolynomial::new(thetas).unwrap();
        let points = array![0.0, 0.3, 0.7, 1.0];
        let values = p.evaluate_batch(&points.view());
        let derivs = p.derivative_batch(&points.view());
        for (k, &u) in points.iter().enumerate() {
            assert_relative_eq!(values[k], p.evaluate(u), epsilon = 1e-14);
            assert_relative_eq!(derivs[k], p.derivative(u), epsilon = 1e-14);
        }
    }
}
