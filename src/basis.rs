//! Bernstein basis polynomials.
//!
//! The basis of order M consists of the M + 1 functions
//! `B_{i,M}(u) = C(M, i) * u^i * (1 - u)^(M - i)` on the unit interval.
//! Binomial coefficients are kept in log space so that orders well into the
//! hundreds evaluate without overflow.

use ndarray::{Array1, Array2, ArrayView1};
use statrs::function::gamma::ln_gamma;

/// Bernstein basis of a fixed order.
///
/// Stateless apart from the order and the precomputed log-binomial
/// coefficients; evaluation assumes pre-clamped input in [0, 1].
#[derive(Debug, Clone)]
pub struct BernsteinBasis {
    order: usize,
    log_binom: Vec<f64>,
}

impl BernsteinBasis {
    /// Create a basis of the given order. Order 0 is the constant basis
    /// `B_{0,0} = 1`, used for derivatives of first-order polynomials.
    pub fn new(order: usize) -> Self {
        let m = order as f64;
        let log_binom = (0..=order)
            .map(|i| {
                let i = i as f64;
                ln_gamma(m + 1.0) - ln_gamma(i + 1.0) - ln_gamma(m - i + 1.0)
            })
            .collect();
        Self { order, log_binom }
    }

    /// The polynomial order M.
    pub fn order(&self) -> usize {
        self.order
    }

    /// Number of basis functions, M + 1.
    pub fn n_basis(&self) -> usize {
        self.order + 1
    }

    /// Evaluate all M + 1 basis functions at a single point.
    ///
    /// The endpoints are handled exactly: `u = 0` yields the first unit
    /// vector and `u = 1` the last, avoiding `0^0` in the log-space path.
    pub fn evaluate(&self, u: f64) -> Array1<f64> {
        let m = self.order;
        let mut out = Array1::zeros(m + 1);
        let u = u.clamp(0.0, 1.0);
        if u == 0.0 {
            out[0] = 1.0;
            return out;
        }
        if u == 1.0 {
            out[m] = 1.0;
            return out;
        }
        let ln_u = u.ln();
        // ln(1 - u) via ln_1p for accuracy near u = 0
        let ln_one_minus_u = (-u).ln_1p();
        for i in 0..=m {
            let log_b =
                self.log_binom[i] + i as f64 * ln_u + (m - i) as f64 * ln_one_minus_u;
            out[i] = log_b.exp();
        }
        out
    }

    /// Evaluate the basis at each point of a batch, returning an
    /// `(n, M + 1)` matrix with one row per point.
    pub fn evaluate_batch(&self, u: &ArrayView1<f64>) -> Array2<f64> {
        let mut out = Array2::zeros((u.len(), self.order + 1));
        for (k, &uk) in u.iter().enumerate() {
            out.row_mut(k).assign(&self.evaluate(uk));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_basis_partition_of_unity() {
        // Bernstein bases sum to one at every point.
        for order in [1, 2, 5, 20] {
            let basis = BernsteinBasis::new(order);
            for &u in &[0.0, 0.1, 0.5, 0.73, 1.0] {
                let b = basis.evaluate(u);
                assert_relative_eq!(b.sum(), 1.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_basis_order_two_closed_form() {
        let basis = BernsteinBasis::new(2);
        let b = basis.evaluate(0.5);
        assert_relative_eq!(b[0], 0.25, epsilon = 1e-12);
        assert_relative_eq!(b[1], 0.5, epsilon = 1e-12);
        assert_relative_eq!(b[2], 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_basis_endpoints_exact() {
        let basis = BernsteinBasis::new(4);
        let b0 = basis.evaluate(0.0);
        let b1 = basis.evaluate(1.0);
        assert_eq!(b0[0], 1.0);
        assert_eq!(b0.slice(ndarray::s![1..]).sum(), 0.0);
        assert_eq!(b1[4], 1.0);
        assert_eq!(b1.slice(ndarray::s![..4]).sum(), 0.0);
    }

    #[test]
    fn test_basis_high_order_stable() {
        // Naive factorials overflow around order 170; the log-space path
        // must stay finite and normalized well beyond that.
        let basis = BernsteinBasis::new(300);
        let b = basis.evaluate(0.3);
        assert!(b.iter().all(|v| v.is_finite()));
        assert_relative_eq!(b.sum(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_basis_batch_matches_scalar() {
        let basis = BernsteinBasis::new(3);
        let points = array![0.0, 0.25, 0.5, 0.75, 1.0];
        let batch = basis.evaluate_batch(&points.view());
        for (k, &u) in points.iter().enumerate() {
            let row = basis.evaluate(u);
            for i in 0..basis.n_basis() {
                assert_relative_eq!(batch[[k, i]], row[i], epsilon = 1e-14);
            }
        }
    }
}
