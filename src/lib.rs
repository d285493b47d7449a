//! # BernsteinFlow
//!
//! Monotone, invertible Bernstein-polynomial bijectors composed into a
//! normalizing flow for conditional density estimation.
//!
//! The chain `affine -> Bernstein polynomial -> affine` maps a simple base
//! variable onto a target with a possibly multimodal, heteroscedastic
//! distribution. Monotone polynomial coefficients guarantee invertibility
//! on the unit interval, and every stage reports its log-det-Jacobian, so
//! the transformed density is exact and trainable by maximum likelihood.
//! Per-sample parameters come from an external source (typically a
//! covariate-conditioned network) as one flat unconstrained vector.
//!
//! ## Example
//!
//! ```
//! use bernsteinflow::prelude::*;
//! use ndarray::array;
//!
//! // Order-2 flow; the raw bundle is
//! // [scale_in_raw, shift_in, theta_raw x 3, scale_out_raw, shift_out].
//! let flow = BernsteinFlow::new(2).unwrap();
//! let raw = array![0.0, 0.5, 0.0, 1.0, 1.0, 0.0, 0.0];
//! let params = flow.params_from_unconstrained(&raw.view()).unwrap();
//!
//! let z = array![-0.5, 0.0, 0.5];
//! let y = flow.forward(&params, &z.view()).unwrap();
//! let back = flow.inverse(&params, &y.view()).unwrap();
//! assert!(back.iter().zip(z.iter()).all(|(a, b)| (a - b).abs() < 1e-6));
//! ```

pub mod affine;
pub mod basis;
pub mod bijector;
pub mod coefficients;
pub mod density;
pub mod error;
pub mod flow;
pub mod polynomial;
pub mod types;
pub mod utils;

pub mod prelude {
    //! Convenient re-exports of commonly used types.
    pub use crate::affine::AffineBijector;
    pub use crate::basis::BernsteinBasis;
    pub use crate::bijector::{BernsteinBijector, Bijector, BoundaryPolicy};
    pub use crate::coefficients::{constrain_thetas, constrain_thetas_batch, is_non_decreasing};
    pub use crate::density::{BaseDistribution, BernsteinFlowDensity};
    pub use crate::error::{BernsteinFlowError, Result};
    pub use crate::flow::{BernsteinFlow, ComposedBijector, FlowParameters};
    pub use crate::polynomial::BernsteinPolynomial;
    pub use crate::types::{InversionReport, LogDetReport};
    pub use crate::utils::ResponseFn;
}
