use log::trace;
use ndarray::{Array1, ArrayView1};

use super::saliency::probability_with_gradient;
use super::{require_bounds, require_point, require_scalar, Bounds};
use crate::error::Result;
use crate::model::Network;

/// Keeps the Newton step finite where the probability surface is flat.
const FLAT_EPSILON: f64 = 1e-8;

#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryWalkParams {
    pub steps: usize,

    /// Fraction of the full Newton step taken each iteration
    pub alpha: f64,

    /// Input-space box every iterate is clamped to
    pub bounds: Option<Bounds>,
}

impl Default for BoundaryWalkParams {
    fn default() -> Self {
        BoundaryWalkParams {
            steps: 6,
            alpha: 0.8,
            bounds: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryWalk {
    pub point: Array1<f64>,
    /// Every iterate, starting with the original point
    pub path: Vec<Array1<f64>>,
    /// Probability at the last evaluated iterate, before its final step
    pub last_prob: f64,
}

/// Moves `x0` toward the `p = 0.5` level set with damped Newton steps
/// `x -= α · (p - 0.5) / (‖∇p‖² + 1e-8) · ∇p`.
pub fn walk_to_boundary(net: &Network, x0: ArrayView1<f64>, params: &BoundaryWalkParams) -> Result<BoundaryWalk> {
    require_scalar(net)?;
    require_point(net, x0)?;
    if let Some(bounds) = &params.bounds {
        require_bounds(net, bounds)?;
    }

    let mut x = x0.to_owned();
    let mut path = vec![x.clone()];
    let mut last_prob = f64::NAN;
    for step in 0..params.steps {
        let (p, grad) = probability_with_gradient(net, x.view())?;
        let norm2 = grad.dot(&grad) + FLAT_EPSILON;
        x.scaled_add(-params.alpha * (p - 0.5) / norm2, &grad);
        if let Some(bounds) = &params.bounds {
            bounds.clamp(&mut x);
        }
        trace!("boundary walk step {step}: p {p:.4}");
        path.push(x.clone());
        last_prob = p;
    }

    Ok(BoundaryWalk { point: x, path, last_prob })
}
