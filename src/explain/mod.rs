//! Post-hoc explanations for single-output networks.
//!
//! Everything here borrows the network immutably and runs private,
//! dropout-free forward passes, so explanations can be recomputed between
//! training steps without disturbing the training caches.

pub mod adversarial;
pub mod counterfactual;
pub mod field;
pub mod integrated_gradients;
pub mod saliency;
pub mod surrogate;

use ndarray::{Array1, ArrayView1};

use crate::error::{Error, Result};
use crate::model::Network;

pub use adversarial::{attack, loss_gradient, project, step_direction, AttackKind, AttackOutcome, AttackParams, Norm};
pub use counterfactual::{walk_to_boundary, BoundaryWalk, BoundaryWalkParams};
pub use field::{gradient_field, FieldSample};
pub use integrated_gradients::integrated_gradients;
pub use saliency::{logit_gradient, probability_gradient, probability_with_gradient};
pub use surrogate::{Surrogate, SurrogateParams};

/// Axis-aligned box `[min, max]` in input space.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    pub min: Array1<f64>,
    pub max: Array1<f64>,
}

impl Bounds {
    pub fn new(min: Array1<f64>, max: Array1<f64>) -> Result<Self> {
        if min.len() != max.len() {
            return Err(Error::ShapeMismatch {
                context: "bounds",
                expected: (1, min.len()),
                found: (1, max.len()),
            });
        }
        if min.iter().zip(max.iter()).any(|(lo, hi)| !(lo <= hi)) {
            return Err(Error::InvalidConfig(format!("bounds min {min} exceeds max {max}")));
        }
        Ok(Bounds { min, max })
    }

    /// The same `[lo, hi]` interval on every one of `dims` axes.
    pub fn square(lo: f64, hi: f64, dims: usize) -> Result<Self> {
        Bounds::new(Array1::from_elem(dims, lo), Array1::from_elem(dims, hi))
    }

    pub fn dims(&self) -> usize {
        self.min.len()
    }

    pub fn contains(&self, x: ArrayView1<f64>) -> bool {
        x.len() == self.dims() && x.iter().zip(self.min.iter().zip(self.max.iter())).all(|(v, (lo, hi))| lo <= v && v <= hi)
    }

    pub fn clamp(&self, x: &mut Array1<f64>) {
        assert_eq!(x.len(), self.dims(), "bounds: point dimension differs");
        for ((v, lo), hi) in x.iter_mut().zip(self.min.iter()).zip(self.max.iter()) {
            *v = v.clamp(*lo, *hi);
        }
    }
}

/// Rejects networks with more than one output unit.
pub(crate) fn require_scalar(net: &Network) -> Result<()> {
    match net.outputs() {
        1 => Ok(()),
        n => Err(Error::NonScalarOutput(n)),
    }
}

/// Rejects points that do not match the network's input width.
pub(crate) fn require_point(net: &Network, x: ArrayView1<f64>) -> Result<()> {
    if x.len() != net.inputs() {
        return Err(Error::ShapeMismatch {
            context: "point",
            expected: (1, net.inputs()),
            found: (1, x.len()),
        });
    }
    Ok(())
}

pub(crate) fn require_bounds(net: &Network, bounds: &Bounds) -> Result<()> {
    if bounds.dims() != net.inputs() {
        return Err(Error::ShapeMismatch {
            context: "bounds",
            expected: (1, net.inputs()),
            found: (1, bounds.dims()),
        });
    }
    Ok(())
}
