use ndarray::{array, Array1};

use super::saliency::probability_with_gradient;
use super::{require_bounds, require_scalar, Bounds};
use crate::error::{Error, Result};
use crate::model::Network;

/// One lattice point of a probability-gradient field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSample {
    pub point: Array1<f64>,
    pub probability: f64,
    pub gradient: Array1<f64>,
}

/// `∇p` on a `grid × grid` lattice spanning a 2-D box, corners included.
///
/// Samples are row-major with `y` as the outer axis. A grid of 1 samples the
/// box centre; a grid of 0 yields nothing.
pub fn gradient_field(net: &Network, bounds: &Bounds, grid: usize) -> Result<Vec<FieldSample>> {
    require_scalar(net)?;
    require_bounds(net, bounds)?;
    if bounds.dims() != 2 {
        return Err(Error::ShapeMismatch {
            context: "gradient field bounds",
            expected: (1, 2),
            found: (1, bounds.dims()),
        });
    }

    let coord = |axis: usize, i: usize| {
        let (lo, hi) = (bounds.min[axis], bounds.max[axis]);
        if grid <= 1 {
            0.5 * (lo + hi)
        } else {
            lo + i as f64 * (hi - lo) / (grid - 1) as f64
        }
    };

    let mut samples = Vec::with_capacity(grid * grid);
    for gy in 0..grid {
        for gx in 0..grid {
            let point = array![coord(0, gx), coord(1, gy)];
            let (probability, gradient) = probability_with_gradient(net, point.view())?;
            samples.push(FieldSample {
                point,
                probability,
                gradient,
            });
        }
    }
    Ok(samples)
}
