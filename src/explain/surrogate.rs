use log::warn;
use ndarray::{array, Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};

use super::{require_point, require_scalar, Bounds};
use crate::error::{Error, Result};
use crate::model::Network;

/// Systems with a smaller determinant are treated as singular.
const SINGULAR_DET: f64 = 1e-9;

/// Settings for the local linear surrogate.
#[derive(Debug, Clone, PartialEq)]
pub struct SurrogateParams {
    /// Number of perturbed samples around the point
    pub samples: usize,

    /// Standard deviation of the perturbations, also the kernel width
    pub sigma: f64,

    /// Seed for the perturbation RNG
    pub seed: u64,
}

impl Default for SurrogateParams {
    fn default() -> Self {
        SurrogateParams {
            samples: 128,
            sigma: 0.15,
            seed: 7,
        }
    }
}

/// Weighted least-squares plane `p ≈ β0 + βx·x + βy·y` fitted around a 2-D point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Surrogate {
    pub intercept: f64,
    pub coefficients: [f64; 2],
}

impl Surrogate {
    /// Fits the surrogate to the network's probabilities near `x`.
    ///
    /// Samples are drawn as `x + σ·N(0, I)` and weighted by
    /// `exp(-‖xi - x‖² / (2σ²))`. A near-singular or non-finite normal system
    /// yields the all-zero surrogate.
    pub fn fit(net: &Network, x: ArrayView1<f64>, params: &SurrogateParams) -> Result<Self> {
        require_scalar(net)?;
        if net.inputs() != 2 {
            return Err(Error::ShapeMismatch {
                context: "surrogate network inputs",
                expected: (1, 2),
                found: (1, net.inputs()),
            });
        }
        require_point(net, x)?;
        if params.samples == 0 || !(params.sigma > 0.0 && params.sigma.is_finite()) {
            return Err(Error::InvalidConfig(format!(
                "surrogate needs samples > 0 and sigma > 0, got {} and {}",
                params.samples, params.sigma
            )));
        }

        let mut rng = StdRng::seed_from_u64(params.seed);
        let sigma = params.sigma;
        let samples = Array2::from_shape_fn((params.samples, 2), |(_, j)| {
            let n: f64 = StandardNormal.sample(&mut rng);
            x[j] + sigma * n
        });
        let probs = net.forward_pass(samples.view())?.predictions;

        let mut gram = [[0.0f64; 3]; 3];
        let mut rhs = [0.0f64; 3];
        for (row, p) in samples.rows().into_iter().zip(probs.column(0).iter()) {
            let dist2 = (row[0] - x[0]).powi(2) + (row[1] - x[1]).powi(2);
            let w = (-dist2 / (2.0 * sigma * sigma)).exp();
            let z = [1.0, row[0], row[1]];
            for r in 0..3 {
                for c in 0..3 {
                    gram[r][c] += w * z[r] * z[c];
                }
                rhs[r] += w * z[r] * p;
            }
        }

        let beta = solve3(&gram, &rhs).unwrap_or_else(|| {
            warn!("surrogate: singular weighted system at {x}, returning a zero plane");
            [0.0; 3]
        });
        Ok(Surrogate {
            intercept: beta[0],
            coefficients: [beta[1], beta[2]],
        })
    }

    pub fn predict(&self, point: ArrayView1<f64>) -> f64 {
        self.intercept + self.coefficients[0] * point[0] + self.coefficients[1] * point[1]
    }

    /// Signed offset of the plane from the 0.5 decision level at `point`.
    pub fn residual(&self, point: ArrayView1<f64>) -> f64 {
        self.predict(point) - 0.5
    }

    pub fn is_degenerate(&self) -> bool {
        self.intercept == 0.0 && self.coefficients == [0.0, 0.0]
    }

    /// The surrogate boundary `β0 + βx·x + βy·y = 0.5` clipped to `bounds`.
    ///
    /// Returns `None` when the line misses the rectangle or only touches a corner.
    pub fn segment_within(&self, bounds: &Bounds) -> Option<(Array1<f64>, Array1<f64>)> {
        if bounds.dims() != 2 {
            return None;
        }
        let [bx, by] = self.coefficients;
        let c = 0.5 - self.intercept;
        let (x0, x1) = (bounds.min[0], bounds.max[0]);
        let (y0, y1) = (bounds.min[1], bounds.max[1]);

        let mut hits: Vec<Array1<f64>> = Vec::with_capacity(2);
        let mut push = |p: Array1<f64>| {
            let duplicate = hits.iter().any(|h| (h[0] - p[0]).abs() < 1e-9 && (h[1] - p[1]).abs() < 1e-9);
            if !duplicate && hits.len() < 2 {
                hits.push(p);
            }
        };
        if by.abs() > 1e-6 {
            for x in [x0, x1] {
                let y = (c - bx * x) / by;
                if (y0..=y1).contains(&y) {
                    push(array![x, y]);
                }
            }
        }
        if bx.abs() > 1e-6 {
            for y in [y0, y1] {
                let x = (c - by * y) / bx;
                if (x0..=x1).contains(&x) {
                    push(array![x, y]);
                }
            }
        }

        let mut hits = hits.into_iter();
        match (hits.next(), hits.next()) {
            (Some(a), Some(b)) => Some((a, b)),
            _ => None,
        }
    }
}

/// Solves `a · x = b` through the adjugate, or `None` when `det a` is not
/// finite or `|det a|` is below [`SINGULAR_DET`].
fn solve3(a: &[[f64; 3]; 3], b: &[f64; 3]) -> Option<[f64; 3]> {
    let [[a00, a01, a02], [a10, a11, a12], [a20, a21, a22]] = *a;
    let det = a00 * (a11 * a22 - a12 * a21) - a01 * (a10 * a22 - a12 * a20) + a02 * (a10 * a21 - a11 * a20);
    if !det.is_finite() || det.abs() < SINGULAR_DET {
        return None;
    }
    let inv = [
        [a11 * a22 - a12 * a21, -(a01 * a22 - a02 * a21), a01 * a12 - a02 * a11],
        [-(a10 * a22 - a12 * a20), a00 * a22 - a02 * a20, -(a00 * a12 - a02 * a10)],
        [a10 * a21 - a11 * a20, -(a00 * a21 - a01 * a20), a00 * a11 - a01 * a10],
    ];
    let mut x = [0.0; 3];
    for r in 0..3 {
        x[r] = (inv[r][0] * b[0] + inv[r][1] * b[1] + inv[r][2] * b[2]) / det;
    }
    x.iter().all(|v| v.is_finite()).then_some(x)
}
