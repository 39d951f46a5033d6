use log::trace;
use ndarray::{Array1, ArrayView1, Axis};

use super::saliency::{output_gradient, Seed};
use super::{require_bounds, require_point, require_scalar, Bounds};
use crate::error::{Error, Result};
use crate::model::Network;
use crate::tensor;

/// Guards the normalization of a zero gradient.
const NORM_EPSILON: f64 = 1e-12;

/// Norm used both for step directions and the ε-ball.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Norm {
    L1,
    L2,
    LInf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackKind {
    /// One step of size ε
    Fgsm,
    /// Repeated steps of size α, optionally projected onto the ε-ball
    Pgd,
}

/// Settings for [`attack`].
#[derive(Debug, Clone, PartialEq)]
pub struct AttackParams {
    pub kind: AttackKind,
    pub norm: Norm,

    /// Radius of the perturbation ball around the original point
    pub epsilon: f64,

    /// PGD step size
    pub alpha: f64,

    /// PGD iteration count
    pub steps: usize,

    /// Whether PGD re-projects onto the ε-ball after every step
    pub project: bool,

    /// Whether PGD stops at the first step whose prediction disagrees with the label
    pub stop_at_flip: bool,

    /// Input-space box every iterate is clamped to
    pub bounds: Option<Bounds>,
}

impl Default for AttackParams {
    fn default() -> Self {
        AttackParams {
            kind: AttackKind::Fgsm,
            norm: Norm::L2,
            epsilon: 0.15,
            alpha: 0.1,
            steps: 1,
            project: true,
            stop_at_flip: false,
            bounds: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttackOutcome {
    /// Final perturbed point
    pub point: Array1<f64>,
    /// Every iterate, starting with the original point
    pub path: Vec<Array1<f64>>,
    /// Whether the prediction at `point` disagrees with the label
    pub flipped: bool,
    pub steps_taken: usize,
    pub original_prob: f64,
    pub final_prob: f64,
}

/// Predicted probability at `x` and the input gradient of the loss against `label`,
/// `(p - y) · ∂z/∂x`.
pub fn loss_gradient(net: &Network, x: ArrayView1<f64>, label: f64) -> Result<(f64, Array1<f64>)> {
    let (p, grad_z) = output_gradient(net, x, Seed::Logit)?;
    Ok((p, grad_z * (p - label)))
}

/// Unit steepest-ascent direction of `g` under `norm`.
pub fn step_direction(g: ArrayView1<f64>, norm: Norm) -> Array1<f64> {
    match norm {
        Norm::LInf => g.mapv(tensor::sign),
        Norm::L2 => {
            let len = g.dot(&g).sqrt();
            g.mapv(|v| v / (len + NORM_EPSILON))
        }
        Norm::L1 => {
            let len = g.iter().map(|v| v.abs()).sum::<f64>();
            g.mapv(|v| v / (len + NORM_EPSILON))
        }
    }
}

/// Projects `x` onto the `norm` ball of radius `epsilon` around `center`.
pub fn project(x: ArrayView1<f64>, center: ArrayView1<f64>, epsilon: f64, norm: Norm) -> Array1<f64> {
    let mut offset = &x - &center;
    match norm {
        Norm::LInf => offset.mapv_inplace(|v| v.clamp(-epsilon, epsilon)),
        Norm::L2 | Norm::L1 => {
            let len = match norm {
                Norm::L2 => offset.dot(&offset).sqrt(),
                _ => offset.iter().map(|v| v.abs()).sum::<f64>(),
            };
            if len > epsilon {
                offset *= epsilon / len;
            }
        }
    }
    offset + &center
}

fn probability(net: &Network, x: ArrayView1<f64>) -> Result<f64> {
    Ok(net.predict(x.insert_axis(Axis(0)))?[[0, 0]])
}

fn disagrees(p: f64, label: f64) -> bool {
    (p >= 0.5) != (label > 0.5)
}

/// Searches for a perturbation of `x0` that increases the loss against `label`.
pub fn attack(net: &Network, x0: ArrayView1<f64>, label: f64, params: &AttackParams) -> Result<AttackOutcome> {
    require_scalar(net)?;
    require_point(net, x0)?;
    if let Some(bounds) = &params.bounds {
        require_bounds(net, bounds)?;
    }
    if !(params.epsilon >= 0.0) || !(params.alpha >= 0.0) {
        return Err(Error::InvalidConfig(format!(
            "attack needs non-negative epsilon and alpha, got {} and {}",
            params.epsilon, params.alpha
        )));
    }

    let clamp = |x: &mut Array1<f64>| {
        if let Some(bounds) = &params.bounds {
            bounds.clamp(x);
        }
    };

    let origin = x0.to_owned();
    let mut path = vec![origin.clone()];
    let (original_prob, grad) = loss_gradient(net, x0, label)?;

    let mut x = origin.clone();
    let mut steps_taken = 0;
    match params.kind {
        AttackKind::Fgsm => {
            let d = step_direction(grad.view(), params.norm);
            let stepped = &origin + &(d * params.epsilon);
            x = project(stepped.view(), origin.view(), params.epsilon, params.norm);
            clamp(&mut x);
            path.push(x.clone());
            steps_taken = 1;
        }
        AttackKind::Pgd => {
            let mut grad = grad;
            for step in 0..params.steps {
                if step > 0 {
                    grad = loss_gradient(net, x.view(), label)?.1;
                }
                let d = step_direction(grad.view(), params.norm);
                tensor::add_in_place(&mut x, &d, params.alpha);
                if params.project {
                    x = project(x.view(), origin.view(), params.epsilon, params.norm);
                }
                clamp(&mut x);
                path.push(x.clone());
                steps_taken += 1;

                if params.stop_at_flip {
                    let p = probability(net, x.view())?;
                    trace!("pgd step {step}: p {p:.4}");
                    if disagrees(p, label) {
                        break;
                    }
                }
            }
        }
    }

    let final_prob = probability(net, x.view())?;
    Ok(AttackOutcome {
        flipped: disagrees(final_prob, label),
        point: x,
        path,
        steps_taken,
        original_prob,
        final_prob,
    })
}
