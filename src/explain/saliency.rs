use ndarray::{Array1, Array2, ArrayView1, Axis};

use super::{require_point, require_scalar};
use crate::error::Result;
use crate::model::Network;
use crate::tensor;

/// Where the backward walk is seeded at the output unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Seed {
    /// `∂z/∂z = 1`
    Logit,
    /// `∂p/∂z`: `p(1 - p)` for a sigmoid head, `1` for a linear head
    Probability,
}

/// Runs a forward pass at `x` and walks a single-unit gradient back to the
/// input. Returns `(p, ∂seed/∂x)`.
pub(crate) fn output_gradient(net: &Network, x: ArrayView1<f64>, seed: Seed) -> Result<(f64, Array1<f64>)> {
    require_scalar(net)?;
    require_point(net, x)?;

    let pass = net.forward_pass(x.insert_axis(Axis(0)))?;
    let p = pass.predictions[[0, 0]];
    let start = match seed {
        Seed::Logit => 1.0,
        Seed::Probability => net.output_activation().derivative_from_output(p),
    };

    let deltas = net.deltas(&pass, Array2::from_elem((1, 1), start));
    let grad_x = tensor::matmul(deltas[0].view(), tensor::transpose(net.layers[0].weights.view()).view());
    Ok((p, grad_x.row(0).to_owned()))
}

/// Gradient of the output logit with respect to the input point.
pub fn logit_gradient(net: &Network, x: ArrayView1<f64>) -> Result<Array1<f64>> {
    Ok(output_gradient(net, x, Seed::Logit)?.1)
}

/// Gradient of the predicted probability with respect to the input point.
///
/// For a linear head this equals [`logit_gradient`].
pub fn probability_gradient(net: &Network, x: ArrayView1<f64>) -> Result<Array1<f64>> {
    Ok(output_gradient(net, x, Seed::Probability)?.1)
}

/// Predicted probability together with its input gradient.
pub fn probability_with_gradient(net: &Network, x: ArrayView1<f64>) -> Result<(f64, Array1<f64>)> {
    output_gradient(net, x, Seed::Probability)
}
