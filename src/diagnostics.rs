//! Health statistics for the first hidden layer over a dataset.

use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::activation::ActivationType;
use crate::error::{Error, Result};
use crate::model::Network;
use crate::tensor;

#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticThresholds {
    /// `|f'(z)|` below this counts as saturated
    pub saturation: f64,

    /// A ReLU unit whose output mean and variance both fall below these is dead
    pub dead_mean: f64,
    pub dead_variance: f64,
}

impl Default for DiagnosticThresholds {
    fn default() -> Self {
        DiagnosticThresholds {
            saturation: 0.05,
            dead_mean: 0.02,
            dead_variance: 0.002,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HiddenDiagnostics {
    pub units: usize,
    /// Fraction of (sample, unit) pairs with a saturated derivative
    pub saturated_fraction: f64,
    /// Dead units, reported for ReLU layers only
    pub dead_units: Option<usize>,
    /// Mean `|∂L/∂z|` over all (sample, unit) pairs
    pub mean_gradient: f64,
    /// Mean `|∂L/∂z|` per unit
    pub sensitivities: Array1<f64>,
}

impl HiddenDiagnostics {
    /// Measures the first hidden layer of `net` on `(inputs, targets)` using a
    /// private, dropout-free pass.
    pub fn measure(
        net: &Network,
        inputs: ArrayView2<f64>,
        targets: ArrayView2<f64>,
        thresholds: &DiagnosticThresholds,
    ) -> Result<Self> {
        let pass = net.forward_pass(inputs)?;
        if targets.dim() != pass.predictions.dim() {
            return Err(Error::ShapeMismatch {
                context: "targets",
                expected: pass.predictions.dim(),
                found: targets.dim(),
            });
        }
        let delta = net
            .loss()
            .output_delta(net.output_activation(), pass.predictions.view(), targets)?;

        let deltas = net.deltas(&pass, delta);

        let first = &pass.caches[0];
        let activation = net.activation();
        let derivative = tensor::apply(first.z.view(), activation.functions().1);
        let pairs = derivative.len().max(1) as f64;
        let saturated = derivative.iter().filter(|d| d.abs() < thresholds.saturation).count();

        let dead_units = (activation == ActivationType::ReLU).then(|| dead_count(&first.a, thresholds));

        let magnitudes = deltas[0].mapv(f64::abs);
        Ok(HiddenDiagnostics {
            units: first.z.ncols(),
            saturated_fraction: saturated as f64 / pairs,
            dead_units,
            mean_gradient: magnitudes.sum() / pairs,
            sensitivities: tensor::col_mean(magnitudes.view()),
        })
    }
}

fn dead_count(a: &Array2<f64>, thresholds: &DiagnosticThresholds) -> usize {
    if a.nrows() == 0 {
        return 0;
    }
    a.axis_iter(Axis(1))
        .filter(|unit| {
            let n = unit.len() as f64;
            let mean = unit.sum() / n;
            let var = unit.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            mean < thresholds.dead_mean && var < thresholds.dead_variance
        })
        .count()
}
