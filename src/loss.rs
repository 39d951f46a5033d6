use ndarray::{Array2, ArrayView2, Zip};

use crate::activation::ActivationType;
use crate::error::{Error, Result};

/// Probabilities are clamped into `[PROB_EPSILON, 1 - PROB_EPSILON]` before logs.
pub const PROB_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loss {
    /// `mean(0.5 · (p - y)²)`
    MeanSquaredError,
    /// Binary cross-entropy on probabilities.
    BinaryCrossEntropy,
}

impl Loss {
    /// Scalar loss averaged over the batch (rows), summed over output columns.
    pub fn calculate(&self, predictions: ArrayView2<f64>, targets: ArrayView2<f64>) -> f64 {
        assert_eq!(predictions.dim(), targets.dim(), "loss: prediction and target shapes differ");
        let n = predictions.nrows().max(1) as f64;
        let total = match self {
            Loss::MeanSquaredError => Zip::from(&predictions)
                .and(&targets)
                .fold(0.0, |acc, &p, &y| acc + 0.5 * (p - y) * (p - y)),
            Loss::BinaryCrossEntropy => Zip::from(&predictions)
                .and(&targets)
                .fold(0.0, |acc, &p, &y| {
                    let p = p.clamp(PROB_EPSILON, 1.0 - PROB_EPSILON);
                    acc - (y * p.ln() + (1.0 - y) * (1.0 - p).ln())
                }),
        };
        total / n
    }

    /// Per-element gradient `p - y`.
    ///
    /// For MSE this is `dL/dp`. For BCE it is the gradient with respect to the
    /// logit of a sigmoid output, not with respect to `p`.
    pub fn gradient(&self, predictions: ArrayView2<f64>, targets: ArrayView2<f64>) -> Array2<f64> {
        assert_eq!(predictions.dim(), targets.dim(), "loss: prediction and target shapes differ");
        &predictions - &targets
    }

    /// Gradient of the loss with respect to the output pre-activation `Z`,
    /// given the head that turned `Z` into `predictions`.
    pub fn output_delta(
        &self,
        head: ActivationType,
        predictions: ArrayView2<f64>,
        targets: ArrayView2<f64>,
    ) -> Result<Array2<f64>> {
        let diff = self.gradient(predictions, targets);
        match (self, head) {
            // sigmoid + BCE: dL/dz = p - y, the sigmoid derivative cancels against the log terms
            (Loss::BinaryCrossEntropy, ActivationType::Sigmoid) => Ok(diff),
            // sigmoid + MSE needs the full chain (p - y) · p(1 - p)
            (Loss::MeanSquaredError, ActivationType::Sigmoid) => {
                Ok(diff * &predictions.mapv(|p| p * (1.0 - p)))
            }
            (Loss::MeanSquaredError, ActivationType::Linear) => Ok(diff),
            (loss, head) => Err(Error::InvalidConfig(format!(
                "{loss:?} cannot be paired with a {head:?} output head"
            ))),
        }
    }

    /// Whether this loss can be trained through the given output head.
    pub fn supports_head(&self, head: ActivationType) -> bool {
        matches!(
            (self, head),
            (Loss::BinaryCrossEntropy, ActivationType::Sigmoid)
                | (Loss::MeanSquaredError, ActivationType::Sigmoid)
                | (Loss::MeanSquaredError, ActivationType::Linear)
        )
    }
}
