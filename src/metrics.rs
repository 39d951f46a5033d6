//! Threshold metrics for binary predictions.
//!
//! Predictions and targets are `(N × 1)` columns; a target counts as positive
//! when it exceeds 0.5 and a prediction when it reaches the threshold.

use ndarray::ArrayView2;

/// Confusion counts at one threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Confusion {
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

impl Confusion {
    pub fn at(predictions: ArrayView2<f64>, targets: ArrayView2<f64>, threshold: f64) -> Self {
        assert_eq!(predictions.dim(), targets.dim(), "metrics: prediction and target shapes differ");
        let mut c = Confusion::default();
        for (&p, &y) in predictions.column(0).iter().zip(targets.column(0).iter()) {
            match (p >= threshold, y > 0.5) {
                (true, true) => c.true_positives += 1,
                (true, false) => c.false_positives += 1,
                (false, false) => c.true_negatives += 1,
                (false, true) => c.false_negatives += 1,
            }
        }
        c
    }

    pub fn total(&self) -> usize {
        self.true_positives + self.false_positives + self.true_negatives + self.false_negatives
    }

    pub fn accuracy(&self) -> f64 {
        (self.true_positives + self.true_negatives) as f64 / self.total().max(1) as f64
    }

    /// Recall; 0 when there are no positives.
    pub fn true_positive_rate(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    /// 0 when there are no negatives.
    pub fn false_positive_rate(&self) -> f64 {
        ratio(self.false_positives, self.false_positives + self.true_negatives)
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Fraction of rows whose thresholded prediction matches the target.
pub fn accuracy(predictions: ArrayView2<f64>, targets: ArrayView2<f64>, threshold: f64) -> f64 {
    Confusion::at(predictions, targets, threshold).accuracy()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RocPoint {
    pub threshold: f64,
    pub false_positive_rate: f64,
    pub true_positive_rate: f64,
}

/// ROC points at thresholds `s / steps` for `s = 0..=steps`, from (1, 1) toward (0, 0).
pub fn roc_curve(predictions: ArrayView2<f64>, targets: ArrayView2<f64>, steps: usize) -> Vec<RocPoint> {
    let steps = steps.max(1);
    (0..=steps)
        .map(|s| {
            let threshold = s as f64 / steps as f64;
            let c = Confusion::at(predictions, targets, threshold);
            RocPoint {
                threshold,
                false_positive_rate: c.false_positive_rate(),
                true_positive_rate: c.true_positive_rate(),
            }
        })
        .collect()
}

/// Trapezoidal area under a curve from [`roc_curve`].
pub fn roc_auc(curve: &[RocPoint]) -> f64 {
    curve
        .windows(2)
        .map(|w| (w[0].false_positive_rate - w[1].false_positive_rate) * 0.5 * (w[0].true_positive_rate + w[1].true_positive_rate))
        .sum()
}
