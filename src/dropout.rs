use ndarray::{Array2, ArrayView2};
use rand::Rng;

/// Inverted dropout: kept units are scaled by `1 / (1 - rate)` during training
/// so inference needs no rescaling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dropout {
    rate: f64,
    scale: f64,
}

impl Dropout {
    pub fn new(rate: f64) -> Self {
        assert!((0.0..1.0).contains(&rate), "Dropout rate must be between 0 and 1");
        Dropout {
            rate,
            scale: 1.0 / (1.0 - rate),
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn is_active(&self) -> bool {
        self.rate > 0.0
    }

    /// Samples a keep-mask holding `scale` for kept units and `0` for dropped ones.
    pub fn sample_mask<R: Rng + ?Sized>(&self, shape: (usize, usize), rng: &mut R) -> Array2<f64> {
        let keep = 1.0 - self.rate;
        Array2::from_shape_fn(shape, |_| {
            if rng.random::<f64>() < keep { self.scale } else { 0.0 }
        })
    }

    /// Applies a freshly sampled mask and returns `(output, mask)`.
    pub fn forward<R: Rng + ?Sized>(&self, input: ArrayView2<f64>, rng: &mut R) -> (Array2<f64>, Array2<f64>) {
        let mask = self.sample_mask(input.dim(), rng);
        (&input * &mask, mask)
    }

    /// Dropout is linear, so the backward pass reuses the forward mask unchanged.
    pub fn backward(grad_output: ArrayView2<f64>, mask: ArrayView2<f64>) -> Array2<f64> {
        assert_eq!(grad_output.dim(), mask.dim(), "dropout: gradient and mask shapes differ");
        &grad_output * &mask
    }
}
