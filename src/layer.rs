use crate::activation::ActivationType;
use crate::hyperparameters::WeightInitStrategy;
use crate::tensor;
use ndarray::{Array1, Array2, ArrayView2};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

/// Intermediate tensors of one layer from a single forward call.
///
/// Every array has as many rows as the batch that produced it.
#[derive(Debug, Clone)]
pub struct LayerCache {
    /// Activations fed into the layer (`A` of the previous layer, or `X`)
    pub input: Array2<f64>,
    /// Pre-activation `Z = input · W + b`
    pub z: Array2<f64>,
    /// Post-activation output, after the dropout mask when one was applied
    pub a: Array2<f64>,
    /// Inverted-dropout keep-mask, present only for training passes with dropout
    pub dropout_mask: Option<Array2<f64>>,
}

impl LayerCache {
    pub fn batch_size(&self) -> usize {
        self.z.nrows()
    }
}

/// Gradients of the batch-mean loss with respect to one layer's parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerGrads {
    pub weights: Array2<f64>,
    pub bias: Array1<f64>,
}

/// One affine transform followed by an element-wise activation.
///
/// Weights are stored `(inputs × neurons)` so a batch `X` (rows are samples)
/// maps forward as `X · W + b`.
#[derive(Debug, Clone)]
pub struct Layer {
    pub neurons: usize,
    pub inputs: usize,
    pub weights: Array2<f64>,
    pub bias: Array1<f64>,
    pub activation: ActivationType,
    pub(crate) cache: Option<LayerCache>,
    pub(crate) grads: Option<LayerGrads>,
}

impl Layer {
    /// Constructs a new layer with specified configuration
    ///
    /// # Arguments
    ///
    /// * `inputs` - Number of inputs to this layer
    /// * `neurons` - Number of neurons in this layer
    /// * `activation` - Activation function type for the layer
    /// * `hidden` - Whether this is a hidden layer; selects He scaling for ReLU
    /// * `strategy` - Uniform or normal initialization
    /// * `rng` - Source of randomness, normally seeded by the owning network
    pub fn new<R: Rng + ?Sized>(
        inputs: usize,
        neurons: usize,
        activation: ActivationType,
        hidden: bool,
        strategy: WeightInitStrategy,
        rng: &mut R,
    ) -> Self {
        let mut layer = Layer {
            neurons,
            inputs,
            weights: Array2::zeros((inputs, neurons)),
            bias: Array1::zeros(neurons),
            activation,
            cache: None,
            grads: None,
        };
        layer.initialize_weights(strategy, hidden, rng);
        layer
    }

    /// Builds a layer from explicit parameters, e.g. pinned test weights.
    pub fn from_parameters(weights: Array2<f64>, bias: Array1<f64>, activation: ActivationType) -> Self {
        assert_eq!(weights.ncols(), bias.len(), "Bias length does not match layer's neuron count");
        Layer {
            neurons: weights.ncols(),
            inputs: weights.nrows(),
            weights,
            bias,
            activation,
            cache: None,
            grads: None,
        }
    }

    /// Replaces all parameters with fresh samples and zero biases.
    ///
    /// He scaling is used for ReLU hidden layers, Xavier/Glorot everywhere else.
    pub fn initialize_weights<R: Rng + ?Sized>(&mut self, strategy: WeightInitStrategy, hidden: bool, rng: &mut R) {
        let fan_in = self.inputs.max(1) as f64;
        let fan_out = self.neurons.max(1) as f64;
        let he = hidden && self.activation == ActivationType::ReLU;

        self.weights = match strategy {
            WeightInitStrategy::Uniform => {
                let limit = if he { (6.0 / fan_in).sqrt() } else { (6.0 / (fan_in + fan_out)).sqrt() };
                Array2::from_shape_fn((self.inputs, self.neurons), |_| {
                    (rng.random::<f64>() * 2.0 - 1.0) * limit
                })
            }
            WeightInitStrategy::Normal => {
                let std_dev = if he { (2.0 / fan_in).sqrt() } else { (2.0 / (fan_in + fan_out)).sqrt() };
                Array2::from_shape_fn((self.inputs, self.neurons), |_| {
                    let z: f64 = StandardNormal.sample(rng);
                    z * std_dev
                })
            }
        };
        self.bias = Array1::zeros(self.neurons);
        self.cache = None;
        self.grads = None;
    }

    /// Forward propagation through the layer, returning `(Z, A)`.
    pub fn forward(&self, input: ArrayView2<f64>) -> (Array2<f64>, Array2<f64>) {
        assert_eq!(input.ncols(), self.inputs, "Input size does not match layer's input size");

        let z = tensor::add_bias_row(tensor::matmul(input, self.weights.view()).view(), self.bias.view());
        let a = tensor::apply(z.view(), self.activation.functions().0);
        (z, a)
    }

    /// `dL/dZ` from `dL/dA` for a hidden layer: `dA ⊙ f'(Z)`, then the dropout mask.
    pub fn delta(&self, cache: &LayerCache, grad_output: ArrayView2<f64>) -> Array2<f64> {
        let derivative = tensor::apply(cache.z.view(), self.activation.functions().1);
        let dz = tensor::hadamard(grad_output, derivative.view());
        match &cache.dropout_mask {
            Some(mask) => crate::dropout::Dropout::backward(dz.view(), mask.view()),
            None => dz,
        }
    }

    /// Parameter gradients and the gradient for the previous layer, given `dL/dZ`.
    ///
    /// Weight gradients are batch means: `inputᵀ · dZ / max(1, N)`.
    pub fn backward(&self, cache: &LayerCache, dz: ArrayView2<f64>) -> (LayerGrads, Array2<f64>) {
        assert_eq!(dz.dim(), cache.z.dim(), "Gradient shape does not match cached pre-activation");
        let n = dz.nrows().max(1) as f64;

        let weights = tensor::matmul(tensor::transpose(cache.input.view()).view(), dz) / n;
        let bias = tensor::col_mean(dz);
        let grad_input = tensor::matmul(dz, tensor::transpose(self.weights.view()).view());

        (LayerGrads { weights, bias }, grad_input)
    }

    pub fn cache(&self) -> Option<&LayerCache> {
        self.cache.as_ref()
    }

    pub fn grads(&self) -> Option<&LayerGrads> {
        self.grads.as_ref()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.weights.dim()
    }

    pub fn parameter_count(&self) -> usize {
        self.weights.len() + self.bias.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_backward_means_over_batch() {
        let layer = Layer::from_parameters(array![[1.0], [2.0]], array![0.5], ActivationType::Linear);
        let input = array![[1.0, 0.0], [0.0, 1.0]];
        let (z, a) = layer.forward(input.view());
        assert_eq!(z, array![[1.5], [2.5]]);

        let cache = LayerCache { input, z, a, dropout_mask: None };
        let dz = array![[1.0], [3.0]];
        let (grads, grad_input) = layer.backward(&cache, dz.view());
        assert_eq!(grads.weights, array![[0.5], [1.5]]);
        assert_eq!(grads.bias, array![2.0]);
        assert_eq!(grad_input, array![[1.0, 2.0], [3.0, 6.0]]);
    }

    #[test]
    fn test_delta_applies_mask_after_derivative() {
        let layer = Layer::from_parameters(array![[1.0, 1.0]], array![0.0, 0.0], ActivationType::ReLU);
        let input = array![[2.0]];
        let (z, a) = layer.forward(input.view());
        let cache = LayerCache {
            input,
            z,
            a,
            dropout_mask: Some(array![[2.0, 0.0]]),
        };
        let delta = layer.delta(&cache, array![[1.0, 1.0]].view());
        assert_eq!(delta, array![[2.0, 0.0]]);
    }

    #[test]
    fn test_he_and_glorot_limits() {
        let mut rng = StdRng::seed_from_u64(1);
        let relu = Layer::new(6, 50, ActivationType::ReLU, true, WeightInitStrategy::Uniform, &mut rng);
        let limit = (6.0f64 / 6.0).sqrt();
        assert!(relu.weights.iter().all(|w| w.abs() <= limit));

        let tanh = Layer::new(6, 50, ActivationType::Tanh, true, WeightInitStrategy::Uniform, &mut rng);
        let limit = (6.0f64 / 56.0).sqrt();
        assert!(tanh.weights.iter().all(|w| w.abs() <= limit));
        assert!(tanh.bias.iter().all(|&b| b == 0.0));
    }
}
