use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, trace, warn};
use ndarray::{Array1, Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::activation::ActivationType;
use crate::dropout::Dropout;
use crate::error::{Error, Result};
use crate::hyperparameters::{NetworkConfig, WeightInitStrategy};
use crate::layer::{Layer, LayerCache, LayerGrads};
use crate::loss::Loss;
use crate::optimizer::Optimizer;
use crate::tensor;

/// Source of parameter versions and generations. Every network, clone, reset
/// and update draws a fresh value, so stale state can be told apart.
static NEXT_STAMP: AtomicU64 = AtomicU64::new(1);

fn next_stamp() -> u64 {
    NEXT_STAMP.fetch_add(1, Ordering::Relaxed)
}

/// Everything one forward call produced, owned by the caller.
#[derive(Debug, Clone)]
pub struct ForwardPass {
    /// One cache per layer, input layer first
    pub caches: Vec<LayerCache>,
    /// Output head applied to the final pre-activation
    pub predictions: Array2<f64>,
    generation: u64,
}

impl ForwardPass {
    pub fn batch_size(&self) -> usize {
        self.predictions.nrows()
    }

    /// Parameter generation of the network that produced this pass.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Parameter gradients for every layer, input layer first.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradients {
    pub layers: Vec<LayerGrads>,
}

/// A dense feed-forward network with hand-written backpropagation.
#[derive(Debug)]
pub struct Network {
    pub(crate) layers: Vec<Layer>,
    pub learning_rate: f64,
    pub l1: f64,
    pub l2: f64,
    activation: ActivationType,
    output_activation: ActivationType,
    loss: Loss,
    dropout: Dropout,
    weight_init: WeightInitStrategy,
    seed: u64,
    rng: StdRng,
    /// Identifies the current parameter set; changes on construction and reset only.
    param_version: u64,
    /// Changes on every parameter mutation; forward passes are stamped with it.
    generation: u64,
    /// Rows in the batch behind the cached gradients.
    last_batch: usize,
}

impl Clone for Network {
    /// Clones parameters and caches under a new parameter version, so optimizer
    /// state bound to the original is never silently shared with the copy.
    fn clone(&self) -> Self {
        Network {
            layers: self.layers.clone(),
            learning_rate: self.learning_rate,
            l1: self.l1,
            l2: self.l2,
            activation: self.activation,
            output_activation: self.output_activation,
            loss: self.loss,
            dropout: self.dropout,
            weight_init: self.weight_init,
            seed: self.seed,
            rng: self.rng.clone(),
            param_version: next_stamp(),
            generation: next_stamp(),
            last_batch: self.last_batch,
        }
    }
}

fn build_layers(config: &NetworkConfig, rng: &mut StdRng) -> Vec<Layer> {
    let dims = config.dims();
    let last = dims.len() - 2;
    (0..dims.len() - 1)
        .map(|i| {
            let hidden = i < last;
            let activation = if hidden { config.activation } else { config.output_activation };
            Layer::new(dims[i], dims[i + 1], activation, hidden, config.weight_init, rng)
        })
        .collect()
}

/// Runs `input` through `layers`. Dropout is sampled on hidden layers only
/// when an RNG is supplied.
fn propagate(
    layers: &[Layer],
    input: ArrayView2<f64>,
    dropout: Dropout,
    mut rng: Option<&mut StdRng>,
    generation: u64,
) -> ForwardPass {
    let last = layers.len() - 1;
    let mut caches = Vec::with_capacity(layers.len());
    let mut current = input.to_owned();

    for (i, layer) in layers.iter().enumerate() {
        let (z, mut a) = layer.forward(current.view());
        let mut dropout_mask = None;
        if i < last && dropout.is_active() {
            if let Some(rng) = rng.as_deref_mut() {
                let (dropped, mask) = dropout.forward(a.view(), rng);
                a = dropped;
                dropout_mask = Some(mask);
            }
        }
        let next = a.clone();
        caches.push(LayerCache {
            input: current,
            z,
            a,
            dropout_mask,
        });
        current = next;
    }

    ForwardPass {
        caches,
        predictions: current,
        generation,
    }
}

/// `dL/dZ` of every layer, input layer first, walked back from the output
/// layer's `dL/dZ`.
pub(crate) fn layer_deltas(layers: &[Layer], caches: &[LayerCache], output_delta: Array2<f64>) -> Vec<Array2<f64>> {
    let mut deltas = Vec::with_capacity(layers.len());
    let mut dz = output_delta;
    for i in (1..layers.len()).rev() {
        let grad_a = tensor::matmul(dz.view(), tensor::transpose(layers[i].weights.view()).view());
        let previous = layers[i - 1].delta(&caches[i - 1], grad_a.view());
        deltas.push(std::mem::replace(&mut dz, previous));
    }
    deltas.push(dz);
    deltas.reverse();
    deltas
}

fn backpropagate(layers: &[Layer], caches: &[LayerCache], output_delta: Array2<f64>) -> Vec<LayerGrads> {
    layer_deltas(layers, caches, output_delta)
        .iter()
        .zip(layers.iter().zip(caches))
        .map(|(dz, (layer, cache))| layer.backward(cache, dz.view()).0)
        .collect()
}

impl Network {
    /// Create a new neural network from a validated configuration.
    ///
    /// Weights are drawn from `config.seed`; the same RNG stream then drives
    /// dropout masks.
    pub fn new(config: NetworkConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let layers = build_layers(&config, &mut rng);
        debug!(
            "network {:?}: {:?} hidden, {:?} head, {:?}, seed {}",
            config.dims(),
            config.activation,
            config.output_activation,
            config.loss,
            config.seed
        );
        Ok(Self::assemble(config, layers, rng))
    }

    /// Builds a network around explicit `(W, b)` pairs, e.g. pinned weights.
    pub fn with_parameters(config: NetworkConfig, parameters: Vec<(Array2<f64>, Array1<f64>)>) -> Result<Self> {
        config.validate()?;
        let dims = config.dims();
        if parameters.len() != dims.len() - 1 {
            return Err(Error::InvalidConfig(format!(
                "expected {} parameter pairs for {:?}, got {}",
                dims.len() - 1,
                dims,
                parameters.len()
            )));
        }
        let last = parameters.len() - 1;
        let mut layers = Vec::with_capacity(parameters.len());
        for (i, (weights, bias)) in parameters.into_iter().enumerate() {
            let expected = (dims[i], dims[i + 1]);
            if weights.dim() != expected {
                return Err(Error::ShapeMismatch {
                    context: "layer weights",
                    expected,
                    found: weights.dim(),
                });
            }
            if bias.len() != expected.1 {
                return Err(Error::ShapeMismatch {
                    context: "layer bias",
                    expected: (1, expected.1),
                    found: (1, bias.len()),
                });
            }
            let activation = if i < last { config.activation } else { config.output_activation };
            layers.push(Layer::from_parameters(weights, bias, activation));
        }
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Self::assemble(config, layers, rng))
    }

    fn assemble(config: NetworkConfig, layers: Vec<Layer>, rng: StdRng) -> Self {
        Network {
            layers,
            learning_rate: config.learning_rate,
            l1: config.l1,
            l2: config.l2,
            activation: config.activation,
            output_activation: config.output_activation,
            loss: config.loss,
            dropout: Dropout::new(config.dropout),
            weight_init: config.weight_init,
            seed: config.seed,
            rng,
            param_version: next_stamp(),
            generation: next_stamp(),
            last_batch: 0,
        }
    }

    /// Forward pass over a batch, optionally followed by backpropagation.
    ///
    /// With `targets` the loss is returned and every layer's gradients are
    /// refreshed; without them the loss is `0.0` and gradients are cleared.
    /// `train` enables dropout sampling. Caches are rebuilt on every call.
    pub fn forward(&mut self, inputs: &Array2<f64>, targets: Option<&Array2<f64>>, train: bool) -> Result<(f64, Array2<f64>)> {
        self.check_inputs(inputs.view())?;
        if let Some(targets) = targets {
            self.check_targets(inputs.view(), targets.view())?;
        }

        let rng = if train { Some(&mut self.rng) } else { None };
        let pass = propagate(&self.layers, inputs.view(), self.dropout, rng, self.generation);

        let (loss, grads) = match targets {
            Some(targets) => {
                let (loss, grads) = self.backward(&pass, targets.view())?;
                (loss, Some(grads.layers))
            }
            None => (0.0, None),
        };
        trace!("forward: batch {} train {} loss {:.6}", inputs.nrows(), train, loss);

        let ForwardPass { caches, predictions, .. } = pass;
        let mut grads = grads.map(Vec::into_iter);
        for (layer, cache) in self.layers.iter_mut().zip(caches) {
            layer.cache = Some(cache);
            layer.grads = grads.as_mut().and_then(Iterator::next);
        }
        self.last_batch = inputs.nrows();

        Ok((loss, predictions))
    }

    /// Inference-only pass returning all intermediate tensors without
    /// touching the network's own caches. Dropout is never applied.
    pub fn forward_pass(&self, inputs: ArrayView2<f64>) -> Result<ForwardPass> {
        self.check_inputs(inputs)?;
        Ok(propagate(&self.layers, inputs, self.dropout, None, self.generation))
    }

    /// Loss and parameter gradients for a pass produced by this network.
    pub fn backward(&self, pass: &ForwardPass, targets: ArrayView2<f64>) -> Result<(f64, Gradients)> {
        if pass.generation != self.generation {
            return Err(Error::StaleForwardPass {
                pass: pass.generation,
                network: self.generation,
            });
        }
        if targets.dim() != pass.predictions.dim() {
            return Err(Error::ShapeMismatch {
                context: "targets",
                expected: pass.predictions.dim(),
                found: targets.dim(),
            });
        }
        let loss = self.loss.calculate(pass.predictions.view(), targets);
        let delta = self
            .loss
            .output_delta(self.output_activation, pass.predictions.view(), targets)?;
        let layers = backpropagate(&self.layers, &pass.caches, delta);
        Ok((loss, Gradients { layers }))
    }

    /// Per-layer `dL/dZ` for `pass`, seeded with the output layer's `dL/dZ`.
    pub(crate) fn deltas(&self, pass: &ForwardPass, output_delta: Array2<f64>) -> Vec<Array2<f64>> {
        layer_deltas(&self.layers, &pass.caches, output_delta)
    }

    /// Head outputs for a batch without touching caches.
    pub fn predict(&self, inputs: ArrayView2<f64>) -> Result<Array2<f64>> {
        Ok(self.forward_pass(inputs)?.predictions)
    }

    /// Applies one optimizer update from the gradients of the last forward call.
    ///
    /// Cached gradients are batch means. They are rescaled to
    /// `sum / max(1, batch_size)`, which is the mean again when `batch_size`
    /// equals the size of that batch. L1/L2 terms are then added to the weight
    /// gradients (biases are not regularized).
    pub fn step_update(&mut self, optimizer: &mut Optimizer, batch_size: usize) -> Result<()> {
        let mut grads = Vec::with_capacity(self.layers.len());
        for layer in &mut self.layers {
            grads.push(layer.grads.take().ok_or(Error::NoGradients)?);
        }
        if batch_size != self.last_batch {
            warn!(
                "step_update: normalizing by {} but gradients came from a batch of {}",
                batch_size, self.last_batch
            );
        }

        let scale = self.last_batch.max(1) as f64 / batch_size.max(1) as f64;
        for (layer, g) in self.layers.iter().zip(grads.iter_mut()) {
            g.weights *= scale;
            g.bias *= scale;
            if self.l2 > 0.0 {
                tensor::add_in_place(&mut g.weights, &layer.weights, self.l2);
            }
            if self.l1 > 0.0 {
                tensor::add_in_place(&mut g.weights, &layer.weights.mapv(tensor::sign), self.l1);
            }
        }

        optimizer.apply(&mut self.layers, &grads, self.learning_rate, self.param_version)?;
        self.generation = next_stamp();
        trace!("step_update: {} with lr {}", optimizer.name(), self.learning_rate);
        Ok(())
    }

    /// Re-draws every parameter from `seed` with the architecture's init scheme.
    ///
    /// The parameter version changes, so optimizer state built for the old
    /// parameters is discarded on its next use.
    pub fn reset_weights(&mut self, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        let last = self.layers.len() - 1;
        for (i, layer) in self.layers.iter_mut().enumerate() {
            layer.initialize_weights(self.weight_init, i < last, &mut rng);
        }
        self.rng = rng;
        self.seed = seed;
        self.param_version = next_stamp();
        self.generation = next_stamp();
        self.last_batch = 0;
        debug!("network reset with seed {seed}");
    }

    fn check_inputs(&self, inputs: ArrayView2<f64>) -> Result<()> {
        if inputs.ncols() != self.inputs() {
            return Err(Error::ShapeMismatch {
                context: "inputs",
                expected: (inputs.nrows(), self.inputs()),
                found: inputs.dim(),
            });
        }
        Ok(())
    }

    fn check_targets(&self, inputs: ArrayView2<f64>, targets: ArrayView2<f64>) -> Result<()> {
        let expected = (inputs.nrows(), self.outputs());
        if targets.dim() != expected {
            return Err(Error::ShapeMismatch {
                context: "targets",
                expected,
                found: targets.dim(),
            });
        }
        Ok(())
    }

    /// Layers, input layer first.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Mutable access to the parameters. Forward passes taken before this
    /// call are stale afterwards.
    pub fn layers_mut(&mut self) -> &mut [Layer] {
        self.generation = next_stamp();
        &mut self.layers
    }

    pub fn inputs(&self) -> usize {
        self.layers[0].inputs
    }

    pub fn outputs(&self) -> usize {
        self.layers[self.layers.len() - 1].neurons
    }

    pub fn activation(&self) -> ActivationType {
        self.activation
    }

    pub fn output_activation(&self) -> ActivationType {
        self.output_activation
    }

    pub fn loss(&self) -> Loss {
        self.loss
    }

    /// Switches the loss; the output head stays fixed, so the pair must be trainable.
    pub fn set_loss(&mut self, loss: Loss) -> Result<()> {
        if !loss.supports_head(self.output_activation) {
            return Err(Error::InvalidConfig(format!(
                "{loss:?} cannot be trained through a {:?} output head",
                self.output_activation
            )));
        }
        self.loss = loss;
        Ok(())
    }

    pub fn dropout_rate(&self) -> f64 {
        self.dropout.rate()
    }

    pub fn set_dropout(&mut self, rate: f64) -> Result<()> {
        if !(0.0..1.0).contains(&rate) {
            return Err(Error::InvalidConfig(format!("dropout must be in [0, 1), got {rate}")));
        }
        self.dropout = Dropout::new(rate);
        Ok(())
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn param_version(&self) -> u64 {
        self.param_version
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// `(fan_in, fan_out)` of every layer.
    pub fn layer_shapes(&self) -> Vec<(usize, usize)> {
        self.layers.iter().map(Layer::shape).collect()
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(Layer::parameter_count).sum()
    }
}
