use crate::activation::ActivationType;
use crate::error::{Error, Result};
use crate::loss::Loss;

/// Distribution family used for weight initialization.
///
/// The scale always follows the layer: He for ReLU hidden layers,
/// Xavier/Glorot for everything else (including the output layer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightInitStrategy {
    /// `U(-limit, limit)` with `limit = sqrt(6 / fan_in)` (He) or `sqrt(6 / (fan_in + fan_out))` (Glorot)
    Uniform,
    /// `N(0, std)` with `std = sqrt(2 / fan_in)` (He) or `sqrt(2 / (fan_in + fan_out))` (Glorot)
    Normal,
}

/// Hyperparameters for the neural network model
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Input features per sample
    pub inputs: usize,

    /// Width of each hidden layer, in order
    pub hidden: Vec<usize>,

    /// Output units
    pub outputs: usize,

    /// Activation shared by all hidden layers
    pub activation: ActivationType,

    /// Output head, `Sigmoid` for probabilities or `Linear` for raw logits.
    /// Fixed for the lifetime of the network.
    pub output_activation: ActivationType,

    pub loss: Loss,

    /// Learning rate for training
    pub learning_rate: f64,

    /// L1 penalty added as `l1 · sign(W)` to weight gradients
    pub l1: f64,

    /// L2 penalty added as `l2 · W` to weight gradients
    pub l2: f64,

    /// Inverted dropout rate on hidden activations, training mode only
    pub dropout: f64,

    pub weight_init: WeightInitStrategy,

    /// Seed for weight initialization and dropout masks
    pub seed: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            inputs: 2,
            hidden: vec![16, 16],
            outputs: 1,
            activation: ActivationType::ReLU,
            output_activation: ActivationType::Sigmoid,
            loss: Loss::BinaryCrossEntropy,
            learning_rate: 0.1,
            l1: 0.0,
            l2: 0.001,
            dropout: 0.0,
            weight_init: WeightInitStrategy::Normal,
            seed: 12345,
        }
    }
}

impl NetworkConfig {
    /// A single-hidden-layer network `inputs → hidden → outputs` with everything else defaulted.
    pub fn single_hidden(inputs: usize, hidden: usize, outputs: usize) -> Self {
        NetworkConfig {
            inputs,
            hidden: vec![hidden],
            outputs,
            ..Default::default()
        }
    }

    /// Layer widths from input to output, e.g. `[2, 16, 16, 1]`.
    pub fn dims(&self) -> Vec<usize> {
        let mut dims = Vec::with_capacity(self.hidden.len() + 2);
        dims.push(self.inputs);
        dims.extend_from_slice(&self.hidden);
        dims.push(self.outputs);
        dims
    }

    pub fn validate(&self) -> Result<()> {
        if self.dims().contains(&0) {
            return Err(Error::InvalidConfig(format!("layer widths must be > 0, got {:?}", self.dims())));
        }
        if self.hidden.is_empty() {
            return Err(Error::InvalidConfig("at least one hidden layer is required".to_owned()));
        }
        if !matches!(self.output_activation, ActivationType::Sigmoid | ActivationType::Linear) {
            return Err(Error::InvalidConfig(format!(
                "output head must be Sigmoid or Linear, got {:?}",
                self.output_activation
            )));
        }
        if !self.loss.supports_head(self.output_activation) {
            return Err(Error::InvalidConfig(format!(
                "{:?} cannot be trained through a {:?} output head",
                self.loss, self.output_activation
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(Error::InvalidConfig(format!("dropout must be in [0, 1), got {}", self.dropout)));
        }
        if self.l1 < 0.0 || self.l2 < 0.0 {
            return Err(Error::InvalidConfig("regularization strengths must be non-negative".to_owned()));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(Error::InvalidConfig(format!("learning rate must be positive, got {}", self.learning_rate)));
        }
        Ok(())
    }
}

/// Settings for one interactive training step.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    /// Minibatch size; `None` trains on the full batch every step.
    pub batch_size: Option<usize>,

    /// Seed for minibatch sampling
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            batch_size: None,
            seed: 7,
        }
    }
}
