mod activation;
mod dropout;
mod error;
mod hyperparameters;
mod layer;
mod loss;
mod model;
mod optimizer;

pub mod diagnostics;
pub mod explain;
pub mod metrics;
pub mod tensor;
pub mod train;

pub use activation::ActivationType;
pub use dropout::Dropout;
pub use error::{Error, Result};
pub use hyperparameters::{NetworkConfig, TrainConfig, WeightInitStrategy};
pub use layer::{Layer, LayerCache, LayerGrads};
pub use loss::{Loss, PROB_EPSILON};
pub use model::{ForwardPass, Gradients, Network};
pub use optimizer::{Adam, Momentum, Optimizer, Sgd, Slots};
