use thiserror::Error;

/// Errors surfaced by the network, optimizer and explanation APIs.
///
/// Low-level tensor helpers panic instead; these variants cover mistakes made
/// at the public boundary where a caller can still recover.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error("shape mismatch in {context}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        context: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no gradients available: the last forward pass ran without targets")]
    NoGradients,

    #[error("forward pass from parameter generation {pass} used with generation {network}")]
    StaleForwardPass { pass: u64, network: u64 },

    #[error("optimizer state for layer {layer} is shaped {state:?}, layer parameters are {params:?}")]
    OptimizerStateMismatch {
        layer: usize,
        state: (usize, usize),
        params: (usize, usize),
    },

    #[error("explanations need a single output unit, network has {0}")]
    NonScalarOutput(usize),
}

pub type Result<T> = std::result::Result<T, Error>;
