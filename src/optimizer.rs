//! Parameter update rules.
//!
//! Optimizers own their accumulators but never the parameters. Accumulator
//! state is tagged with the network's parameter version: after
//! `Network::reset_weights` (or on a different network) the state is rebuilt
//! from zeros on the next `apply`, and state whose shapes still disagree with
//! the layers is rejected.

use log::debug;
use ndarray::{Array1, Array2, Zip};

use crate::error::{Error, Result};
use crate::layer::{Layer, LayerGrads};

/// Per-layer accumulators shaped like each layer's weights and bias.
#[derive(Debug, Clone, PartialEq)]
pub struct Slots {
    pub weights: Vec<Array2<f64>>,
    pub bias: Vec<Array1<f64>>,
}

impl Slots {
    fn zeros_like(layers: &[Layer]) -> Self {
        Slots {
            weights: layers.iter().map(|l| Array2::zeros(l.weights.dim())).collect(),
            bias: layers.iter().map(|l| Array1::zeros(l.bias.len())).collect(),
        }
    }

    fn check(&self, layers: &[Layer]) -> Result<()> {
        if self.weights.len() != layers.len() || self.bias.len() != layers.len() {
            let layer = self.weights.len().min(layers.len());
            return Err(Error::OptimizerStateMismatch {
                layer,
                state: (self.weights.len(), 0),
                params: (layers.len(), 0),
            });
        }
        for (i, layer) in layers.iter().enumerate() {
            if self.weights[i].dim() != layer.weights.dim() {
                return Err(Error::OptimizerStateMismatch {
                    layer: i,
                    state: self.weights[i].dim(),
                    params: layer.weights.dim(),
                });
            }
            if self.bias[i].len() != layer.bias.len() {
                return Err(Error::OptimizerStateMismatch {
                    layer: i,
                    state: (self.bias[i].len(), 1),
                    params: (layer.bias.len(), 1),
                });
            }
        }
        Ok(())
    }
}

/// Plain stochastic gradient descent; no state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sgd;

impl Sgd {
    fn apply(&mut self, layers: &mut [Layer], grads: &[LayerGrads], learning_rate: f64) {
        for (layer, g) in layers.iter_mut().zip(grads) {
            layer.weights.scaled_add(-learning_rate, &g.weights);
            layer.bias.scaled_add(-learning_rate, &g.bias);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct MomentumState {
    version: u64,
    velocity: Slots,
}

/// Exponentially averaged velocity: `v = β·v + (1-β)·g`, `W -= lr·v`.
#[derive(Debug, Clone, PartialEq)]
pub struct Momentum {
    pub beta: f64,
    state: Option<MomentumState>,
}

impl Default for Momentum {
    fn default() -> Self {
        Momentum { beta: 0.9, state: None }
    }
}

impl Momentum {
    pub fn new(beta: f64) -> Self {
        Momentum { beta, state: None }
    }

    pub fn velocity(&self) -> Option<&Slots> {
        self.state.as_ref().map(|s| &s.velocity)
    }

    fn apply(&mut self, layers: &mut [Layer], grads: &[LayerGrads], learning_rate: f64, version: u64) -> Result<()> {
        if self.state.as_ref().map_or(false, |s| s.version != version) {
            self.state = None;
        }
        let beta = self.beta;
        let state = self.state.get_or_insert_with(|| {
            debug!("momentum: allocating velocity for parameter version {version}");
            MomentumState {
                version,
                velocity: Slots::zeros_like(layers),
            }
        });
        state.velocity.check(layers)?;

        for (i, (layer, g)) in layers.iter_mut().zip(grads).enumerate() {
            let v = &mut state.velocity.weights[i];
            Zip::from(&mut *v)
                .and(&g.weights)
                .for_each(|v, &g| *v = beta * *v + (1.0 - beta) * g);
            layer.weights.scaled_add(-learning_rate, &*v);

            let vb = &mut state.velocity.bias[i];
            Zip::from(&mut *vb)
                .and(&g.bias)
                .for_each(|v, &g| *v = beta * *v + (1.0 - beta) * g);
            layer.bias.scaled_add(-learning_rate, &*vb);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
struct AdamState {
    version: u64,
    step: i32,
    m: Slots,
    v: Slots,
}

/// Adam with bias-corrected first and second moments.
#[derive(Debug, Clone, PartialEq)]
pub struct Adam {
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    state: Option<AdamState>,
}

impl Default for Adam {
    fn default() -> Self {
        Adam {
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            state: None,
        }
    }
}

impl Adam {
    pub fn new(beta1: f64, beta2: f64, epsilon: f64) -> Self {
        Adam { beta1, beta2, epsilon, state: None }
    }

    /// Number of updates applied since the state was last (re)built.
    pub fn step(&self) -> i32 {
        self.state.as_ref().map_or(0, |s| s.step)
    }

    fn apply(&mut self, layers: &mut [Layer], grads: &[LayerGrads], learning_rate: f64, version: u64) -> Result<()> {
        if self.state.as_ref().map_or(false, |s| s.version != version) {
            self.state = None;
        }
        let (beta1, beta2, eps) = (self.beta1, self.beta2, self.epsilon);
        let state = self.state.get_or_insert_with(|| {
            debug!("adam: allocating moments for parameter version {version}");
            AdamState {
                version,
                step: 0,
                m: Slots::zeros_like(layers),
                v: Slots::zeros_like(layers),
            }
        });
        state.m.check(layers)?;
        state.v.check(layers)?;

        // one time step for the whole update, shared by every parameter
        state.step += 1;
        let corr1 = 1.0 / (1.0 - beta1.powi(state.step));
        let corr2 = 1.0 / (1.0 - beta2.powi(state.step));

        let update = |w: &mut f64, m: &mut f64, v: &mut f64, g: f64| {
            *m = beta1 * *m + (1.0 - beta1) * g;
            *v = beta2 * *v + (1.0 - beta2) * g * g;
            let m_hat = *m * corr1;
            let v_hat = *v * corr2;
            *w -= learning_rate * m_hat / (v_hat.sqrt() + eps);
        };

        for (i, (layer, g)) in layers.iter_mut().zip(grads).enumerate() {
            Zip::from(&mut layer.weights)
                .and(&mut state.m.weights[i])
                .and(&mut state.v.weights[i])
                .and(&g.weights)
                .for_each(|w, m, v, &g| update(w, m, v, g));
            Zip::from(&mut layer.bias)
                .and(&mut state.m.bias[i])
                .and(&mut state.v.bias[i])
                .and(&g.bias)
                .for_each(|w, m, v, &g| update(w, m, v, g));
        }
        Ok(())
    }
}

/// The closed set of update rules.
#[derive(Debug, Clone, PartialEq)]
pub enum Optimizer {
    Sgd(Sgd),
    Momentum(Momentum),
    Adam(Adam),
}

impl Optimizer {
    pub fn sgd() -> Self {
        Optimizer::Sgd(Sgd)
    }

    pub fn momentum(beta: f64) -> Self {
        Optimizer::Momentum(Momentum::new(beta))
    }

    pub fn adam() -> Self {
        Optimizer::Adam(Adam::default())
    }

    pub fn name(&self) -> &'static str {
        match self {
            Optimizer::Sgd(_) => "SGD",
            Optimizer::Momentum(_) => "Momentum",
            Optimizer::Adam(_) => "Adam",
        }
    }

    /// Drops all accumulated state.
    pub fn reset(&mut self) {
        match self {
            Optimizer::Sgd(_) => {}
            Optimizer::Momentum(m) => m.state = None,
            Optimizer::Adam(a) => a.state = None,
        }
    }

    /// Applies one update. `grads` must already be normalized and regularized.
    pub fn apply(
        &mut self,
        layers: &mut [Layer],
        grads: &[LayerGrads],
        learning_rate: f64,
        version: u64,
    ) -> Result<()> {
        if grads.len() != layers.len() {
            return Err(Error::ShapeMismatch {
                context: "optimizer gradients",
                expected: (layers.len(), 1),
                found: (grads.len(), 1),
            });
        }
        for (layer, g) in layers.iter().zip(grads) {
            if g.weights.dim() != layer.weights.dim() {
                return Err(Error::ShapeMismatch {
                    context: "optimizer weight gradient",
                    expected: layer.weights.dim(),
                    found: g.weights.dim(),
                });
            }
            if g.bias.len() != layer.bias.len() {
                return Err(Error::ShapeMismatch {
                    context: "optimizer bias gradient",
                    expected: (layer.bias.len(), 1),
                    found: (g.bias.len(), 1),
                });
            }
        }

        match self {
            Optimizer::Sgd(sgd) => {
                sgd.apply(layers, grads, learning_rate);
                Ok(())
            }
            Optimizer::Momentum(m) => m.apply(layers, grads, learning_rate, version),
            Optimizer::Adam(a) => a.apply(layers, grads, learning_rate, version),
        }
    }
}
