use log::{debug, trace};
use ndarray::{Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;

use crate::error::{Error, Result};
use crate::hyperparameters::TrainConfig;
use crate::model::Network;
use crate::optimizer::Optimizer;

/// Copies the rows named by `indices`, in order.
pub fn gather_rows(a: ArrayView2<f64>, indices: &[usize]) -> Array2<f64> {
    a.select(Axis(0), indices)
}

/// Drives single interactive training steps, full-batch or on sampled minibatches.
#[derive(Debug, Clone)]
pub struct Trainer {
    config: TrainConfig,
    rng: StdRng,
    steps: usize,
}

impl Trainer {
    pub fn new(config: TrainConfig) -> Result<Self> {
        if config.batch_size == Some(0) {
            return Err(Error::InvalidConfig("batch size must be > 0".to_owned()));
        }
        Ok(Trainer {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            steps: 0,
        })
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Steps taken so far.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Distinct row indices for the next minibatch, or `None` for a full-batch step.
    fn sample_batch(&mut self, total: usize) -> Option<Vec<usize>> {
        match self.config.batch_size {
            Some(size) if size < total => Some(index::sample(&mut self.rng, total, size).into_vec()),
            _ => None,
        }
    }

    /// One training-mode forward pass plus one optimizer update. Returns the
    /// loss of the rows actually used.
    pub fn step(
        &mut self,
        net: &mut Network,
        optimizer: &mut Optimizer,
        inputs: &Array2<f64>,
        targets: &Array2<f64>,
    ) -> Result<f64> {
        if inputs.nrows() != targets.nrows() {
            return Err(Error::ShapeMismatch {
                context: "targets",
                expected: (inputs.nrows(), targets.ncols()),
                found: targets.dim(),
            });
        }

        let (loss, rows) = match self.sample_batch(inputs.nrows()) {
            Some(indices) => {
                let x = gather_rows(inputs.view(), &indices);
                let y = gather_rows(targets.view(), &indices);
                (net.forward(&x, Some(&y), true)?.0, indices.len())
            }
            None => (net.forward(inputs, Some(targets), true)?.0, inputs.nrows()),
        };
        net.step_update(optimizer, rows)?;

        self.steps += 1;
        trace!("step {}: {} rows, loss {:.6}", self.steps, rows, loss);
        Ok(loss)
    }

    /// Runs `steps` consecutive steps and returns every step loss.
    pub fn fit(
        &mut self,
        net: &mut Network,
        optimizer: &mut Optimizer,
        inputs: &Array2<f64>,
        targets: &Array2<f64>,
        steps: usize,
    ) -> Result<Vec<f64>> {
        let mut losses = Vec::with_capacity(steps);
        for i in 0..steps {
            let loss = self.step(net, optimizer, inputs, targets)?;
            if i % 100 == 0 {
                debug!("{} step {} / {}, loss {:.6}", optimizer.name(), i, steps, loss);
            }
            losses.push(loss);
        }
        Ok(losses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hyperparameters::NetworkConfig;
    use ndarray::array;

    #[test]
    fn test_gather_rows() {
        let a = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        assert_eq!(gather_rows(a.view(), &[2, 0]), array![[5.0, 6.0], [1.0, 2.0]]);
    }

    #[test]
    fn test_minibatch_indices_are_distinct() {
        let mut trainer = Trainer::new(TrainConfig {
            batch_size: Some(8),
            seed: 3,
        })
        .unwrap();
        let mut idx = trainer.sample_batch(10).unwrap();
        idx.sort_unstable();
        idx.dedup();
        assert_eq!(idx.len(), 8);
        assert!(idx.iter().all(|&i| i < 10));
        assert!(trainer.sample_batch(8).is_none());
    }

    #[test]
    fn test_step_uses_minibatch_size() {
        let mut net = Network::new(NetworkConfig::single_hidden(2, 4, 1)).unwrap();
        let mut opt = Optimizer::sgd();
        let mut trainer = Trainer::new(TrainConfig {
            batch_size: Some(2),
            seed: 1,
        })
        .unwrap();
        let x = Array2::from_shape_fn((6, 2), |(i, j)| (i + j) as f64 * 0.1);
        let y = Array2::from_shape_fn((6, 1), |(i, _)| (i % 2) as f64);
        trainer.step(&mut net, &mut opt, &x, &y).unwrap();
        assert_eq!(trainer.steps(), 1);
        assert_eq!(net.layers[0].cache().unwrap().batch_size(), 2);
    }

    #[test]
    fn test_rejects_zero_batch_and_row_mismatch() {
        assert!(Trainer::new(TrainConfig {
            batch_size: Some(0),
            seed: 0
        })
        .is_err());

        let mut net = Network::new(NetworkConfig::single_hidden(2, 4, 1)).unwrap();
        let mut trainer = Trainer::new(TrainConfig::default()).unwrap();
        let x = Array2::zeros((3, 2));
        let y = Array2::zeros((2, 1));
        assert!(matches!(
            trainer.step(&mut net, &mut Optimizer::sgd(), &x, &y),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
