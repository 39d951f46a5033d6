use ndarray::{Array1, ArrayView1};

use super::saliency::probability_gradient;
use super::{require_point, require_scalar};
use crate::error::Result;
use crate::model::Network;

/// Integrated Gradients attribution of `x` against `baseline`.
///
/// The probability gradient is averaged over the right Riemann points
/// `baseline + (k / m)(x - baseline)` for `k = 1..=m` and multiplied by
/// `x - baseline`. `steps` below 1 is treated as 1. The attributions sum to
/// approximately `p(x) - p(baseline)`, more closely as `steps` grows.
pub fn integrated_gradients(
    net: &Network,
    x: ArrayView1<f64>,
    baseline: ArrayView1<f64>,
    steps: usize,
) -> Result<Array1<f64>> {
    require_scalar(net)?;
    require_point(net, x)?;
    require_point(net, baseline)?;

    let steps = steps.max(1);
    let delta = &x - &baseline;
    let mut total = Array1::<f64>::zeros(x.len());
    for k in 1..=steps {
        let t = k as f64 / steps as f64;
        let point = &baseline + &(&delta * t);
        total += &probability_gradient(net, point.view())?;
    }
    Ok(total / steps as f64 * &delta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationType;
    use crate::hyperparameters::NetworkConfig;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Axis};

    #[test]
    fn test_zero_steps_behaves_like_one() {
        let net = Network::new(NetworkConfig::single_hidden(2, 4, 1)).unwrap();
        let x = array![0.4, -0.6];
        let base = array![0.0, 0.0];
        assert_eq!(
            integrated_gradients(&net, x.view(), base.view(), 0).unwrap(),
            integrated_gradients(&net, x.view(), base.view(), 1).unwrap()
        );
    }

    #[test]
    fn test_linear_model_is_exact() {
        // linear hidden + linear head + MSE: the network is affine, so any step count is exact
        let net = Network::with_parameters(
            NetworkConfig {
                hidden: vec![1],
                activation: ActivationType::Linear,
                output_activation: ActivationType::Linear,
                loss: crate::loss::Loss::MeanSquaredError,
                ..Default::default()
            },
            vec![(array![[2.0], [-1.0]], array![0.3]), (array![[0.5]], array![0.1])],
        )
        .unwrap();
        let x = array![1.0, 2.0];
        let base = array![-1.0, 0.5];
        let attr = integrated_gradients(&net, x.view(), base.view(), 3).unwrap();
        assert_abs_diff_eq!(attr[0], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(attr[1], -0.75, epsilon = 1e-12);

        let fx = net.predict(x.view().insert_axis(Axis(0))).unwrap()[[0, 0]];
        let fb = net.predict(base.view().insert_axis(Axis(0))).unwrap()[[0, 0]];
        assert_abs_diff_eq!(attr.sum(), fx - fb, epsilon = 1e-12);
    }
}
