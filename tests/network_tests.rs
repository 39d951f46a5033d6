use approx::assert_abs_diff_eq;
use ndarray::{array, Array1, Array2};
use probe::train::Trainer;
use probe::{
    ActivationType, Error, Loss, Network, NetworkConfig, Optimizer, TrainConfig, WeightInitStrategy,
};

fn xor() -> (Array2<f64>, Array2<f64>) {
    (
        array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]],
        array![[0.0], [1.0], [1.0], [0.0]],
    )
}

fn loss_at(net: &Network, x: &Array2<f64>, y: &Array2<f64>) -> f64 {
    let pass = net.forward_pass(x.view()).unwrap();
    net.loss().calculate(pass.predictions.view(), y.view())
}

/// Central differences of the batch loss for every parameter.
fn numeric_grads(net: &Network, x: &Array2<f64>, y: &Array2<f64>) -> Vec<(Array2<f64>, Array1<f64>)> {
    let h = 1e-5;
    let mut shifted = net.clone();
    let mut out = Vec::new();
    for l in 0..net.layers().len() {
        let mut dw = Array2::<f64>::zeros(net.layers()[l].weights.dim());
        for idx in ndarray::indices(dw.dim()) {
            let original = shifted.layers()[l].weights[idx];
            shifted.layers_mut()[l].weights[idx] = original + h;
            let plus = loss_at(&shifted, x, y);
            shifted.layers_mut()[l].weights[idx] = original - h;
            let minus = loss_at(&shifted, x, y);
            shifted.layers_mut()[l].weights[idx] = original;
            dw[idx] = (plus - minus) / (2.0 * h);
        }
        let mut db = Array1::<f64>::zeros(net.layers()[l].bias.len());
        for j in 0..db.len() {
            let original = shifted.layers()[l].bias[j];
            shifted.layers_mut()[l].bias[j] = original + h;
            let plus = loss_at(&shifted, x, y);
            shifted.layers_mut()[l].bias[j] = original - h;
            let minus = loss_at(&shifted, x, y);
            shifted.layers_mut()[l].bias[j] = original;
            db[j] = (plus - minus) / (2.0 * h);
        }
        out.push((dw, db));
    }
    out
}

#[test]
fn test_gradients_match_finite_differences() {
    let x = array![[0.3, -0.7], [1.1, 0.4], [-0.5, 0.9], [0.05, 0.6], [-1.2, -0.3], [0.8, -1.0]];
    let labels = array![[1.0], [0.0], [1.0], [1.0], [0.0], [0.0]];
    let real = array![[0.4], [-1.3], [0.9], [0.2], [-0.6], [1.5]];

    let heads = [
        (ActivationType::Sigmoid, Loss::BinaryCrossEntropy),
        (ActivationType::Sigmoid, Loss::MeanSquaredError),
        (ActivationType::Linear, Loss::MeanSquaredError),
    ];
    let hidden_activations = [ActivationType::Tanh, ActivationType::Sigmoid, ActivationType::ReLU];

    for hidden in [vec![4], vec![4, 3]] {
        for &activation in &hidden_activations {
            for &(head, loss) in &heads {
                let net = Network::new(NetworkConfig {
                    hidden: hidden.clone(),
                    activation,
                    output_activation: head,
                    loss,
                    seed: 99,
                    ..Default::default()
                })
                .unwrap();
                let y = if head == ActivationType::Linear { &real } else { &labels };

                let pass = net.forward_pass(x.view()).unwrap();
                let (_, grads) = net.backward(&pass, y.view()).unwrap();
                let numeric = numeric_grads(&net, &x, y);

                for (l, (g, (dw, db))) in grads.layers.iter().zip(numeric.iter()).enumerate() {
                    for (a, n) in g.weights.iter().zip(dw.iter()) {
                        assert!(
                            (a - n).abs() < 1e-6,
                            "{hidden:?} {activation:?} {head:?}/{loss:?} layer {l}: dW {a} vs {n}"
                        );
                    }
                    for (a, n) in g.bias.iter().zip(db.iter()) {
                        assert!(
                            (a - n).abs() < 1e-6,
                            "{hidden:?} {activation:?} {head:?}/{loss:?} layer {l}: db {a} vs {n}"
                        );
                    }
                }
            }
        }
    }
}

#[test]
fn test_golden_xor_step() {
    let config = NetworkConfig {
        hidden: vec![3],
        activation: ActivationType::Tanh,
        learning_rate: 0.05,
        l2: 0.0,
        ..Default::default()
    };
    let mut net = Network::with_parameters(
        config,
        vec![
            (array![[0.5, -0.4, 0.3], [0.2, 0.6, -0.7]], array![0.1, -0.1, 0.05]),
            (array![[0.7], [-0.5], [0.9]], array![0.2]),
        ],
    )
    .unwrap();
    let (x, y) = xor();

    let (before, p) = net.forward(&x, Some(&y), true).unwrap();
    assert_abs_diff_eq!(before, 0.7291915218690013, epsilon = 1e-12);
    let expected = [0.5901448307378478, 0.4154104961538799, 0.7520790076145476, 0.5774352808829191];
    for (got, want) in p.column(0).iter().zip(expected) {
        assert_abs_diff_eq!(*got, want, epsilon = 1e-12);
    }

    net.step_update(&mut Optimizer::sgd(), 4).unwrap();
    assert_abs_diff_eq!(net.layers()[1].weights[[0, 0]], 0.6982648418301675, epsilon = 1e-12);
    assert_abs_diff_eq!(net.layers()[1].bias[0], 0.19581162980763508, epsilon = 1e-12);
    assert_abs_diff_eq!(net.layers()[0].weights[[1, 2]], -0.7013337720573158, epsilon = 1e-12);

    let (after, _) = net.forward(&x, Some(&y), false).unwrap();
    assert_abs_diff_eq!(after, 0.7273774561380203, epsilon = 1e-12);
}

#[test]
fn test_golden_seeded_xor_step() {
    let mut net = Network::new(NetworkConfig {
        hidden: vec![3],
        activation: ActivationType::Tanh,
        learning_rate: 0.05,
        l2: 0.0,
        seed: 123,
        ..Default::default()
    })
    .unwrap();
    let (x, y) = xor();

    let (before, _) = net.forward(&x, Some(&y), true).unwrap();
    assert_abs_diff_eq!(before, 0.7057928792009358, epsilon = 1e-12);

    net.step_update(&mut Optimizer::sgd(), 4).unwrap();
    let (after, _) = net.forward(&x, Some(&y), false).unwrap();
    assert_abs_diff_eq!(after, 0.7056503550034415, epsilon = 1e-12);
}

#[test]
fn test_seeded_runs_are_bit_identical() {
    let run = || {
        let mut net = Network::new(NetworkConfig {
            hidden: vec![3],
            activation: ActivationType::Tanh,
            learning_rate: 0.05,
            dropout: 0.2,
            seed: 123,
            ..Default::default()
        })
        .unwrap();
        let mut opt = Optimizer::adam();
        let mut trainer = Trainer::new(TrainConfig {
            batch_size: Some(3),
            seed: 123,
        })
        .unwrap();
        let (x, y) = xor();
        let losses = trainer.fit(&mut net, &mut opt, &x, &y, 25).unwrap();
        (losses, net.layers()[0].weights.clone(), net.layers()[1].weights.clone())
    };
    assert_eq!(run(), run());
}

#[test]
fn test_reset_weights_is_reproducible() {
    let config = NetworkConfig {
        weight_init: WeightInitStrategy::Uniform,
        ..Default::default()
    };
    let mut a = Network::new(config.clone()).unwrap();
    let b = Network::new(config).unwrap();
    for (la, lb) in a.layers().iter().zip(b.layers().iter()) {
        assert_eq!(la.weights, lb.weights);
    }

    let version = a.param_version();
    a.reset_weights(77);
    let first: Vec<_> = a.layers().iter().map(|l| l.weights.clone()).collect();
    a.reset_weights(77);
    let second: Vec<_> = a.layers().iter().map(|l| l.weights.clone()).collect();
    assert_eq!(first, second);
    assert_ne!(a.param_version(), version);
    assert_eq!(a.seed(), 77);
    assert_ne!(first[0], b.layers()[0].weights);
    assert!(a.layers().iter().all(|l| l.bias.iter().all(|&v| v == 0.0)));
}

#[test]
fn test_construction_rejects_bad_configs() {
    let linear_bce = NetworkConfig {
        output_activation: ActivationType::Linear,
        loss: Loss::BinaryCrossEntropy,
        ..Default::default()
    };
    assert!(matches!(Network::new(linear_bce), Err(Error::InvalidConfig(_))));

    let no_hidden = NetworkConfig {
        hidden: vec![],
        ..Default::default()
    };
    assert!(matches!(Network::new(no_hidden), Err(Error::InvalidConfig(_))));

    let wrong_params = Network::with_parameters(
        NetworkConfig::single_hidden(2, 3, 1),
        vec![(Array2::zeros((2, 4)), Array1::zeros(4)), (Array2::zeros((4, 1)), Array1::zeros(1))],
    );
    assert!(matches!(wrong_params, Err(Error::ShapeMismatch { .. })));
}

#[test]
fn test_set_loss_respects_head() {
    let mut net = Network::new(NetworkConfig {
        output_activation: ActivationType::Linear,
        loss: Loss::MeanSquaredError,
        ..Default::default()
    })
    .unwrap();
    assert!(net.set_loss(Loss::BinaryCrossEntropy).is_err());
    assert_eq!(net.loss(), Loss::MeanSquaredError);
}
