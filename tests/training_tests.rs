use ndarray::Array2;
use probe::metrics::accuracy;
use probe::train::Trainer;
use probe::{ActivationType, Error, Network, NetworkConfig, Optimizer, TrainConfig};

/// 5×5 grid over `[-1, 1]²` labelled by `x + y > 0`, without points near the diagonal.
fn separable() -> (Array2<f64>, Array2<f64>) {
    let mut xs = Vec::new();
    let mut ys = Vec::new();
    for i in 0..5 {
        for j in 0..5 {
            let (a, b) = (-1.0 + 0.5 * i as f64, -1.0 + 0.5 * j as f64);
            if (a + b).abs() < 0.2 {
                continue;
            }
            xs.extend_from_slice(&[a, b]);
            ys.push(if a + b > 0.0 { 1.0 } else { 0.0 });
        }
    }
    let n = ys.len();
    (
        Array2::from_shape_vec((n, 2), xs).unwrap(),
        Array2::from_shape_vec((n, 1), ys).unwrap(),
    )
}

fn tanh_net(learning_rate: f64, dropout: f64) -> Network {
    Network::new(NetworkConfig {
        hidden: vec![8],
        activation: ActivationType::Tanh,
        learning_rate,
        l2: 0.0,
        dropout,
        seed: 2024,
        ..Default::default()
    })
    .unwrap()
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

#[test]
fn test_every_optimizer_fits_separable_data() {
    let (x, y) = separable();
    let cases = [(Optimizer::sgd(), 0.5), (Optimizer::momentum(0.9), 0.5), (Optimizer::adam(), 0.05)];

    for (mut optimizer, lr) in cases {
        let mut net = tanh_net(lr, 0.0);
        let mut trainer = Trainer::new(TrainConfig::default()).unwrap();
        let losses = trainer.fit(&mut net, &mut optimizer, &x, &y, 300).unwrap();

        let first = losses[0];
        let last = losses[losses.len() - 1];
        assert!(last < 0.1, "{}: final loss {last}", optimizer.name());
        assert!(last < 0.25 * first, "{}: {first} -> {last}", optimizer.name());
        assert!(mean(&losses[280..]) < mean(&losses[..20]));

        let p = net.predict(x.view()).unwrap();
        assert_eq!(accuracy(p.view(), y.view(), 0.5), 1.0, "{}", optimizer.name());
    }
}

#[test]
fn test_dropout_training_still_learns() {
    let (x, y) = separable();
    let mut net = tanh_net(0.5, 0.3);
    let mut optimizer = Optimizer::sgd();
    let (initial, _) = net.forward(&x, Some(&y), false).unwrap();

    let mut trainer = Trainer::new(TrainConfig::default()).unwrap();
    trainer.fit(&mut net, &mut optimizer, &x, &y, 300).unwrap();

    let (trained, _) = net.forward(&x, Some(&y), false).unwrap();
    assert!(trained < 0.5 * initial, "{initial} -> {trained}");
}

#[test]
fn test_reset_rebuilds_optimizer_state() {
    let (x, y) = separable();
    let mut net = tanh_net(0.05, 0.0);
    let mut optimizer = Optimizer::adam();
    let mut trainer = Trainer::new(TrainConfig::default()).unwrap();
    trainer.fit(&mut net, &mut optimizer, &x, &y, 5).unwrap();
    let Optimizer::Adam(adam) = &optimizer else {
        panic!("expected Adam");
    };
    assert_eq!(adam.step(), 5);

    net.reset_weights(3);
    trainer.step(&mut net, &mut optimizer, &x, &y).unwrap();
    let Optimizer::Adam(adam) = &optimizer else {
        panic!("expected Adam");
    };
    assert_eq!(adam.step(), 1);
}

#[test]
fn test_step_without_gradients_fails() {
    let (x, _) = separable();
    let mut net = tanh_net(0.1, 0.0);
    net.forward(&x, None, false).unwrap();
    assert_eq!(net.step_update(&mut Optimizer::sgd(), x.nrows()), Err(Error::NoGradients));
}

#[test]
fn test_gradients_are_consumed_by_step() {
    let (x, y) = separable();
    let mut net = tanh_net(0.1, 0.0);
    let mut optimizer = Optimizer::momentum(0.9);
    net.forward(&x, Some(&y), true).unwrap();
    net.step_update(&mut optimizer, x.nrows()).unwrap();
    assert_eq!(net.step_update(&mut optimizer, x.nrows()), Err(Error::NoGradients));
}

#[test]
fn test_minibatch_training_learns() {
    let (x, y) = separable();
    let mut net = tanh_net(0.5, 0.0);
    let mut optimizer = Optimizer::sgd();
    let (initial, _) = net.forward(&x, Some(&y), false).unwrap();

    let mut trainer = Trainer::new(TrainConfig {
        batch_size: Some(6),
        seed: 11,
    })
    .unwrap();
    trainer.fit(&mut net, &mut optimizer, &x, &y, 400).unwrap();

    let (trained, _) = net.forward(&x, Some(&y), false).unwrap();
    assert!(trained < 0.5 * initial, "{initial} -> {trained}");
}
