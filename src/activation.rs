/// Enum representing different activation function types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationType {
    Sigmoid,
    ReLU,
    Tanh,
    /// Identity; only meaningful as an output head producing raw logits.
    Linear,
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn sigmoid_prime(x: f64) -> f64 {
    let s = sigmoid(x);
    s * (1.0 - s)
}

fn relu(x: f64) -> f64 {
    if x > 0.0 { x } else { 0.0 }
}

fn relu_prime(x: f64) -> f64 {
    if x > 0.0 { 1.0 } else { 0.0 }
}

fn tanh(x: f64) -> f64 {
    x.tanh()
}

fn tanh_prime(x: f64) -> f64 {
    let t = x.tanh();
    1.0 - t * t
}

fn identity(x: f64) -> f64 {
    x
}

fn one(_: f64) -> f64 {
    1.0
}

impl ActivationType {
    /// The `(f, f')` pair for this activation, both taking the pre-activation.
    pub fn functions(&self) -> (fn(f64) -> f64, fn(f64) -> f64) {
        match self {
            ActivationType::Sigmoid => (sigmoid, sigmoid_prime),
            ActivationType::ReLU => (relu, relu_prime),
            ActivationType::Tanh => (tanh, tanh_prime),
            ActivationType::Linear => (identity, one),
        }
    }

    /// Applies the activation function to a given input
    pub fn apply(&self, x: f64) -> f64 {
        (self.functions().0)(x)
    }

    /// Computes the derivative of the activation function at pre-activation `x`
    pub fn derivative(&self, x: f64) -> f64 {
        (self.functions().1)(x)
    }

    /// Derivative expressed through the activation output `a = f(z)`.
    ///
    /// ReLU is recovered from the sign of `a`, which is exact since `a > 0 ⇔ z > 0`.
    pub fn derivative_from_output(&self, a: f64) -> f64 {
        match self {
            ActivationType::Sigmoid => a * (1.0 - a),
            ActivationType::ReLU => relu_prime(a),
            ActivationType::Tanh => 1.0 - a * a,
            ActivationType::Linear => 1.0,
        }
    }
}
