//! Dense 2-D/1-D helpers used by the forward and backward passes.
//!
//! Every function allocates its output. Shape mismatches are programming
//! errors and panic with the name of the operation.

use ndarray::{Array, Array1, Array2, ArrayView1, ArrayView2, Axis, Dimension};

/// `A · B` for an (n × m) and an (m × p) matrix.
pub fn matmul(a: ArrayView2<f64>, b: ArrayView2<f64>) -> Array2<f64> {
    assert_eq!(
        a.ncols(),
        b.nrows(),
        "matmul: inner dimensions differ ({:?} · {:?})",
        a.dim(),
        b.dim()
    );
    a.dot(&b)
}

pub fn transpose(a: ArrayView2<f64>) -> Array2<f64> {
    a.t().to_owned()
}

/// Adds `b` to every row of `a`.
pub fn add_bias_row(a: ArrayView2<f64>, b: ArrayView1<f64>) -> Array2<f64> {
    assert_eq!(
        a.ncols(),
        b.len(),
        "add_bias_row: bias length {} does not match {} columns",
        b.len(),
        a.ncols()
    );
    &a + &b
}

pub fn apply<F>(a: ArrayView2<f64>, f: F) -> Array2<f64>
where
    F: Fn(f64) -> f64,
{
    a.mapv(f)
}

pub fn hadamard(a: ArrayView2<f64>, b: ArrayView2<f64>) -> Array2<f64> {
    assert_eq!(a.dim(), b.dim(), "hadamard: shapes differ");
    &a * &b
}

pub fn col_sum(a: ArrayView2<f64>) -> Array1<f64> {
    a.sum_axis(Axis(0))
}

/// Column means with the row count floored at one, so an empty batch yields zeros.
pub fn col_mean(a: ArrayView2<f64>) -> Array1<f64> {
    col_sum(a) / a.nrows().max(1) as f64
}

/// Sign with `sign(0) = 0`.
pub fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// `dst += scale · src`.
pub fn add_in_place<D: Dimension>(dst: &mut Array<f64, D>, src: &Array<f64, D>, scale: f64) {
    assert_eq!(dst.shape(), src.shape(), "add_in_place: shapes differ");
    dst.scaled_add(scale, src);
}
