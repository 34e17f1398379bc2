//! Distance and stress model shared by all majorization variants.

use faer::{Mat, MatRef};

use crate::core::unfolding::data::TINY;

///////////////
// Distances //
///////////////

/// Euclidean distance between row `i` of `x` and row `j` of `y`
#[inline]
pub fn row_distance(x: MatRef<f64>, i: usize, y: MatRef<f64>, j: usize) -> f64 {
    let mut ssq = 0.0;
    for k in 0..x.ncols() {
        let diff = x[(i, k)] - y[(j, k)];
        ssq += diff * diff;
    }
    ssq.sqrt()
}

/// Euclidean distances between two configurations
///
/// ### Params
///
/// * `x` - Row configuration of size n x p
/// * `y` - Column configuration of size m x p
///
/// ### Returns
///
/// The n x m distance matrix.
pub fn euclidean_between(x: MatRef<f64>, y: MatRef<f64>) -> Mat<f64> {
    Mat::from_fn(x.nrows(), y.nrows(), |i, j| row_distance(x, i, y, j))
}

/// Recompute the distances in place
pub fn update_distances(x: MatRef<f64>, y: MatRef<f64>, d: &mut Mat<f64>) {
    for j in 0..y.nrows() {
        for i in 0..x.nrows() {
            d[(i, j)] = row_distance(x, i, y, j);
        }
    }
}

////////////
// Stress //
////////////

/// Weighted sum of squared dissimilarities, the stress normalisation constant
pub fn stress_scale(delta: MatRef<f64>, w: MatRef<f64>) -> f64 {
    let mut scale = 0.0;
    for j in 0..delta.ncols() {
        for i in 0..delta.nrows() {
            scale += w[(i, j)] * delta[(i, j)] * delta[(i, j)];
        }
    }
    scale
}

/// Raw weighted stress `sum w * (delta - d)^2`
pub fn raw_stress(delta: MatRef<f64>, w: MatRef<f64>, d: MatRef<f64>) -> f64 {
    let mut stress = 0.0;
    for j in 0..delta.ncols() {
        for i in 0..delta.nrows() {
            let residual = delta[(i, j)] - d[(i, j)];
            stress += w[(i, j)] * residual * residual;
        }
    }
    stress
}

/// Normalised weighted stress
///
/// ### Params
///
/// * `delta` - Target dissimilarities
/// * `w` - Weights (zero weights exclude a cell)
/// * `d` - Fitted distances
/// * `scale` - Normalisation constant, usually `stress_scale(delta, w)`
///
/// ### Returns
///
/// `sum w * (delta - d)^2 / scale`
pub fn normalised_stress(delta: MatRef<f64>, w: MatRef<f64>, d: MatRef<f64>, scale: f64) -> f64 {
    raw_stress(delta, w, d) / scale
}

/// Guttman transform weights
///
/// `b_ij = w_ij * delta_ij / d_ij`, or zero where `d_ij < TINY`.
pub fn guttman_weights(delta: MatRef<f64>, w: MatRef<f64>, d: MatRef<f64>) -> Mat<f64> {
    Mat::from_fn(delta.nrows(), delta.ncols(), |i, j| {
        let dij = d[(i, j)];
        if dij < TINY {
            0.0
        } else {
            w[(i, j)] * delta[(i, j)] / dij
        }
    })
}

///////////
// Tests //
///////////
