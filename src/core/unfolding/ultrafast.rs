//! Stochastic ("ultrafast") unfolding.
//!
//! Instead of full batch updates, every micro-update samples one (or two)
//! row and column objects and moves them toward the single pair majorization
//! target with an annealed mixing rate. There is no convergence test; the
//! work is fixed by `n_steps`. The generator is owned by the call, so equal
//! seeds give bit-identical results.

use faer::{Mat, MatRef};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::core::unfolding::data::{
    is_fixed, resolve_weights, validate_delta, FixedMask, MAX_RATE, TINY,
};
use crate::core::unfolding::params::UltrafastParams;
use crate::core::unfolding::stress::row_distance;
use crate::utils::errors::MduResult;
use crate::{ensure_dims, ensure_param};

/// Offset of the learning rate of the restricted loadings
const LOADINGS_RATE_OFFSET: f64 = 1000.0;

/////////////
// Sampler //
/////////////

/// Uniform index sampler over the row and column objects
///
/// ### Fields
///
/// * `rng` - Generator owned by one call
/// * `n` - Number of row objects
/// * `m` - Number of column objects
pub struct IndexSampler {
    rng: StdRng,
    n: usize,
    m: usize,
}

impl IndexSampler {
    /// Generate a new sampler
    ///
    /// ### Params
    ///
    /// * `seed` - Random seed for reproducibility purposes
    /// * `n` - Number of row objects (must be positive)
    /// * `m` - Number of column objects (must be positive)
    pub fn new(seed: u64, n: usize, m: usize) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            n,
            m,
        }
    }

    /// Draw a row index, then a column index
    pub fn next_pair(&mut self) -> (usize, usize) {
        let i = self.rng.random_range(0..self.n);
        let j = self.rng.random_range(0..self.m);
        (i, j)
    }

    /// Draw two row indices, then two column indices
    pub fn next_quad(&mut self) -> ([usize; 2], [usize; 2]) {
        let i1 = self.rng.random_range(0..self.n);
        let i2 = self.rng.random_range(0..self.n);
        let j1 = self.rng.random_range(0..self.m);
        let j2 = self.rng.random_range(0..self.m);
        ([i1, i2], [j1, j2])
    }
}

/// Structure to store the bookkeeping of a stochastic run
///
/// ### Fields
///
/// * `n_updates` - Number of micro-updates performed
/// * `n_skipped` - Number of draws skipped (zero weight or zero distance)
/// * `final_rate` - Mixing rate after the last step
#[derive(Clone, Debug, PartialEq)]
pub struct UltrafastSummary {
    pub n_updates: usize,
    pub n_skipped: usize,
    pub final_rate: f64,
}

/// Check the common inputs and return the weights
fn check_inputs(
    delta: MatRef<f64>,
    weights: Option<MatRef<f64>>,
    y: &Mat<f64>,
    fixed_y: Option<&FixedMask>,
    p: usize,
    params: &UltrafastParams,
) -> MduResult<Mat<f64>> {
    params.validate()?;
    validate_delta(delta)?;
    let (n, m) = delta.shape();
    ensure_param!(
        n > 0 && m > 0,
        "stochastic unfolding needs at least one row and one column object"
    );
    ensure_dims!(y, m, p, "column configuration");
    if let Some(mask) = fixed_y {
        ensure_dims!(mask, m, p, "column mask");
    }
    resolve_weights(weights, n, m)
}

/////////////
// Engines //
/////////////

/// Stochastic unfolding with single pair updates
///
/// Every step performs `n + m` micro-updates. A draw `(i, j)` with zero weight
/// or a distance below `TINY` is skipped; otherwise with `b = delta / d` and
/// `t = b * (x_i - y_j)` the endpoints move to
/// `x_i = (1 - mu) * x_i + mu * (t + y_j)` and
/// `y_j = (1 - mu) * y_j + mu * (x_i - t)`. Only zero versus non-zero
/// weights matter. Fixed coordinates are never written.
///
/// ### Params
///
/// * `delta` - Dissimilarities of size n x m
/// * `weights` - Optional weights of size n x m
/// * `x` - Row configuration of size n x p, updated in place
/// * `fixed_x` - Optional mask of fixed row coordinates
/// * `y` - Column configuration of size m x p, updated in place
/// * `fixed_y` - Optional mask of fixed column coordinates
/// * `params` - Step budget, final rate and seed
///
/// ### Returns
///
/// The `UltrafastSummary` of the run.
pub fn ultrafast_mdu(
    delta: MatRef<f64>,
    weights: Option<MatRef<f64>>,
    x: &mut Mat<f64>,
    fixed_x: Option<&FixedMask>,
    y: &mut Mat<f64>,
    fixed_y: Option<&FixedMask>,
    params: &UltrafastParams,
) -> MduResult<UltrafastSummary> {
    let (n, m) = delta.shape();
    let p = x.ncols();
    let w = check_inputs(delta, weights, y, fixed_y, p, params)?;
    ensure_dims!(x, n, p, "row configuration");
    if let Some(mask) = fixed_x {
        ensure_dims!(mask, n, p, "row mask");
    }

    let mut sampler = IndexSampler::new(params.seed, n, m);
    let decay = params.decay();
    let mut mu = MAX_RATE;
    let mut n_updates = 0;
    let mut n_skipped = 0;

    for _ in 0..params.n_steps {
        let cmu = 1.0 - mu;
        for _ in 0..n + m {
            let (i, j) = sampler.next_pair();
            if w[(i, j)] == 0.0 {
                n_skipped += 1;
                continue;
            }
            let d = row_distance(x.as_ref(), i, y.as_ref(), j);
            if d < TINY {
                n_skipped += 1;
                continue;
            }
            let b = delta[(i, j)] / d;
            for k in 0..p {
                let xk = x[(i, k)];
                let yk = y[(j, k)];
                let t = b * (xk - yk);
                if !is_fixed(fixed_x, i, k) {
                    x[(i, k)] = cmu * xk + mu * (t + yk);
                }
                if !is_fixed(fixed_y, j, k) {
                    y[(j, k)] = cmu * yk + mu * (xk - t);
                }
            }
            n_updates += 1;
        }
        mu *= decay;
    }

    Ok(UltrafastSummary {
        n_updates,
        n_skipped,
        final_rate: mu,
    })
}

/// Stochastic unfolding with paired updates
///
/// Every micro-update draws two rows and two columns and moves all four
/// points to the weighted majorization target of the four pairwise
/// distances among them. An endpoint whose pair weights sum to zero is left
/// alone, as are fixed coordinates.
///
/// ### Params
///
/// * `delta` - Dissimilarities of size n x m
/// * `weights` - Optional weights of size n x m (the pair weights)
/// * `x` - Row configuration of size n x p, updated in place
/// * `fixed_x` - Optional mask of fixed row coordinates
/// * `y` - Column configuration of size m x p, updated in place
/// * `fixed_y` - Optional mask of fixed column coordinates
/// * `params` - Step budget, final rate and seed
///
/// ### Returns
///
/// The `UltrafastSummary` of the run.
pub fn ultrafast_paired_mdu(
    delta: MatRef<f64>,
    weights: Option<MatRef<f64>>,
    x: &mut Mat<f64>,
    fixed_x: Option<&FixedMask>,
    y: &mut Mat<f64>,
    fixed_y: Option<&FixedMask>,
    params: &UltrafastParams,
) -> MduResult<UltrafastSummary> {
    let (n, m) = delta.shape();
    let p = x.ncols();
    let w = check_inputs(delta, weights, y, fixed_y, p, params)?;
    ensure_dims!(x, n, p, "row configuration");
    if let Some(mask) = fixed_x {
        ensure_dims!(mask, n, p, "row mask");
    }

    let mut sampler = IndexSampler::new(params.seed, n, m);
    let decay = params.decay();
    let mut mu = MAX_RATE;
    let mut n_updates = 0;
    let mut n_skipped = 0;

    for _ in 0..params.n_steps {
        let cmu = 1.0 - mu;
        for _ in 0..n + m {
            let (rows, cols) = sampler.next_quad();

            // pair weights and Guttman weights, indexed [row][col]
            let mut pw = [[0.0; 2]; 2];
            let mut pb = [[0.0; 2]; 2];
            for (a, &i) in rows.iter().enumerate() {
                for (c, &j) in cols.iter().enumerate() {
                    pw[a][c] = w[(i, j)];
                    let d = row_distance(x.as_ref(), i, y.as_ref(), j);
                    pb[a][c] = if d < TINY {
                        0.0
                    } else {
                        pw[a][c] * delta[(i, j)] / d
                    };
                }
            }
            let row_w = [pw[0][0] + pw[0][1], pw[1][0] + pw[1][1]];
            let col_w = [pw[0][0] + pw[1][0], pw[0][1] + pw[1][1]];
            if row_w[0] + row_w[1] == 0.0 {
                n_skipped += 1;
                continue;
            }
            let row_b = [pb[0][0] + pb[0][1], pb[1][0] + pb[1][1]];
            let col_b = [pb[0][0] + pb[1][0], pb[0][1] + pb[1][1]];

            for k in 0..p {
                let xs = [x[(rows[0], k)], x[(rows[1], k)]];
                let ys = [y[(cols[0], k)], y[(cols[1], k)]];
                for a in 0..2 {
                    if row_w[a] == 0.0 || is_fixed(fixed_x, rows[a], k) {
                        continue;
                    }
                    let target = (row_b[a] * xs[a] - pb[a][0] * ys[0] - pb[a][1] * ys[1]
                        + pw[a][0] * ys[0]
                        + pw[a][1] * ys[1])
                        / row_w[a];
                    x[(rows[a], k)] = cmu * xs[a] + mu * target;
                }
                for c in 0..2 {
                    if col_w[c] == 0.0 || is_fixed(fixed_y, cols[c], k) {
                        continue;
                    }
                    let target = (col_b[c] * ys[c] - pb[0][c] * xs[0] - pb[1][c] * xs[1]
                        + pw[0][c] * xs[0]
                        + pw[1][c] * xs[1])
                        / col_w[c];
                    y[(cols[c], k)] = cmu * ys[c] + mu * target;
                }
            }
            n_updates += 1;
        }
        mu *= decay;
    }

    Ok(UltrafastSummary {
        n_updates,
        n_skipped,
        final_rate: mu,
    })
}

/// Stochastic unfolding with the rows restricted to `q * b`
///
/// The sampled row point is rebuilt as `x_i = q_i * b`. The column point
/// gets the usual update. The loadings move toward the single sample
/// projection `b + q_i' (target - q_i * b) / ||q_i||^2` with the learning
/// rate `mu / (1000 + step)`, where `target = t + y_j`. Samples with
/// `||q_i||^2 < TINY` only update the column point. The loadings keep their
/// scale between steps; they are not renormalised to `h * p` sum of squares.
///
/// ### Params
///
/// * `delta` - Dissimilarities of size n x m
/// * `weights` - Optional weights of size n x m
/// * `q` - Row basis of size n x h
/// * `b` - Loadings of size h x p, updated in place
/// * `y` - Column configuration of size m x p, updated in place
/// * `fixed_y` - Optional mask of fixed column coordinates
/// * `params` - Step budget, final rate and seed
///
/// ### Returns
///
/// The `UltrafastSummary` of the run.
pub fn ultrafast_row_restricted_mdu(
    delta: MatRef<f64>,
    weights: Option<MatRef<f64>>,
    q: MatRef<f64>,
    b: &mut Mat<f64>,
    y: &mut Mat<f64>,
    fixed_y: Option<&FixedMask>,
    params: &UltrafastParams,
) -> MduResult<UltrafastSummary> {
    let (n, m) = delta.shape();
    let h = q.ncols();
    let p = b.ncols();
    let w = check_inputs(delta, weights, y, fixed_y, p, params)?;
    ensure_dims!(q, n, h, "row basis");
    ensure_dims!(b, h, p, "row loadings");

    let q_ssq: Vec<f64> = (0..n)
        .map(|i| (0..h).map(|a| q[(i, a)] * q[(i, a)]).sum())
        .collect();

    let mut sampler = IndexSampler::new(params.seed, n, m);
    let decay = params.decay();
    let mut mu = MAX_RATE;
    let mut n_updates = 0;
    let mut n_skipped = 0;
    let mut xi = vec![0.0; p];
    let mut resid = vec![0.0; p];

    for step in 1..=params.n_steps {
        let cmu = 1.0 - mu;
        let lr = mu / (LOADINGS_RATE_OFFSET + step as f64);
        for _ in 0..n + m {
            let (i, j) = sampler.next_pair();
            if w[(i, j)] == 0.0 {
                n_skipped += 1;
                continue;
            }
            for (k, xk) in xi.iter_mut().enumerate() {
                *xk = (0..h).map(|a| q[(i, a)] * b[(a, k)]).sum();
            }
            let d = xi
                .iter()
                .enumerate()
                .map(|(k, &xk)| (xk - y[(j, k)]) * (xk - y[(j, k)]))
                .sum::<f64>()
                .sqrt();
            if d < TINY {
                n_skipped += 1;
                continue;
            }
            let ratio = delta[(i, j)] / d;
            for k in 0..p {
                let yk = y[(j, k)];
                let t = ratio * (xi[k] - yk);
                resid[k] = t + yk - xi[k];
                if !is_fixed(fixed_y, j, k) {
                    y[(j, k)] = cmu * yk + mu * (xi[k] - t);
                }
            }
            if q_ssq[i] >= TINY {
                for a in 0..h {
                    let scale = lr * q[(i, a)] / q_ssq[i];
                    for k in 0..p {
                        b[(a, k)] += scale * resid[k];
                    }
                }
            }
            n_updates += 1;
        }
        mu *= decay;
    }

    Ok(UltrafastSummary {
        n_updates,
        n_skipped,
        final_rate: mu,
    })
}

///////////
// Tests //
///////////
