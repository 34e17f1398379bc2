use faer::{Mat, MatRef};
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Uniform};

use crate::utils::errors::{MduError, MduResult};
use crate::{ensure_dims, ensure_len, ensure_param};

///////////////
// Constants //
///////////////

/// Machine precision
pub const EPS: f64 = f64::EPSILON;

/// Square root of the machine precision (1.4901161193847656e-08)
pub const TOL: f64 = 1.490_116_119_384_765_6e-8;

/// Tolerance for an increase of stress before a run counts as diverging
/// (square root of `TOL`, 1.2207031250e-4)
pub const CRIT: f64 = 1.220_703_125e-4;

/// Distances below this value are treated as zero (1.8189894035458617e-12)
pub const TINY: f64 = 1.818_989_403_545_861_7e-12;

/// Starting mixing rate of the stochastic engine
pub const MAX_RATE: f64 = 0.5;

////////////////
// Fixed mask //
////////////////

/// Boolean mask of fixed coordinates for an n x p configuration
///
/// A `true` entry means the coordinate is never written by any engine.
/// Storage is column-major.
///
/// ### Fields
///
/// * `nrows` - Number of objects
/// * `ncols` - Number of dimensions
/// * `data` - Column-major flags
#[derive(Clone, Debug, PartialEq)]
pub struct FixedMask {
    nrows: usize,
    ncols: usize,
    data: Vec<bool>,
}

impl FixedMask {
    /// Mask with nothing fixed
    pub fn none(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            data: vec![false; nrows * ncols],
        }
    }

    /// Generate a mask from column-major flags
    ///
    /// ### Params
    ///
    /// * `nrows` - Number of objects
    /// * `ncols` - Number of dimensions
    /// * `flags` - Column-major flags of length `nrows * ncols`
    pub fn from_col_major(nrows: usize, ncols: usize, flags: &[bool]) -> MduResult<Self> {
        ensure_len!(flags, nrows * ncols, "fixed mask");

        Ok(Self {
            nrows,
            ncols,
            data: flags.to_vec(),
        })
    }

    /// Generate a mask from column-major 0/1 integers (non-zero means fixed)
    pub fn from_col_major_ints(nrows: usize, ncols: usize, flags: &[i32]) -> MduResult<Self> {
        ensure_len!(flags, nrows * ncols, "fixed mask");

        Ok(Self {
            nrows,
            ncols,
            data: flags.iter().map(|&f| f != 0).collect(),
        })
    }

    /// Mask that fixes complete rows (anchored objects)
    pub fn fixed_rows(nrows: usize, ncols: usize, rows: &[usize]) -> MduResult<Self> {
        let mut mask = Self::none(nrows, ncols);
        for &i in rows {
            ensure_param!(i < nrows, "anchored row {} out of bounds ({})", i, nrows);
            for k in 0..ncols {
                mask.set(i, k, true);
            }
        }
        Ok(mask)
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Is coordinate `(i, k)` fixed. Panics when out of bounds.
    #[inline]
    pub fn get(&self, i: usize, k: usize) -> bool {
        assert!(i < self.nrows && k < self.ncols, "mask index out of bounds");
        self.data[i + k * self.nrows]
    }

    /// Set coordinate `(i, k)`. Panics when out of bounds.
    pub fn set(&mut self, i: usize, k: usize, fixed: bool) {
        assert!(i < self.nrows && k < self.ncols, "mask index out of bounds");
        self.data[i + k * self.nrows] = fixed;
    }

    /// Any coordinate fixed
    pub fn any(&self) -> bool {
        self.data.iter().any(|&f| f)
    }

    /// Number of fixed coordinates
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&f| f).count()
    }
}

/// Is coordinate `(i, k)` of an optional mask fixed
#[inline]
pub fn is_fixed(mask: Option<&FixedMask>, i: usize, k: usize) -> bool {
    mask.is_some_and(|m| m.get(i, k))
}

/////////////
// Weights //
/////////////

/// Resolve optional weights into an owned n x m matrix
///
/// Absent weights mean all weights are one. Negative or non-finite weights
/// are rejected.
///
/// ### Params
///
/// * `weights` - Optional weight matrix
/// * `n` - Number of rows
/// * `m` - Number of columns
///
/// ### Returns
///
/// The weight matrix.
pub fn resolve_weights(weights: Option<MatRef<f64>>, n: usize, m: usize) -> MduResult<Mat<f64>> {
    match weights {
        None => Ok(Mat::from_fn(n, m, |_, _| 1.0)),
        Some(w) => {
            ensure_dims!(w, n, m, "weights");
            for j in 0..m {
                for i in 0..n {
                    let v = w[(i, j)];
                    ensure_param!(
                        v.is_finite() && v >= 0.0,
                        "weight ({}, {}) must be finite and non-negative, found {}",
                        i,
                        j,
                        v
                    );
                }
            }
            Ok(w.to_owned())
        }
    }
}

/// Check the dissimilarities: finite and non-negative
pub fn validate_delta(delta: MatRef<f64>) -> MduResult<()> {
    for j in 0..delta.ncols() {
        for i in 0..delta.nrows() {
            let v = delta[(i, j)];
            ensure_param!(
                v.is_finite() && v >= 0.0,
                "dissimilarity ({}, {}) must be finite and non-negative, found {}",
                i,
                j,
                v
            );
        }
    }
    Ok(())
}

/// Generate a random start configuration
///
/// Coordinates are drawn uniformly from `[-1, 1)`.
///
/// ### Params
///
/// * `n` - Number of objects
/// * `p` - Number of dimensions
/// * `seed` - Random seed for reproducibility purposes
///
/// ### Returns
///
/// The n x p configuration.
pub fn random_configuration(n: usize, p: usize, seed: u64) -> MduResult<Mat<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let uniform =
        Uniform::new(-1.0, 1.0).map_err(|e| MduError::InvalidParameter(e.to_string()))?;
    let data: Vec<f64> = (0..n * p).map(|_| uniform.sample(&mut rng)).collect();

    Ok(Mat::from_fn(n, p, |i, j| data[i + j * n]))
}

///////////
// Tests //
///////////
