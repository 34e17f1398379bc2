//! Conversion between flat column-major arrays and the dense types of the
//! crate, plus array based entry points for the engines.
//!
//! Configurations are written back into the caller's slices only when a run
//! succeeds.

use faer::{Mat, MatRef};

use crate::core::unfolding::data::FixedMask;
use crate::core::unfolding::external::external_unfolding;
use crate::core::unfolding::majorization::{Mdu, MduFit, SideSpec};
use crate::core::unfolding::params::{MduParams, UltrafastParams};
use crate::core::unfolding::ultrafast::{ultrafast_mdu, UltrafastSummary};
use crate::ensure_len;
use crate::utils::errors::MduResult;

/// Problem dimensions
///
/// ### Fields
///
/// * `n` - Number of row objects
/// * `m` - Number of column objects
/// * `p` - Number of dimensions
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlatDims {
    pub n: usize,
    pub m: usize,
    pub p: usize,
}

/// Convergence outputs of a batch run
///
/// ### Fields
///
/// * `max_iter` - Iterations actually used
/// * `f_crit` - Stress difference of the last iteration
/// * `f_value` - Final stress
#[derive(Clone, Debug, PartialEq)]
pub struct FlatOutcome {
    pub max_iter: usize,
    pub f_crit: f64,
    pub f_value: f64,
}

impl From<&MduFit> for FlatOutcome {
    fn from(fit: &MduFit) -> Self {
        Self {
            max_iter: fit.last_iter,
            f_crit: fit.last_dif,
            f_value: fit.f_value,
        }
    }
}

/////////////////
// Conversions //
/////////////////

/// Generate a matrix from column-major data
///
/// ### Params
///
/// * `data` - Column-major values of length `nrows * ncols`
/// * `nrows` - Number of rows
/// * `ncols` - Number of columns
/// * `what` - Name of the matrix for error messages
pub fn mat_from_col_major(
    data: &[f64],
    nrows: usize,
    ncols: usize,
    what: &str,
) -> MduResult<Mat<f64>> {
    ensure_len!(data, nrows * ncols, what);
    Ok(Mat::from_fn(nrows, ncols, |i, j| data[i + j * nrows]))
}

/// Write a matrix into a column-major slice
pub fn mat_to_col_major(mat: MatRef<f64>, out: &mut [f64], what: &str) -> MduResult<()> {
    let (nrows, ncols) = mat.shape();
    ensure_len!(out, nrows * ncols, what);
    for j in 0..ncols {
        for i in 0..nrows {
            out[i + j * nrows] = mat[(i, j)];
        }
    }
    Ok(())
}

/// Optional 0/1 integer mask into an optional `FixedMask`
fn mask_from_flags(
    flags: Option<&[i32]>,
    nrows: usize,
    ncols: usize,
) -> MduResult<Option<FixedMask>> {
    flags
        .map(|f| FixedMask::from_col_major_ints(nrows, ncols, f))
        .transpose()
}

/// Optional weights into an optional matrix
fn weights_from_flat(weights: Option<&[f64]>, dims: FlatDims) -> MduResult<Option<Mat<f64>>> {
    weights
        .map(|w| mat_from_col_major(w, dims.n, dims.m, "weights"))
        .transpose()
}

//////////////////
// Entry points //
//////////////////

/// Batch unfolding on flat arrays
///
/// ### Params
///
/// * `dims` - Problem dimensions
/// * `delta` - Column-major dissimilarities (n x m)
/// * `weights` - Optional column-major weights (n x m)
/// * `x` - Column-major row configuration (n x p), overwritten
/// * `fixed_x` - Optional column-major 0/1 mask for `x`
/// * `y` - Column-major column configuration (m x p), overwritten
/// * `fixed_y` - Optional column-major 0/1 mask for `y`
/// * `distances` - Optional output for the column-major distances (n x m)
/// * `params` - Iteration parameters
///
/// ### Returns
///
/// The `FlatOutcome` with the iterations used, the last difference and the
/// final stress.
#[allow(clippy::too_many_arguments)]
pub fn flat_mdu(
    dims: FlatDims,
    delta: &[f64],
    weights: Option<&[f64]>,
    x: &mut [f64],
    fixed_x: Option<&[i32]>,
    y: &mut [f64],
    fixed_y: Option<&[i32]>,
    distances: Option<&mut [f64]>,
    params: &MduParams,
) -> MduResult<FlatOutcome> {
    let delta_mat = mat_from_col_major(delta, dims.n, dims.m, "dissimilarities")?;
    let w = weights_from_flat(weights, dims)?;
    let x_mat = mat_from_col_major(x, dims.n, dims.p, "row configuration")?;
    let y_mat = mat_from_col_major(y, dims.m, dims.p, "column configuration")?;
    let fx = mask_from_flags(fixed_x, dims.n, dims.p)?;
    let fy = mask_from_flags(fixed_y, dims.m, dims.p)?;
    if let Some(out) = distances.as_ref() {
        ensure_len!(out, dims.n * dims.m, "distances");
    }

    let fit = Mdu::new(params.clone()).fit(
        delta_mat.as_ref(),
        w.as_ref().map(|w| w.as_ref()),
        SideSpec::anchored(x_mat, fx),
        SideSpec::anchored(y_mat, fy),
    )?;

    mat_to_col_major(fit.x.as_ref(), x, "row configuration")?;
    mat_to_col_major(fit.y.as_ref(), y, "column configuration")?;
    if let Some(out) = distances {
        mat_to_col_major(fit.distances.as_ref(), out, "distances")?;
    }

    Ok(FlatOutcome::from(&fit))
}

/// External unfolding on flat arrays
///
/// ### Params
///
/// * `dims` - Problem dimensions
/// * `delta` - Column-major dissimilarities (n x m)
/// * `weights` - Optional column-major weights (n x m)
/// * `fixed` - Column-major known column configuration (m x p)
/// * `z` - Column-major row configuration (n x p), overwritten
/// * `distances` - Optional output for the column-major distances (n x m)
/// * `params` - Iteration parameters
pub fn flat_external(
    dims: FlatDims,
    delta: &[f64],
    weights: Option<&[f64]>,
    fixed: &[f64],
    z: &mut [f64],
    distances: Option<&mut [f64]>,
    params: &MduParams,
) -> MduResult<FlatOutcome> {
    let delta_mat = mat_from_col_major(delta, dims.n, dims.m, "dissimilarities")?;
    let w = weights_from_flat(weights, dims)?;
    let fixed_mat = mat_from_col_major(fixed, dims.m, dims.p, "fixed configuration")?;
    let z_mat = mat_from_col_major(z, dims.n, dims.p, "row configuration")?;
    if let Some(out) = distances.as_ref() {
        ensure_len!(out, dims.n * dims.m, "distances");
    }

    let fit = external_unfolding(
        delta_mat.as_ref(),
        w.as_ref().map(|w| w.as_ref()),
        fixed_mat.as_ref(),
        z_mat,
        params,
    )?;

    mat_to_col_major(fit.z.as_ref(), z, "row configuration")?;
    if let Some(out) = distances {
        mat_to_col_major(fit.distances.as_ref(), out, "distances")?;
    }

    Ok(FlatOutcome {
        max_iter: fit.last_iter,
        f_crit: fit.last_dif,
        f_value: fit.f_value,
    })
}

/// Stochastic unfolding on flat arrays
///
/// ### Params
///
/// * `dims` - Problem dimensions
/// * `delta` - Column-major dissimilarities (n x m)
/// * `weights` - Optional column-major weights (n x m)
/// * `x` - Column-major row configuration (n x p), overwritten
/// * `fixed_x` - Optional column-major 0/1 mask for `x`
/// * `y` - Column-major column configuration (m x p), overwritten
/// * `fixed_y` - Optional column-major 0/1 mask for `y`
/// * `params` - Step budget, final rate and seed
#[allow(clippy::too_many_arguments)]
pub fn flat_ultrafast(
    dims: FlatDims,
    delta: &[f64],
    weights: Option<&[f64]>,
    x: &mut [f64],
    fixed_x: Option<&[i32]>,
    y: &mut [f64],
    fixed_y: Option<&[i32]>,
    params: &UltrafastParams,
) -> MduResult<UltrafastSummary> {
    let delta_mat = mat_from_col_major(delta, dims.n, dims.m, "dissimilarities")?;
    let w = weights_from_flat(weights, dims)?;
    let mut x_mat = mat_from_col_major(x, dims.n, dims.p, "row configuration")?;
    let mut y_mat = mat_from_col_major(y, dims.m, dims.p, "column configuration")?;
    let fx = mask_from_flags(fixed_x, dims.n, dims.p)?;
    let fy = mask_from_flags(fixed_y, dims.m, dims.p)?;

    let summary = ultrafast_mdu(
        delta_mat.as_ref(),
        w.as_ref().map(|w| w.as_ref()),
        &mut x_mat,
        fx.as_ref(),
        &mut y_mat,
        fy.as_ref(),
        params,
    )?;

    mat_to_col_major(x_mat.as_ref(), x, "row configuration")?;
    mat_to_col_major(y_mat.as_ref(), y, "column configuration")?;

    Ok(summary)
}

///////////
// Tests //
///////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::errors::MduError;
    use approx::assert_relative_eq;

    #[test]
    fn test_col_major_layout() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mat = mat_from_col_major(&data, 2, 3, "test").unwrap();

        assert_eq!(mat[(1, 0)], 2.0);
        assert_eq!(mat[(0, 2)], 5.0);

        let mut out = [0.0; 6];
        mat_to_col_major(mat.as_ref(), &mut out, "test").unwrap();
        assert_eq!(out, data);

        assert!(matches!(
            mat_from_col_major(&data, 4, 2, "test"),
            Err(MduError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_flat_mdu_line() {
        let dims = FlatDims { n: 3, m: 3, p: 1 };
        let delta = [0.0, 2.0, 4.0, 2.0, 0.0, 2.0, 4.0, 2.0, 0.0];
        let mut x = [-1.0, 0.0, 1.0];
        let mut y = [-0.9, 0.1, 0.8];
        let mut d = [0.0; 9];
        let params = MduParams {
            max_iter: 200,
            ..MduParams::default()
        };

        let outcome = flat_mdu(
            dims,
            &delta,
            None,
            &mut x,
            None,
            &mut y,
            None,
            Some(&mut d),
            &params,
        )
        .unwrap();

        assert!(outcome.f_value < 1e-3);
        assert!(outcome.max_iter >= 1 && outcome.max_iter <= 200);
        assert_relative_eq!((x[0] - y[2]).abs(), 4.0, epsilon = 1e-4);
        // distances come back column-major, entry (2, 0) is d[2]
        assert_relative_eq!(d[2], (x[2] - y[0]).abs(), epsilon = 1e-12);
        for (got, want) in d.iter().zip(delta.iter()) {
            assert_relative_eq!(got, want, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_flat_mdu_keeps_input_on_error() {
        let dims = FlatDims { n: 2, m: 2, p: 1 };
        let delta = [0.0, 1.0, 1.0, f64::NAN];
        let mut x = [0.3, 0.4];
        let mut y = [0.5, 0.6];

        let res = flat_mdu(
            dims,
            &delta,
            None,
            &mut x,
            None,
            &mut y,
            None,
            None,
            &MduParams::default(),
        );

        assert!(res.is_err());
        assert_eq!(x, [0.3, 0.4]);
    }

    #[test]
    fn test_flat_mdu_distances_length() {
        let dims = FlatDims { n: 2, m: 2, p: 1 };
        let delta = [0.0, 1.0, 1.0, 0.0];
        let mut x = [0.3, 0.4];
        let mut y = [0.5, 0.6];
        let mut d = [0.0; 3];

        let res = flat_mdu(
            dims,
            &delta,
            None,
            &mut x,
            None,
            &mut y,
            None,
            Some(&mut d),
            &MduParams::default(),
        );

        assert!(matches!(res, Err(MduError::DimensionMismatch { .. })));
        assert_eq!(x, [0.3, 0.4]);
    }

    #[test]
    fn test_flat_mask_honoured() {
        let dims = FlatDims { n: 3, m: 2, p: 2 };
        let delta = [1.0, 2.0, 1.5, 2.0, 1.0, 1.2];
        let mut x = [0.1, 0.5, -0.3, 0.2, -0.4, 0.7];
        let mut y = [0.9, -0.8, 0.3, 0.1];
        let fixed_x = [1, 0, 0, 1, 0, 0];

        flat_mdu(
            dims,
            &delta,
            None,
            &mut x,
            Some(&fixed_x),
            &mut y,
            None,
            None,
            &MduParams::default(),
        )
        .unwrap();

        assert_eq!(x[0], 0.1);
        assert_eq!(x[3], 0.2);
    }

    #[test]
    fn test_flat_external_distances() {
        let dims = FlatDims { n: 1, m: 2, p: 1 };
        let delta = [1.0, 1.0];
        let fixed = [0.0, 2.0];
        let mut z = [0.0];
        let mut d = [0.0; 2];

        let outcome = flat_external(
            dims,
            &delta,
            None,
            &fixed,
            &mut z,
            Some(&mut d),
            &MduParams::default(),
        )
        .unwrap();

        assert_relative_eq!(z[0], 1.0, epsilon = 1e-8);
        assert_relative_eq!(d[0], 1.0, epsilon = 1e-8);
        assert!(outcome.f_value < 1e-10);
    }

    #[test]
    fn test_flat_ultrafast_deterministic() {
        let dims = FlatDims { n: 3, m: 2, p: 1 };
        let delta = [1.0, 2.0, 1.5, 2.0, 1.0, 1.2];
        let params = UltrafastParams {
            n_steps: 20,
            min_rate: 0.05,
            seed: 9,
        };

        let mut runs = Vec::new();
        for _ in 0..2 {
            let mut x = [0.1, 0.5, -0.3];
            let mut y = [0.9, -0.8];
            flat_ultrafast(dims, &delta, None, &mut x, None, &mut y, None, &params).unwrap();
            runs.push((x, y));
        }

        assert_eq!(runs[0], runs[1]);
    }
}
