//! Dense kernels used by the unfolding engines and the NNLS family: checked
//! symmetric positive definite inversion and solves, column covariance and the
//! principal axes rotation.

use faer::{
    linalg::solvers::{Llt, Solve},
    Mat, MatRef, Side,
};

use crate::utils::errors::{MduError, MduResult};
use crate::utils::general::{col_means, mat_all_finite};
use crate::{ensure_dims, ensure_param};

/// Condition threshold above which a factorised system counts as singular
/// (`1 / sqrt(EPS)`).
const MAX_CONDITION: f64 = 67_108_864.0;

//////////////////////
// Inverse and solve //
//////////////////////

/// Solve a symmetric positive definite system
///
/// Uses a Cholesky factorisation. A failed factorisation, a non-finite
/// inverse or a condition estimate of the diagonally scaled matrix above
/// `1 / sqrt(EPS)` are all reported as a singular system.
///
/// ### Params
///
/// * `a` - Symmetric positive definite matrix of size h x h
/// * `rhs` - Right hand side of size h x k
/// * `context` - Description of the system, used in the error message
///
/// ### Returns
///
/// The solution of `a * x = rhs`.
pub fn spd_solve(a: MatRef<f64>, rhs: MatRef<f64>, context: &str) -> MduResult<Mat<f64>> {
    let h = a.nrows();
    ensure_dims!(a, h, h, context);
    ensure_dims!(rhs, h, rhs.ncols(), context);

    let inverse = spd_inverse(a, context)?;

    Ok(&inverse * rhs)
}

/// Invert a symmetric positive definite matrix
///
/// ### Params
///
/// * `a` - Symmetric positive definite matrix of size h x h
/// * `context` - Description of the matrix, used in the error message
///
/// ### Returns
///
/// The inverse, or `MduError::SingularSystem` if the matrix is (numerically)
/// singular.
pub fn spd_inverse(a: MatRef<f64>, context: &str) -> MduResult<Mat<f64>> {
    let h = a.nrows();
    ensure_dims!(a, h, h, context);

    if h == 0 {
        return Ok(Mat::zeros(0, 0));
    }

    let llt = Llt::new(a, Side::Lower)
        .map_err(|e| MduError::SingularSystem(format!("{context} ({e:?})")))?;

    let identity: Mat<f64> = Mat::identity(h, h);
    let inverse = llt.solve(identity.as_ref());

    if !mat_all_finite(inverse.as_ref()) {
        return Err(MduError::SingularSystem(format!(
            "{context} (non-finite inverse)"
        )));
    }

    // condition estimate of the diagonally scaled matrix
    let mut condition = 0.0_f64;
    for j in 0..h {
        for i in 0..h {
            condition = condition.max(inverse[(i, j)].abs() * (a[(i, i)] * a[(j, j)]).sqrt());
        }
    }
    if condition > MAX_CONDITION {
        return Err(MduError::SingularSystem(format!(
            "{context} (condition estimate {condition:.3e})"
        )));
    }

    Ok(inverse)
}

/////////////////////////
// Covariance rotation //
/////////////////////////

/// Calculate the column covariance
///
/// ### Params
///
/// * `mat` - Matrix with observations as rows and features as columns.
///
/// ### Returns
///
/// The p x p covariance matrix (divided by `n - 1`, or by 1 for a single row).
pub fn column_covariance(mat: MatRef<f64>) -> Mat<f64> {
    let (n, p) = mat.shape();
    let means = col_means(mat);
    let centered = Mat::from_fn(n, p, |i, j| mat[(i, j)] - means[j]);
    let denom = n.saturating_sub(1).max(1) as f64;

    let cross = centered.transpose() * &centered;

    Mat::from_fn(p, p, |i, j| cross[(i, j)] / denom)
}

/// Rotation to principal axes
///
/// Eigendecomposition of the column covariance of `z`, with the eigenvectors
/// ordered by non-increasing eigenvalue.
///
/// ### Params
///
/// * `z` - Reference configuration of size n x p
///
/// ### Returns
///
/// Tuple of the p x p rotation matrix (eigenvectors as columns) and the
/// sorted eigenvalues.
pub fn principal_axes(z: MatRef<f64>) -> MduResult<(Mat<f64>, Vec<f64>)> {
    let p = z.ncols();
    ensure_param!(p > 0, "principal axes need at least one dimension");

    let covariance = column_covariance(z);

    let eigen = covariance
        .as_ref()
        .self_adjoint_eigen(Side::Lower)
        .map_err(|e| MduError::EigenFailure(format!("{e:?}")))?;

    let values: Vec<f64> = eigen.S().column_vector().iter().copied().collect();
    let vectors = eigen.U();

    let mut order: Vec<usize> = (0..p).collect();
    order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));

    let rotation = Mat::from_fn(p, p, |i, j| vectors[(i, order[j])]);
    let sorted = order.iter().map(|&k| values[k]).collect();

    Ok((rotation, sorted))
}

/// Rotate a set of configurations jointly
///
/// The rotation is derived from the first matrix and applied to every matrix
/// in `mats` (including the first), so products such as `Q * B` stay
/// consistent when `B` is part of the set.
///
/// ### Params
///
/// * `mats` - Matrices sharing the same number of columns p
///
/// ### Returns
///
/// The eigenvalues of the reference configuration in non-increasing order.
pub fn rotate_jointly(mats: &mut [&mut Mat<f64>]) -> MduResult<Vec<f64>> {
    if mats.is_empty() {
        return Ok(Vec::new());
    }

    let p = mats[0].ncols();
    for mat in mats.iter() {
        ensure_dims!(mat, mat.nrows(), p, "rotated configuration");
    }

    let (rotation, values) = principal_axes(mats[0].as_ref())?;

    for mat in mats.iter_mut() {
        let rotated = &**mat * &rotation;
        **mat = rotated;
    }

    Ok(values)
}

///////////
// Tests //
///////////

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use faer::mat;

    #[test]
    fn test_spd_inverse() {
        let a = mat![[4.0, 1.0], [1.0, 3.0]];
        let inv = spd_inverse(a.as_ref(), "test").unwrap();
        let prod = &a * &inv;

        for i in 0..2 {
            for j in 0..2 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(prod[(i, j)], expected, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_spd_inverse_singular() {
        let a = mat![[1.0, 1.0], [1.0, 1.0]];
        let res = spd_inverse(a.as_ref(), "rank one");

        assert!(matches!(res, Err(MduError::SingularSystem(_))));
    }

    #[test]
    fn test_spd_solve() {
        let a = mat![[2.0, 0.0], [0.0, 4.0]];
        let rhs = mat![[2.0], [8.0]];
        let x = spd_solve(a.as_ref(), rhs.as_ref(), "diag").unwrap();

        assert_relative_eq!(x[(0, 0)], 1.0, epsilon = 1e-12);
        assert_relative_eq!(x[(1, 0)], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_dimension_check() {
        let a = mat![[2.0, 0.0, 1.0], [0.0, 4.0, 1.0]];
        let res = spd_inverse(a.as_ref(), "rectangular");

        assert!(matches!(res, Err(MduError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_rotation_diagonalises_covariance() {
        let mut z = mat![
            [1.0, 0.9],
            [2.0, 2.1],
            [3.0, 2.8],
            [4.0, 4.2],
            [-1.0, -0.7]
        ];
        let mut other = mat![[1.0, 0.0], [0.0, 1.0]];

        let values = rotate_jointly(&mut [&mut z, &mut other]).unwrap();
        let cov = column_covariance(z.as_ref());

        assert!(values[0] >= values[1]);
        assert_relative_eq!(cov[(0, 1)], 0.0, epsilon = 1e-10);
        assert_relative_eq!(cov[(0, 0)], values[0], epsilon = 1e-10);
        assert_relative_eq!(cov[(1, 1)], values[1], epsilon = 1e-10);

        // the second matrix received the (orthogonal) rotation itself
        let gram = other.transpose() * &other;
        assert_relative_eq!(gram[(0, 0)], 1.0, epsilon = 1e-10);
        assert_relative_eq!(gram[(0, 1)], 0.0, epsilon = 1e-10);
    }
}
