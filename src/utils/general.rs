use faer::MatRef;

//////////////////
// VECTOR STUFF //
//////////////////

/// Dot product of two slices of equal length
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

//////////////////
// MATRIX STUFF //
//////////////////

/// Calculates the row sums of a matrix
///
/// ### Params
///
/// * `mat` - The matrix for which to calculate the row-wise sums
///
/// ### Returns
///
/// Vector of the row sums.
pub fn row_sums(mat: MatRef<f64>) -> Vec<f64> {
    (0..mat.nrows())
        .map(|i| (0..mat.ncols()).map(|j| mat[(i, j)]).sum())
        .collect()
}

/// Calculates the column sums of a matrix
///
/// ### Params
///
/// * `mat` - The matrix for which to calculate the column-wise sums
///
/// ### Returns
///
/// Vector of the column sums.
pub fn col_sums(mat: MatRef<f64>) -> Vec<f64> {
    (0..mat.ncols())
        .map(|j| mat.col(j).iter().sum())
        .collect()
}

/// Calculates the columns means of a matrix
///
/// ### Params
///
/// * `mat` - The matrix for which to calculate the column-wise means
///
/// ### Returns
///
/// Vector of the column means. Empty matrices give zero means.
pub fn col_means(mat: MatRef<f64>) -> Vec<f64> {
    let n_rows = mat.nrows().max(1) as f64;
    col_sums(mat).into_iter().map(|s| s / n_rows).collect()
}

/// Largest absolute entry of a matrix; `0.0` for an empty matrix
pub fn mat_max_abs(mat: MatRef<f64>) -> f64 {
    let mut max_abs = 0.0_f64;
    for j in 0..mat.ncols() {
        for i in 0..mat.nrows() {
            max_abs = max_abs.max(mat[(i, j)].abs());
        }
    }
    max_abs
}

/// Checks that all matrix entries are finite
pub fn mat_all_finite(mat: MatRef<f64>) -> bool {
    (0..mat.ncols()).all(|j| (0..mat.nrows()).all(|i| mat[(i, j)].is_finite()))
}

///////////
// Tests //
///////////
