//! External unfolding: the column configuration is known and only the rows
//! are fitted, one row at a time against the fixed point set.

use faer::{Mat, MatRef};

use crate::core::unfolding::data::{resolve_weights, validate_delta, CRIT, EPS, TINY, TOL};
use crate::core::unfolding::params::{echo_progress, MduParams};
use crate::core::unfolding::stress::row_distance;
use crate::ensure_dims;
use crate::utils::errors::MduResult;
use crate::utils::general::dot;

/// Structure to store the result of an external unfolding
///
/// ### Fields
///
/// * `z` - Fitted row configuration of size n x p
/// * `distances` - Distances between `z` and the fixed points
/// * `f_value` - Sum of the final per-row stress values
/// * `last_iter` - Sum of the per-row iteration counts
/// * `last_dif` - Stress difference of the last iteration of the last row
#[derive(Clone, Debug)]
pub struct ExternalFit {
    pub z: Mat<f64>,
    pub distances: Mat<f64>,
    pub f_value: f64,
    pub last_iter: usize,
    pub last_dif: f64,
}

/// Probabilities inversely related to the dissimilarities
///
/// `r_j = (sum(delta) + m * TOL) / (delta_j + TOL)`, normalised to sum one.
fn inverse_probabilities(delta: &[f64]) -> Vec<f64> {
    let total = delta.iter().sum::<f64>() + delta.len() as f64 * TOL;
    let raw: Vec<f64> = delta.iter().map(|&v| total / (v + TOL)).collect();
    let mut norm = raw.iter().sum::<f64>();
    if norm == 0.0 {
        norm = TOL;
    }
    raw.into_iter().map(|r| r / norm).collect()
}

/// Weighted residual sum of squares of one row
fn row_stress(delta: &[f64], d: &[f64], w: &[f64]) -> f64 {
    delta
        .iter()
        .zip(d)
        .zip(w)
        .map(|((&dl, &di), &wi)| wi * (dl - di) * (dl - di))
        .sum()
}

/// Weighted sum of squares
fn weighted_ssq(v: &[f64], w: &[f64]) -> f64 {
    v.iter().zip(w).map(|(&vi, &wi)| wi * vi * vi).sum()
}

/// Distances from row `i` of `z` to all fixed points
fn fill_distances(z: MatRef<f64>, i: usize, fixed: MatRef<f64>, d: &mut [f64]) {
    for (j, dj) in d.iter_mut().enumerate() {
        *dj = row_distance(z, i, fixed, j);
    }
}

/// Fit the rows against a fixed column configuration
///
/// Each row is an independent single point problem. A row with zero sum of
/// squares is first placed at a probability weighted average of the fixed
/// points. Per iteration the working dissimilarities are rescaled by their
/// least squares optimal factor before the single point Guttman update.
///
/// ### Params
///
/// * `delta` - Dissimilarities of size n x m
/// * `weights` - Optional weights of size n x m
/// * `fixed` - Known column configuration of size m x p
/// * `z` - Start row configuration of size n x p
/// * `params` - Iteration parameters, applied per row
///
/// ### Returns
///
/// The `ExternalFit` with the fitted rows.
pub fn external_unfolding(
    delta: MatRef<f64>,
    weights: Option<MatRef<f64>>,
    fixed: MatRef<f64>,
    mut z: Mat<f64>,
    params: &MduParams,
) -> MduResult<ExternalFit> {
    params.validate()?;
    validate_delta(delta)?;

    let (n, m) = delta.shape();
    let p = fixed.ncols();
    ensure_dims!(fixed, m, p, "fixed configuration");
    ensure_dims!(z, n, p, "row configuration");
    let w = resolve_weights(weights, n, m)?;

    let mut distances = Mat::zeros(n, m);
    let mut f_value = 0.0;
    let mut total_iter = 0;
    let mut last_dif = 0.0;

    let mut work = vec![0.0; m];
    let mut w_row = vec![0.0; m];
    let mut d = vec![0.0; m];

    for i in 0..n {
        for j in 0..m {
            work[j] = delta[(i, j)];
            w_row[j] = w[(i, j)];
        }
        let sum_w: f64 = w_row.iter().sum();

        let z_ssq: f64 = (0..p).map(|k| z[(i, k)] * z[(i, k)]).sum();
        if z_ssq == 0.0 {
            let probs = inverse_probabilities(&work);
            for k in 0..p {
                z[(i, k)] = (0..m).map(|j| probs[j] * fixed[(j, k)]).sum();
            }
        }

        fill_distances(z.as_ref(), i, fixed, &mut d);

        if sum_w < TINY {
            log::debug!("row {} has no positive weights, skipped", i);
            for j in 0..m {
                distances[(i, j)] = d[j];
            }
            continue;
        }

        let mut scale = weighted_ssq(&work, &w_row);
        if scale == 0.0 {
            scale = 1.0;
        }

        let mut f_old = row_stress(&work, &d, &w_row) / scale;
        let mut f_new = f_old;
        let mut b = vec![0.0; m];

        if params.echo {
            echo_progress(0, f_old, f_old, f_old);
        }

        for iter in 1..=params.max_iter {
            // least squares optimal scaling of the working dissimilarities
            let lower = weighted_ssq(&work, &w_row);
            let upper = dot(&work, &d);
            let alpha = if lower < EPS { 1.0 } else { upper / lower };
            work.iter_mut().for_each(|v| *v *= alpha);

            for j in 0..m {
                b[j] = if d[j] < TINY {
                    0.0
                } else {
                    w_row[j] * work[j] / d[j]
                };
            }
            let sum_b: f64 = b.iter().sum();

            for k in 0..p {
                let mut numer = sum_b * z[(i, k)];
                for j in 0..m {
                    numer += (w_row[j] - b[j]) * fixed[(j, k)];
                }
                z[(i, k)] = numer / sum_w;
            }

            fill_distances(z.as_ref(), i, fixed, &mut d);
            f_new = row_stress(&work, &d, &w_row) / scale;

            if params.echo {
                echo_progress(iter, f_old, f_old, f_new);
            }

            total_iter += 1;
            last_dif = f_old - f_new;
            if last_dif <= -CRIT {
                log::debug!("row {} diverged at iteration {}", i, iter);
                break;
            }
            let sum = f_old + f_new;
            if sum <= 0.0 || 2.0 * last_dif / sum <= params.f_crit {
                break;
            }
            f_old = f_new;
        }

        for j in 0..m {
            distances[(i, j)] = d[j];
        }
        f_value += f_new;
    }

    Ok(ExternalFit {
        z,
        distances,
        f_value,
        last_iter: total_iter,
        last_dif,
    })
}

///////////
// Tests //
///////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::unfolding::stress::euclidean_between;
    use approx::assert_relative_eq;
    use faer::mat;

    #[test]
    fn test_inverse_probabilities() {
        let probs = inverse_probabilities(&[1.0, 3.0]);

        assert_relative_eq!(probs.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        // closer points get the larger probability
        assert!(probs[0] > probs[1]);
        assert_relative_eq!(probs[0] / probs[1], 3.0, epsilon = 1e-6);
    }

    #[test]
    fn test_recovers_planted_point() {
        let fixed = mat![[0.0, 0.0], [4.0, 0.0], [0.0, 3.0], [4.0, 3.0]];
        let truth = mat![[1.0, 1.0], [3.0, 2.0]];
        let delta = euclidean_between(truth.as_ref(), fixed.as_ref());
        let z = mat![[0.5, 0.5], [3.5, 2.5]];
        let params = MduParams {
            max_iter: 2000,
            f_crit: 1e-12,
            echo: false,
        };

        let fit = external_unfolding(delta.as_ref(), None, fixed.as_ref(), z, &params).unwrap();

        assert!(fit.f_value < 1e-6);
        for i in 0..2 {
            for k in 0..2 {
                assert_relative_eq!(fit.z[(i, k)], truth[(i, k)], epsilon = 1e-3);
            }
        }
        assert!(fit.last_iter >= 2);
    }

    #[test]
    fn test_zero_row_initialised() {
        let fixed = mat![[0.0, 0.0], [2.0, 0.0]];
        let delta = mat![[1.0, 1.0]];
        let z = Mat::zeros(1, 2);
        let params = MduParams {
            max_iter: 0,
            ..MduParams::default()
        };

        let fit = external_unfolding(delta.as_ref(), None, fixed.as_ref(), z, &params).unwrap();

        // equal dissimilarities give the midpoint
        assert_relative_eq!(fit.z[(0, 0)], 1.0, epsilon = 1e-12);
        assert_relative_eq!(fit.z[(0, 1)], 0.0, epsilon = 1e-12);
        assert_eq!(fit.last_iter, 0);
        assert_relative_eq!(fit.distances[(0, 1)], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_weight_row_skipped() {
        let fixed = mat![[0.0], [2.0]];
        let delta = mat![[1.0, 1.0], [0.5, 1.5]];
        let w = mat![[0.0, 0.0], [1.0, 1.0]];
        let z = mat![[5.0], [0.1]];

        let fit = external_unfolding(
            delta.as_ref(),
            Some(w.as_ref()),
            fixed.as_ref(),
            z,
            &MduParams::default(),
        )
        .unwrap();

        assert_eq!(fit.z[(0, 0)], 5.0);
        assert_relative_eq!(fit.distances[(0, 0)], 5.0);
        assert_relative_eq!(fit.distances[(0, 1)], 3.0);
    }
}
