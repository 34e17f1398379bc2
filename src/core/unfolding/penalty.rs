//! Ridge, lasso and group lasso penalties on restricted loadings.
//!
//! The lasso and group lasso terms are majorised by quadratics around the
//! current loadings, so every update is a weighted ridge problem solved per
//! dimension.

use faer::{Mat, MatRef};

use crate::core::base::linear_algebra::spd_solve;
use crate::core::unfolding::data::TINY;
use crate::utils::errors::MduResult;
use crate::{ensure_dims, ensure_param};

/// Structure to store the penalty weights
///
/// ### Fields
///
/// * `ridge` - Weight of the squared Frobenius norm of the loadings.
/// * `lasso` - Weight of the sum of absolute loadings.
/// * `group` - Weight of the sum of row norms of the loadings.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Penalty {
    pub ridge: f64,
    pub lasso: f64,
    pub group: f64,
}

impl Penalty {
    /// Check that all weights are finite and non-negative
    pub fn validate(&self) -> MduResult<()> {
        for (name, value) in [
            ("ridge", self.ridge),
            ("lasso", self.lasso),
            ("group", self.group),
        ] {
            ensure_param!(
                value.is_finite() && value >= 0.0,
                "{} penalty must be finite and non-negative, found {}",
                name,
                value
            );
        }
        Ok(())
    }

    /// Penalty value for a loadings matrix
    ///
    /// ### Params
    ///
    /// * `b` - Loadings of size h x p
    ///
    /// ### Returns
    ///
    /// `ridge * ||B||_F^2 + lasso * sum |b_ik| + group * sum_i ||b_i.||`
    pub fn value(&self, b: MatRef<f64>) -> f64 {
        let mut ridge = 0.0;
        let mut lasso = 0.0;
        let mut group = 0.0;
        for i in 0..b.nrows() {
            let mut row_ssq = 0.0;
            for k in 0..b.ncols() {
                let v = b[(i, k)];
                row_ssq += v * v;
                lasso += v.abs();
            }
            ridge += row_ssq;
            group += row_ssq.sqrt();
        }
        self.ridge * ridge + self.lasso * lasso + self.group * group
    }

    /// Update the loadings for one majorization step
    ///
    /// For every dimension k solves
    /// `(base + diag(0.5 * lasso / |b_ik| + 0.5 * group / ||b_i.||)) b_.k = rhs_.k`
    /// where both denominators are floored at `TINY`.
    ///
    /// ### Params
    ///
    /// * `base` - `Q' diag(w) Q + ridge * I` of size h x h
    /// * `rhs` - Right hand side of size h x p
    /// * `b` - Current loadings of size h x p, the expansion point
    ///
    /// ### Returns
    ///
    /// The new loadings, or `SingularSystem` if any per-dimension system
    /// cannot be solved.
    pub fn update_loadings(
        &self,
        base: MatRef<f64>,
        rhs: MatRef<f64>,
        b: MatRef<f64>,
    ) -> MduResult<Mat<f64>> {
        let (h, p) = b.shape();
        ensure_dims!(base, h, h, "penalised information matrix");
        ensure_dims!(rhs, h, p, "penalised right hand side");

        let group_terms: Vec<f64> = (0..h)
            .map(|i| {
                let norm = (0..p).map(|k| b[(i, k)] * b[(i, k)]).sum::<f64>().sqrt();
                0.5 * self.group / norm.max(TINY)
            })
            .collect();

        let mut updated = Mat::zeros(h, p);
        for k in 0..p {
            let mut system = base.to_owned();
            for i in 0..h {
                system[(i, i)] += 0.5 * self.lasso / b[(i, k)].abs().max(TINY) + group_terms[i];
            }
            let column = spd_solve(
                system.as_ref(),
                rhs.subcols(k, 1),
                &format!("penalised loadings, dimension {}", k + 1),
            )?;
            for i in 0..h {
                updated[(i, k)] = column[(i, 0)];
            }
        }

        Ok(updated)
    }
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
    fn test_penalty_value() {
        let b = mat![[3.0, 4.0], [0.0, -1.0]];
        let penalty = Penalty {
            ridge: 1.0,
            lasso: 2.0,
            group: 3.0,
        };

        // ridge 26, lasso 8, group 5 + 1
        assert_relative_eq!(penalty.value(b.as_ref()), 26.0 + 16.0 + 18.0);
    }

    #[test]
    fn test_validate() {
        let penalty = Penalty {
            lasso: -0.1,
            ..Penalty::default()
        };
        assert!(penalty.validate().is_err());
        assert!(Penalty::default().validate().is_ok());
    }

    #[test]
    fn test_pure_ridge_update() {
        // without lasso and group terms the update is a plain solve
        let base = mat![[2.0, 0.0], [0.0, 4.0]];
        let rhs = mat![[2.0, 4.0], [4.0, 8.0]];
        let b = mat![[1.0, 1.0], [1.0, 1.0]];

        let updated = Penalty::default()
            .update_loadings(base.as_ref(), rhs.as_ref(), b.as_ref())
            .unwrap();

        assert_relative_eq!(updated[(0, 0)], 1.0, epsilon = 1e-12);
        assert_relative_eq!(updated[(1, 1)], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_lasso_shrinks() {
        let base = mat![[1.0]];
        let rhs = mat![[1.0]];
        let b = mat![[1.0]];
        let penalty = Penalty {
            lasso: 1.0,
            ..Penalty::default()
        };

        let updated = penalty
            .update_loadings(base.as_ref(), rhs.as_ref(), b.as_ref())
            .unwrap();

        // (1 + 0.5) b = 1
        assert_relative_eq!(updated[(0, 0)], 1.0 / 1.5, epsilon = 1e-12);
    }
}
