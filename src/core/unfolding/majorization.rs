//! Batch majorization engine for two-mode unfolding.
//!
//! One engine covers the unrestricted, weighted, anchored, restricted and
//! penalised restricted variants. Each side (rows and columns) is either a
//! free configuration, optionally with fixed coordinates, or a restricted
//! configuration `Q * B` with `B` the loadings.

use faer::{Mat, MatRef};

use crate::core::base::linear_algebra::{rotate_jointly, spd_inverse};
use crate::core::unfolding::data::{
    is_fixed, resolve_weights, validate_delta, FixedMask, CRIT, TINY,
};
use crate::core::unfolding::params::{echo_progress, MduParams};
use crate::core::unfolding::penalty::Penalty;
use crate::core::unfolding::stress::{
    euclidean_between, guttman_weights, raw_stress, stress_scale, update_distances,
};
use crate::utils::errors::MduResult;
use crate::utils::general::{col_sums, mat_max_abs, row_sums};
use crate::{ensure_dims, ensure_param};

////////////////////////
// Params and results //
////////////////////////

/// Specification of one side of the unfolding problem
///
/// ### Variants
///
/// * `Free` - Starting configuration of size k x p with an optional mask of
///   fixed coordinates.
/// * `Restricted` - Basis `q` of size k x h and starting loadings of size
///   h x p. The configuration is `q * loadings`.
#[derive(Clone, Debug)]
pub enum SideSpec<'a> {
    Free {
        conf: Mat<f64>,
        fixed: Option<FixedMask>,
    },
    Restricted {
        q: MatRef<'a, f64>,
        loadings: Mat<f64>,
    },
}

impl<'a> SideSpec<'a> {
    /// Free side without fixed coordinates
    pub fn free(conf: Mat<f64>) -> Self {
        SideSpec::Free { conf, fixed: None }
    }

    /// Free side with an optional mask of fixed coordinates
    pub fn anchored(conf: Mat<f64>, fixed: Option<FixedMask>) -> Self {
        SideSpec::Free { conf, fixed }
    }

    /// Restricted side `q * loadings`
    pub fn restricted(q: MatRef<'a, f64>, loadings: Mat<f64>) -> Self {
        SideSpec::Restricted { q, loadings }
    }
}

/// Structure to store the result of a majorization run
///
/// ### Fields
///
/// * `x` - Row configuration of size n x p
/// * `y` - Column configuration of size m x p
/// * `row_loadings` - Row loadings if the rows were restricted
/// * `col_loadings` - Column loadings if the columns were restricted
/// * `distances` - Distances of the returned configuration
/// * `f_value` - Stress of the returned configuration
/// * `last_iter` - Number of iterations executed
/// * `last_dif` - Stress difference of the last iteration
/// * `history` - Stress trace, starting with the initial stress
#[derive(Clone, Debug)]
pub struct MduFit {
    pub x: Mat<f64>,
    pub y: Mat<f64>,
    pub row_loadings: Option<Mat<f64>>,
    pub col_loadings: Option<Mat<f64>>,
    pub distances: Mat<f64>,
    pub f_value: f64,
    pub last_iter: usize,
    pub last_dif: f64,
    pub history: Vec<f64>,
}

/////////////////
// Side policy //
/////////////////

/// Working state of one side during a run
///
/// For a restricted side `system` holds the inverse information matrix, or
/// `Q' diag(w) Q + ridge * I` when a penalty is active.
enum SideState<'a> {
    Free {
        conf: Mat<f64>,
        fixed: Option<FixedMask>,
    },
    Restricted {
        q: MatRef<'a, f64>,
        loadings: Mat<f64>,
        conf: Mat<f64>,
        system: Mat<f64>,
    },
}

impl<'a> SideState<'a> {
    /// Check a side specification and precompute its system
    ///
    /// ### Params
    ///
    /// * `spec` - The side specification
    /// * `n_obj` - Number of objects on this side
    /// * `weight_sums` - Weight sums per object of this side
    /// * `penalty` - Optional penalty of the run
    /// * `label` - Name of the side for error messages
    fn new(
        spec: SideSpec<'a>,
        n_obj: usize,
        weight_sums: &[f64],
        penalty: Option<&Penalty>,
        label: &str,
    ) -> MduResult<Self> {
        match spec {
            SideSpec::Free { conf, fixed } => {
                ensure_dims!(conf, n_obj, conf.ncols(), format!("{label} configuration"));
                if let Some(mask) = &fixed {
                    ensure_dims!(mask, conf.nrows(), conf.ncols(), format!("{label} mask"));
                }
                Ok(SideState::Free { conf, fixed })
            }
            SideSpec::Restricted { q, loadings } => {
                let h = q.ncols();
                ensure_dims!(q, n_obj, h, format!("{label} basis"));
                ensure_dims!(loadings, h, loadings.ncols(), format!("{label} loadings"));

                let mut info = Mat::from_fn(h, h, |a, b| {
                    (0..n_obj)
                        .map(|i| q[(i, a)] * weight_sums[i] * q[(i, b)])
                        .sum::<f64>()
                });

                let system = match penalty {
                    Some(penalty) => {
                        ensure_param!(
                            (penalty.lasso == 0.0 && penalty.group == 0.0)
                                || mat_max_abs(loadings.as_ref()) > 0.0,
                            "{} loadings must not start at zero under a lasso or group penalty",
                            label
                        );
                        for a in 0..h {
                            info[(a, a)] += penalty.ridge;
                        }
                        info
                    }
                    None => spd_inverse(info.as_ref(), &format!("{label} information matrix"))?,
                };

                let conf = q * loadings.as_ref();

                Ok(SideState::Restricted {
                    q,
                    loadings,
                    conf,
                    system,
                })
            }
        }
    }

    fn conf(&self) -> MatRef<'_, f64> {
        match self {
            SideState::Free { conf, .. } => conf.as_ref(),
            SideState::Restricted { conf, .. } => conf.as_ref(),
        }
    }

    fn is_restricted(&self) -> bool {
        matches!(self, SideState::Restricted { .. })
    }

    fn has_fixed(&self) -> bool {
        match self {
            SideState::Free { fixed, .. } => fixed.as_ref().is_some_and(|m| m.any()),
            SideState::Restricted { .. } => false,
        }
    }

    fn penalty_value(&self, penalty: Option<&Penalty>) -> f64 {
        match (self, penalty) {
            (SideState::Restricted { loadings, .. }, Some(penalty)) => {
                penalty.value(loadings.as_ref())
            }
            _ => 0.0,
        }
    }

    /// Apply the majorization update of this side
    ///
    /// ### Params
    ///
    /// * `target` - `tilde + W * other`, of size k x p
    /// * `weight_sums` - Weight sums per object of this side
    /// * `penalty` - Optional penalty of the run
    fn update(
        &mut self,
        target: MatRef<f64>,
        weight_sums: &[f64],
        penalty: Option<&Penalty>,
    ) -> MduResult<()> {
        match self {
            SideState::Free { conf, fixed } => {
                let (n_obj, p) = conf.shape();
                for i in 0..n_obj {
                    let wi = weight_sums[i];
                    if wi < TINY {
                        continue;
                    }
                    for k in 0..p {
                        if !is_fixed(fixed.as_ref(), i, k) {
                            conf[(i, k)] = target[(i, k)] / wi;
                        }
                    }
                }
            }
            SideState::Restricted {
                q,
                loadings,
                conf,
                system,
            } => {
                let rhs = q.transpose() * target;
                *loadings = match penalty {
                    Some(penalty) => {
                        penalty.update_loadings(system.as_ref(), rhs.as_ref(), loadings.as_ref())?
                    }
                    None => system.as_ref() * rhs.as_ref(),
                };
                *conf = *q * loadings.as_ref();
            }
        }
        Ok(())
    }

    /// Collect the matrices that take part in the final rotation
    fn rotatable<'s>(&'s mut self, mats: &mut Vec<&'s mut Mat<f64>>) {
        match self {
            SideState::Free { conf, .. } => mats.push(conf),
            SideState::Restricted { conf, loadings, .. } => {
                mats.push(conf);
                mats.push(loadings);
            }
        }
    }

    /// Split into the configuration and the optional loadings
    fn into_parts(self) -> (Mat<f64>, Option<Mat<f64>>) {
        match self {
            SideState::Free { conf, .. } => (conf, None),
            SideState::Restricted { conf, loadings, .. } => (conf, Some(loadings)),
        }
    }
}

////////////
// Engine //
////////////

/// Batch majorization engine
///
/// ### Fields
///
/// * `params` - Iteration parameters
/// * `penalty` - Optional penalty on the restricted loadings. With a penalty
///   the stress is not normalised and no rotation is applied.
#[derive(Clone, Debug, Default)]
pub struct Mdu {
    pub params: MduParams,
    pub penalty: Option<Penalty>,
}

impl Mdu {
    /// Generate a new engine without penalty
    pub fn new(params: MduParams) -> Self {
        Self {
            params,
            penalty: None,
        }
    }

    /// Add a penalty on the restricted loadings
    pub fn with_penalty(mut self, penalty: Penalty) -> Self {
        self.penalty = Some(penalty);
        self
    }

    /// Fit the configurations to the dissimilarities
    ///
    /// Per iteration the Guttman weights and both preliminary updates are
    /// computed at the current configuration. The row side is updated first,
    /// the column side second against the new rows. The run stops on
    /// divergence (stress increase of at least `CRIT`), on a relative
    /// improvement of at most `f_crit`, or at `max_iter`. Without fixed
    /// coordinates and without penalty the result is rotated to principal
    /// axes of the row configuration.
    ///
    /// ### Params
    ///
    /// * `delta` - Dissimilarities of size n x m
    /// * `weights` - Optional weights of size n x m (all ones if absent)
    /// * `rows` - Specification of the row side
    /// * `cols` - Specification of the column side
    ///
    /// ### Returns
    ///
    /// The `MduFit` with the final configurations and convergence state.
    pub fn fit(
        &self,
        delta: MatRef<f64>,
        weights: Option<MatRef<f64>>,
        rows: SideSpec<'_>,
        cols: SideSpec<'_>,
    ) -> MduResult<MduFit> {
        self.params.validate()?;
        validate_delta(delta)?;
        let penalty = self.penalty.as_ref();
        if let Some(penalty) = penalty {
            penalty.validate()?;
        }

        let (n, m) = delta.shape();
        let w = resolve_weights(weights, n, m)?;
        let wr = row_sums(w.as_ref());
        let wc = col_sums(w.as_ref());

        let mut rows = SideState::new(rows, n, &wr, penalty, "row")?;
        let mut cols = SideState::new(cols, m, &wc, penalty, "column")?;

        let p = rows.conf().ncols();
        ensure_dims!(cols.conf(), m, p, "column configuration");
        ensure_param!(
            penalty.is_none() || rows.is_restricted() || cols.is_restricted(),
            "a penalty needs at least one restricted side"
        );

        let scale = match penalty {
            Some(_) => 1.0,
            None => stress_scale(delta, w.as_ref()),
        };
        ensure_param!(
            scale > 0.0,
            "weighted sum of squared dissimilarities must be positive"
        );

        let objective = |d: MatRef<f64>, penalty_value: f64| {
            raw_stress(delta, w.as_ref(), d) / scale + penalty_value
        };

        let mut d = euclidean_between(rows.conf(), cols.conf());
        let mut f_old = objective(
            d.as_ref(),
            rows.penalty_value(penalty) + cols.penalty_value(penalty),
        );
        let mut f_new = f_old;
        let mut history = vec![f_old];
        let mut last_iter = 0;
        let mut last_dif = 0.0;

        if self.params.echo {
            echo_progress(0, f_old, f_old, f_old);
        }

        for iter in 1..=self.params.max_iter {
            let bmat = guttman_weights(delta, w.as_ref(), d.as_ref());
            let rsb = row_sums(bmat.as_ref());
            let csb = col_sums(bmat.as_ref());

            // both preliminary updates at the anchor configuration
            let (row_target, col_tilde) = {
                let x = rows.conf();
                let y = cols.conf();
                let bx = bmat.as_ref() * y;
                let by = bmat.transpose() * x;
                let wy = w.as_ref() * y;
                let row_target =
                    Mat::from_fn(n, p, |i, k| rsb[i] * x[(i, k)] - bx[(i, k)] + wy[(i, k)]);
                let col_tilde = Mat::from_fn(m, p, |j, k| csb[j] * y[(j, k)] - by[(j, k)]);
                (row_target, col_tilde)
            };

            rows.update(row_target.as_ref(), &wr, penalty)?;

            let wx = w.transpose() * rows.conf();
            let col_target = Mat::from_fn(m, p, |j, k| col_tilde[(j, k)] + wx[(j, k)]);
            cols.update(col_target.as_ref(), &wc, penalty)?;

            update_distances(rows.conf(), cols.conf(), &mut d);
            f_new = objective(
                d.as_ref(),
                rows.penalty_value(penalty) + cols.penalty_value(penalty),
            );
            history.push(f_new);

            if self.params.echo {
                echo_progress(iter, f_old, f_old, f_new);
            }

            last_iter = iter;
            last_dif = f_old - f_new;

            if last_dif <= -CRIT {
                log::debug!(
                    "stress increased from {:.6e} to {:.6e} at iteration {}, stopping",
                    f_old,
                    f_new,
                    iter
                );
                break;
            }
            let sum = f_old + f_new;
            if sum <= 0.0 || 2.0 * last_dif / sum <= self.params.f_crit {
                break;
            }
            f_old = f_new;
        }

        if last_iter > 0 && penalty.is_none() && !rows.has_fixed() && !cols.has_fixed() {
            let mut mats = Vec::with_capacity(4);
            rows.rotatable(&mut mats);
            cols.rotatable(&mut mats);
            rotate_jointly(&mut mats)?;
        }

        let (x, row_loadings) = rows.into_parts();
        let (y, col_loadings) = cols.into_parts();

        Ok(MduFit {
            x,
            y,
            row_loadings,
            col_loadings,
            distances: d,
            f_value: f_new,
            last_iter,
            last_dif,
            history,
        })
    }
}

//////////////////
// Entry points //
//////////////////

/// Unweighted unfolding with optional fixed coordinates
///
/// ### Params
///
/// * `delta` - Dissimilarities of size n x m
/// * `x` - Start row configuration of size n x p
/// * `fixed_x` - Optional mask of fixed row coordinates
/// * `y` - Start column configuration of size m x p
/// * `fixed_y` - Optional mask of fixed column coordinates
/// * `params` - Iteration parameters
pub fn mdu(
    delta: MatRef<f64>,
    x: Mat<f64>,
    fixed_x: Option<FixedMask>,
    y: Mat<f64>,
    fixed_y: Option<FixedMask>,
    params: &MduParams,
) -> MduResult<MduFit> {
    Mdu::new(params.clone()).fit(
        delta,
        None,
        SideSpec::anchored(x, fixed_x),
        SideSpec::anchored(y, fixed_y),
    )
}

/// Weighted unfolding with optional fixed coordinates
pub fn weighted_mdu(
    delta: MatRef<f64>,
    weights: MatRef<f64>,
    x: Mat<f64>,
    fixed_x: Option<FixedMask>,
    y: Mat<f64>,
    fixed_y: Option<FixedMask>,
    params: &MduParams,
) -> MduResult<MduFit> {
    Mdu::new(params.clone()).fit(
        delta,
        Some(weights),
        SideSpec::anchored(x, fixed_x),
        SideSpec::anchored(y, fixed_y),
    )
}

/// Unfolding with the rows restricted to `q * b`
///
/// ### Params
///
/// * `delta` - Dissimilarities of size n x m
/// * `weights` - Optional weights of size n x m
/// * `q` - Row basis of size n x h
/// * `b` - Start loadings of size h x p
/// * `y` - Start column configuration of size m x p
/// * `fixed_y` - Optional mask of fixed column coordinates
/// * `params` - Iteration parameters
pub fn row_restricted_mdu(
    delta: MatRef<f64>,
    weights: Option<MatRef<f64>>,
    q: MatRef<f64>,
    b: Mat<f64>,
    y: Mat<f64>,
    fixed_y: Option<FixedMask>,
    params: &MduParams,
) -> MduResult<MduFit> {
    Mdu::new(params.clone()).fit(
        delta,
        weights,
        SideSpec::restricted(q, b),
        SideSpec::anchored(y, fixed_y),
    )
}

/// Unfolding with the columns restricted to `q * b`
pub fn column_restricted_mdu(
    delta: MatRef<f64>,
    weights: Option<MatRef<f64>>,
    x: Mat<f64>,
    fixed_x: Option<FixedMask>,
    q: MatRef<f64>,
    b: Mat<f64>,
    params: &MduParams,
) -> MduResult<MduFit> {
    Mdu::new(params.clone()).fit(
        delta,
        weights,
        SideSpec::anchored(x, fixed_x),
        SideSpec::restricted(q, b),
    )
}

/// Unfolding with both sides restricted
pub fn restricted_mdu(
    delta: MatRef<f64>,
    weights: Option<MatRef<f64>>,
    qx: MatRef<f64>,
    bx: Mat<f64>,
    qy: MatRef<f64>,
    by: Mat<f64>,
    params: &MduParams,
) -> MduResult<MduFit> {
    Mdu::new(params.clone()).fit(
        delta,
        weights,
        SideSpec::restricted(qx, bx),
        SideSpec::restricted(qy, by),
    )
}

/// Row restricted unfolding with ridge, lasso and group lasso penalties
///
/// The objective is the raw (unnormalised) weighted stress plus the penalty.
/// With a lasso or group penalty the start loadings must not be all zero.
#[allow(clippy::too_many_arguments)]
pub fn penalized_row_restricted_mdu(
    delta: MatRef<f64>,
    weights: Option<MatRef<f64>>,
    q: MatRef<f64>,
    b: Mat<f64>,
    y: Mat<f64>,
    fixed_y: Option<FixedMask>,
    penalty: Penalty,
    params: &MduParams,
) -> MduResult<MduFit> {
    Mdu::new(params.clone()).with_penalty(penalty).fit(
        delta,
        weights,
        SideSpec::restricted(q, b),
        SideSpec::anchored(y, fixed_y),
    )
}

/// Column restricted unfolding with ridge, lasso and group lasso penalties
///
/// Same objective and start requirement as `penalized_row_restricted_mdu`.
#[allow(clippy::too_many_arguments)]
pub fn penalized_column_restricted_mdu(
    delta: MatRef<f64>,
    weights: Option<MatRef<f64>>,
    x: Mat<f64>,
    fixed_x: Option<FixedMask>,
    q: MatRef<f64>,
    b: Mat<f64>,
    penalty: Penalty,
    params: &MduParams,
) -> MduResult<MduFit> {
    Mdu::new(params.clone()).with_penalty(penalty).fit(
        delta,
        weights,
        SideSpec::anchored(x, fixed_x),
        SideSpec::restricted(q, b),
    )
}

///////////
// Tests //
///////////
