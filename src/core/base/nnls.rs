//! Non-negative least squares solvers.
//!
//! Four interchangeable algorithms for `min ||A x - b||^2 s.t. x >= 0`,
//! selected via `NnlsType`. All of them accept a warm start and report the
//! number of iterations used and the achieved tolerance.

use faer::{Mat, MatRef};

use crate::core::base::linear_algebra::spd_solve;
use crate::utils::errors::{MduError, MduResult};
use crate::{ensure_len, ensure_param};

/// Number of full exchanges the block principal pivoting method may attempt
/// without reducing the number of infeasible variables before it falls back
/// to single exchanges.
const BACKUP_EXCHANGES: usize = 3;

////////////////////////
// Params and results //
////////////////////////

/// Enum for the NNLS algorithms
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NnlsType {
    /// Lawson-Hanson active set method on `A` itself
    ActiveSet,
    /// Block principal pivoting (alternating passive and active sets)
    Alternating,
    /// Lawson-Hanson on the precomputed cross products (Bro-de Jong)
    Fast,
    /// Cyclic projected coordinate descent
    CoordinateDescent,
}

impl NnlsType {
    /// Select the algorithm by its integer discriminant (1 to 4)
    pub fn from_discriminant(value: i32) -> Option<Self> {
        match value {
            1 => Some(NnlsType::ActiveSet),
            2 => Some(NnlsType::Alternating),
            3 => Some(NnlsType::Fast),
            4 => Some(NnlsType::CoordinateDescent),
            _ => None,
        }
    }
}

/// Helper function to parse the NNLS algorithm
///
/// ### Params
///
/// * `s` - Type of NNLS algorithm to use
///
/// ### Returns
///
/// Option of the NnlsType
pub fn parse_nnls_type(s: &str) -> Option<NnlsType> {
    match s.to_lowercase().as_str() {
        "activeset" | "nnls" => Some(NnlsType::ActiveSet),
        "alternating" | "nnals" => Some(NnlsType::Alternating),
        "fast" | "fastnnls" => Some(NnlsType::Fast),
        "coordinate" | "nnccd" => Some(NnlsType::CoordinateDescent),
        _ => None,
    }
}

/// Structure to store the NNLS parameters
///
/// ### Fields
///
/// * `max_iter` - Maximum number of (outer) iterations
/// * `f_crit` - Convergence tolerance
#[derive(Clone, Debug)]
pub struct NnlsParams {
    pub max_iter: usize,
    pub f_crit: f64,
}

impl Default for NnlsParams {
    fn default() -> Self {
        Self {
            max_iter: 512,
            f_crit: 1e-8,
        }
    }
}

impl NnlsParams {
    /// Check the parameters
    pub fn validate(&self) -> MduResult<()> {
        ensure_param!(
            self.f_crit.is_finite() && self.f_crit > 0.0,
            "f_crit must be finite and positive, found {}",
            self.f_crit
        );
        Ok(())
    }
}

/// Structure to store the NNLS result
///
/// ### Fields
///
/// * `x` - The non-negative solution
/// * `n_iter` - Number of iterations used
/// * `tolerance` - Achieved tolerance (largest KKT violation, or the largest
///   coordinate change for coordinate descent)
/// * `converged` - Did the solver stop before `max_iter`
#[derive(Clone, Debug)]
pub struct NnlsResult {
    pub x: Vec<f64>,
    pub n_iter: usize,
    pub tolerance: f64,
    pub converged: bool,
}

////////////////////
// Normal systems //
////////////////////

/// Access to the least squares problem restricted to a passive set
trait NormalSystem {
    /// Number of variables
    fn n_vars(&self) -> usize;

    /// Negative gradient `A'b - A'A x`
    fn gradient(&self, x: &[f64]) -> Vec<f64>;

    /// Cross products `A_P'A_P` and `A_P'b`
    fn passive(&self, set: &[usize]) -> (Mat<f64>, Mat<f64>);
}

/// The problem in terms of `A` and `b`
struct DirectSystem<'a> {
    a: MatRef<'a, f64>,
    b: &'a [f64],
}

impl NormalSystem for DirectSystem<'_> {
    fn n_vars(&self) -> usize {
        self.a.ncols()
    }

    fn gradient(&self, x: &[f64]) -> Vec<f64> {
        let (n, m) = self.a.shape();
        let resid: Vec<f64> = (0..n)
            .map(|i| self.b[i] - (0..m).map(|j| self.a[(i, j)] * x[j]).sum::<f64>())
            .collect();
        (0..m)
            .map(|j| (0..n).map(|i| self.a[(i, j)] * resid[i]).sum())
            .collect()
    }

    fn passive(&self, set: &[usize]) -> (Mat<f64>, Mat<f64>) {
        let n = self.a.nrows();
        let k = set.len();
        let cross = Mat::from_fn(k, k, |r, c| {
            (0..n)
                .map(|i| self.a[(i, set[r])] * self.a[(i, set[c])])
                .sum::<f64>()
        });
        let rhs = Mat::from_fn(k, 1, |r, _| {
            (0..n).map(|i| self.a[(i, set[r])] * self.b[i]).sum::<f64>()
        });
        (cross, rhs)
    }
}

/// The problem in terms of the precomputed `A'A` and `A'b`
struct GramSystem {
    gram: Mat<f64>,
    atb: Vec<f64>,
}

impl GramSystem {
    fn new(a: MatRef<f64>, b: &[f64]) -> Self {
        let (n, m) = a.shape();
        let gram = a.transpose() * a;
        let atb = (0..m)
            .map(|j| (0..n).map(|i| a[(i, j)] * b[i]).sum())
            .collect();
        Self { gram, atb }
    }
}

impl NormalSystem for GramSystem {
    fn n_vars(&self) -> usize {
        self.atb.len()
    }

    fn gradient(&self, x: &[f64]) -> Vec<f64> {
        let m = self.atb.len();
        (0..m)
            .map(|j| self.atb[j] - (0..m).map(|k| self.gram[(j, k)] * x[k]).sum::<f64>())
            .collect()
    }

    fn passive(&self, set: &[usize]) -> (Mat<f64>, Mat<f64>) {
        let k = set.len();
        let cross = Mat::from_fn(k, k, |r, c| self.gram[(set[r], set[c])]);
        let rhs = Mat::from_fn(k, 1, |r, _| self.atb[set[r]]);
        (cross, rhs)
    }
}

/// Solve the unconstrained problem on a passive set
fn solve_passive(system: &dyn NormalSystem, set: &[usize]) -> MduResult<Vec<f64>> {
    let (cross, rhs) = system.passive(set);
    let z = spd_solve(cross.as_ref(), rhs.as_ref(), "passive set").map_err(|e| match e {
        MduError::SingularSystem(msg) => MduError::RankDeficient(msg),
        other => other,
    })?;
    Ok((0..set.len()).map(|r| z[(r, 0)]).collect())
}

///////////////////
// Lawson-Hanson //
///////////////////

/// Restore optimality on the passive set while keeping `x` feasible
fn lawson_hanson_inner(
    system: &dyn NormalSystem,
    x: &mut [f64],
    passive: &mut Vec<usize>,
) -> MduResult<()> {
    while !passive.is_empty() {
        let z = solve_passive(system, passive)?;
        if z.iter().all(|&v| v > 0.0) {
            for (&j, &v) in passive.iter().zip(&z) {
                x[j] = v;
            }
            return Ok(());
        }

        // step toward z until the first passive variable hits zero
        let mut alpha = f64::INFINITY;
        let mut blocking = passive[0];
        for (&j, &v) in passive.iter().zip(&z) {
            if v <= 0.0 {
                let denom = x[j] - v;
                let ratio = if denom > 0.0 { x[j] / denom } else { 0.0 };
                if ratio < alpha {
                    alpha = ratio;
                    blocking = j;
                }
            }
        }
        for (&j, &v) in passive.iter().zip(&z) {
            x[j] += alpha * (v - x[j]);
        }
        x[blocking] = 0.0;
        passive.retain(|&j| {
            if x[j] <= 0.0 {
                x[j] = 0.0;
                false
            } else {
                true
            }
        });
    }
    Ok(())
}

/// Lawson-Hanson active set method
fn lawson_hanson(
    system: &dyn NormalSystem,
    x0: Vec<f64>,
    params: &NnlsParams,
) -> MduResult<NnlsResult> {
    let m = system.n_vars();
    let mut x = x0;
    let mut passive: Vec<usize> = (0..m).filter(|&j| x[j] > 0.0).collect();
    for v in x.iter_mut() {
        *v = v.max(0.0);
    }
    lawson_hanson_inner(system, &mut x, &mut passive)?;

    let mut n_iter = 0;
    loop {
        let w = system.gradient(&x);
        let candidate = (0..m)
            .filter(|j| !passive.contains(j))
            .max_by(|&a, &b| w[a].total_cmp(&w[b]));
        let violation = candidate.map_or(0.0, |j| w[j].max(0.0));

        if candidate.is_none() || violation <= params.f_crit {
            return Ok(NnlsResult {
                x,
                n_iter,
                tolerance: violation,
                converged: true,
            });
        }
        if n_iter >= params.max_iter {
            return Ok(NnlsResult {
                x,
                n_iter,
                tolerance: violation,
                converged: false,
            });
        }
        n_iter += 1;

        if let Some(t) = candidate {
            passive.push(t);
        }
        lawson_hanson_inner(system, &mut x, &mut passive)?;
    }
}

//////////////////////////////
// Block principal pivoting //
//////////////////////////////

/// Block principal pivoting (Kim and Park)
///
/// The passive set F and active set G are exchanged in blocks. When the
/// number of infeasible variables fails to drop for `BACKUP_EXCHANGES`
/// rounds, only the infeasible variable with the largest index is exchanged.
fn block_pivoting(
    system: &GramSystem,
    x0: &[f64],
    params: &NnlsParams,
) -> MduResult<NnlsResult> {
    let m = system.n_vars();
    let mut in_passive: Vec<bool> = x0.iter().map(|&v| v > 0.0).collect();
    let mut best_infeasible = m + 1;
    let mut backups = BACKUP_EXCHANGES;
    let mut n_iter = 0;

    loop {
        let set: Vec<usize> = (0..m).filter(|&j| in_passive[j]).collect();
        let mut x = vec![0.0; m];
        if !set.is_empty() {
            let z = solve_passive(system, &set)?;
            for (&j, &v) in set.iter().zip(&z) {
                x[j] = v;
            }
        }
        let w = system.gradient(&x);

        let infeasible: Vec<usize> = (0..m)
            .filter(|&j| {
                if in_passive[j] {
                    x[j] < -params.f_crit
                } else {
                    w[j] > params.f_crit
                }
            })
            .collect();
        let violation = (0..m)
            .map(|j| if in_passive[j] { (-x[j]).max(0.0) } else { w[j].max(0.0) })
            .fold(0.0, f64::max);

        let converged = infeasible.is_empty();
        if converged || n_iter >= params.max_iter {
            for v in x.iter_mut() {
                *v = v.max(0.0);
            }
            return Ok(NnlsResult {
                x,
                n_iter,
                tolerance: violation,
                converged,
            });
        }
        n_iter += 1;

        if infeasible.len() < best_infeasible {
            best_infeasible = infeasible.len();
            backups = BACKUP_EXCHANGES;
            for &j in &infeasible {
                in_passive[j] = !in_passive[j];
            }
        } else if backups >= 1 {
            backups -= 1;
            for &j in &infeasible {
                in_passive[j] = !in_passive[j];
            }
        } else if let Some(&j) = infeasible.last() {
            in_passive[j] = !in_passive[j];
        }
    }
}

////////////////////////
// Coordinate descent //
////////////////////////

/// Cyclic projected coordinate descent on the cross products
fn coordinate_descent(
    system: &GramSystem,
    x0: &[f64],
    params: &NnlsParams,
) -> MduResult<NnlsResult> {
    let m = system.n_vars();
    for j in 0..m {
        if system.gram[(j, j)] <= 0.0 {
            return Err(MduError::RankDeficient(format!(
                "column {} of the design matrix is zero",
                j + 1
            )));
        }
    }

    let mut x: Vec<f64> = x0.iter().map(|&v| v.max(0.0)).collect();
    let mut n_iter = 0;
    let mut max_change = f64::INFINITY;

    while n_iter < params.max_iter {
        n_iter += 1;
        max_change = 0.0;
        for j in 0..m {
            let grad = system.atb[j] - (0..m).map(|k| system.gram[(j, k)] * x[k]).sum::<f64>();
            let updated = (x[j] + grad / system.gram[(j, j)]).max(0.0);
            max_change = max_change.max((updated - x[j]).abs());
            x[j] = updated;
        }
        if max_change < params.f_crit {
            return Ok(NnlsResult {
                x,
                n_iter,
                tolerance: max_change,
                converged: true,
            });
        }
    }

    Ok(NnlsResult {
        x,
        n_iter,
        tolerance: max_change,
        converged: false,
    })
}

/////////////////
// Entry point //
/////////////////

/// Solve a non-negative least squares problem
///
/// ### Params
///
/// * `a` - Design matrix of size n x m
/// * `b` - Response of length n
/// * `x0` - Optional warm start of length m (zeros if absent)
/// * `nnls_type` - The algorithm to use
/// * `params` - Iteration cap and tolerance
///
/// ### Returns
///
/// The `NnlsResult`, or `MduError::RankDeficient` when a passive set system
/// is singular. No solution is returned in that case.
pub fn solve_nnls(
    a: MatRef<f64>,
    b: &[f64],
    x0: Option<&[f64]>,
    nnls_type: NnlsType,
    params: &NnlsParams,
) -> MduResult<NnlsResult> {
    params.validate()?;
    let (n, m) = a.shape();
    ensure_len!(b, n, "response");
    let start = match x0 {
        Some(x0) => {
            ensure_len!(x0, m, "warm start");
            x0.to_vec()
        }
        None => vec![0.0; m],
    };

    match nnls_type {
        NnlsType::ActiveSet => lawson_hanson(&DirectSystem { a, b }, start, params),
        NnlsType::Fast => lawson_hanson(&GramSystem::new(a, b), start, params),
        NnlsType::Alternating => block_pivoting(&GramSystem::new(a, b), &start, params),
        NnlsType::CoordinateDescent => {
            coordinate_descent(&GramSystem::new(a, b), &start, params)
        }
    }
}

///////////
// Tests //
///////////
