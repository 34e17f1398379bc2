use crate::core::unfolding::data::MAX_RATE;
use crate::ensure_param;
use crate::utils::errors::MduResult;

////////////////
// Parameters //
////////////////

/// Structure to store the majorization parameters
///
/// ### Fields
///
/// * `max_iter` - Maximum number of iterations.
/// * `f_crit` - Relative stress improvement below which the run stops.
/// * `echo` - Shall the stress of every iteration be logged.
#[derive(Clone, Debug)]
pub struct MduParams {
    pub max_iter: usize,
    pub f_crit: f64,
    pub echo: bool,
}

impl Default for MduParams {
    fn default() -> Self {
        Self {
            max_iter: 1024,
            f_crit: 1e-6,
            echo: false,
        }
    }
}

impl MduParams {
    /// Check the parameters
    ///
    /// ### Returns
    ///
    /// `Ok(())` or an `InvalidParameter` error.
    pub fn validate(&self) -> MduResult<()> {
        ensure_param!(
            self.f_crit.is_finite() && self.f_crit >= 0.0,
            "f_crit must be finite and non-negative, found {}",
            self.f_crit
        );
        Ok(())
    }
}

/// Structure to store the stochastic engine parameters
///
/// ### Fields
///
/// * `n_steps` - Number of outer steps; each step performs `n + m` updates.
/// * `min_rate` - Mixing rate reached after the last step.
/// * `seed` - Seed of the generator owned by the call.
#[derive(Clone, Debug)]
pub struct UltrafastParams {
    pub n_steps: usize,
    pub min_rate: f64,
    pub seed: u64,
}

impl Default for UltrafastParams {
    fn default() -> Self {
        Self {
            n_steps: 1024,
            min_rate: 0.01,
            seed: 1,
        }
    }
}

impl UltrafastParams {
    /// Check the parameters
    pub fn validate(&self) -> MduResult<()> {
        ensure_param!(
            self.min_rate > 0.0 && self.min_rate <= MAX_RATE,
            "min_rate must lie in (0, {}], found {}",
            MAX_RATE,
            self.min_rate
        );
        Ok(())
    }

    /// Geometric decay factor of the mixing rate
    ///
    /// After `n_steps` multiplications the rate moves from `MAX_RATE` to
    /// `min_rate`.
    pub fn decay(&self) -> f64 {
        if self.n_steps == 0 {
            return 1.0;
        }
        (self.min_rate / MAX_RATE).powf(1.0 / self.n_steps as f64)
    }
}

//////////
// Echo //
//////////

/// Format the progress line of one iteration
///
/// ### Params
///
/// * `iter` - Iteration number
/// * `f_old` - Stress before the update
/// * `f_mid` - Intermediate stress
/// * `f_new` - Stress after the update
pub fn progress_line(iter: usize, f_old: f64, f_mid: f64, f_new: f64) -> String {
    format!(
        "iter: {:5}  fold: {:.12}  fmid: {:.12}  fnew: {:.12}",
        iter, f_old, f_mid, f_new
    )
}

/// Report the progress of one iteration
///
/// Iteration 0 reports the stress of the starting configuration.
pub fn echo_progress(iter: usize, f_old: f64, f_mid: f64, f_new: f64) {
    log::info!("{}", progress_line(iter, f_old, f_mid, f_new));
}

///////////
// Tests //
///////////

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults_validate() {
        assert!(MduParams::default().validate().is_ok());
        assert!(UltrafastParams::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_params() {
        let params = MduParams {
            f_crit: -1.0,
            ..MduParams::default()
        };
        assert!(params.validate().is_err());

        let params = UltrafastParams {
            min_rate: 0.75,
            ..UltrafastParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_decay_reaches_min_rate() {
        let params = UltrafastParams {
            n_steps: 50,
            min_rate: 0.001,
            seed: 0,
        };
        let rate = (0..params.n_steps).fold(MAX_RATE, |mu, _| mu * params.decay());

        assert_relative_eq!(rate, 0.001, max_relative = 1e-10);
    }

    #[test]
    fn test_progress_line() {
        assert_eq!(
            progress_line(0, 1.5, 1.5, 1.5),
            "iter:     0  fold: 1.500000000000  fmid: 1.500000000000  fnew: 1.500000000000"
        );
        assert!(progress_line(12, 2.0, 2.0, 0.25).starts_with("iter:    12  fold: 2.0"));
    }
}
