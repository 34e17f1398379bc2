use thiserror::Error;

/// Errors that can end an unfolding, NNLS or kernel call
///
/// Divergence and hitting the iteration cap are not errors; they are reported
/// through the iteration count and the last stress difference of the fit.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MduError {
    #[error("Dimension mismatch for {what}: expected {expected:?}, found {found:?}")]
    DimensionMismatch {
        what: String,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Singular system in {0}")]
    SingularSystem(String),

    #[error("Rank deficient least squares problem: {0}")]
    RankDeficient(String),

    #[error("Eigendecomposition failed: {0}")]
    EigenFailure(String),
}

/// Result alias used throughout the crate
pub type MduResult<T> = Result<T, MduError>;
