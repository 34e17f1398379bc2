//! Two-mode multidimensional unfolding.
//!
//! Fits a row configuration X (n x p) and a column configuration Y (m x p) so
//! that the Euclidean distances between them match an n x m dissimilarity
//! matrix in the weighted least squares (stress) sense.
//!
//! * `core::unfolding::majorization` - batch majorization with optional
//!   weights, fixed coordinates, subspace restrictions and penalties
//! * `core::unfolding::external` - fit rows against a known column set
//! * `core::unfolding::ultrafast` - stochastic pairwise updates
//! * `core::base::nnls` - non-negative least squares solvers
//! * `interface::column_major` - entry points on flat column-major arrays
//!
//! Progress is reported through the `log` facade; no logger is installed.

pub mod core;
pub mod interface;
pub mod utils;

pub use crate::core::base::nnls::{parse_nnls_type, solve_nnls, NnlsParams, NnlsResult, NnlsType};
pub use crate::core::unfolding::data::{random_configuration, FixedMask};
pub use crate::core::unfolding::external::{external_unfolding, ExternalFit};
pub use crate::core::unfolding::majorization::{
    column_restricted_mdu, mdu, penalized_column_restricted_mdu, penalized_row_restricted_mdu,
    restricted_mdu, row_restricted_mdu, weighted_mdu, Mdu, MduFit, SideSpec,
};
pub use crate::core::unfolding::params::{MduParams, UltrafastParams};
pub use crate::core::unfolding::penalty::Penalty;
pub use crate::core::unfolding::ultrafast::{
    ultrafast_mdu, ultrafast_paired_mdu, ultrafast_row_restricted_mdu, UltrafastSummary,
};
pub use crate::utils::errors::{MduError, MduResult};
