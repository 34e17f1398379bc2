//! Module containing the dense linear algebra kernels (checked inversion,
//! principal axes rotation) and the non-negative least squares solvers.

pub mod linear_algebra;
pub mod nnls;
