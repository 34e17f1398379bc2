//! Numeric kernels and the unfolding engines.

pub mod base;
pub mod unfolding;
