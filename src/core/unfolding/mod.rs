//! Module containing the two-mode unfolding engines: batch majorization
//! (unrestricted, weighted, restricted and penalised), external unfolding and
//! the stochastic "ultrafast" variants, together with their shared data and
//! stress model.

pub mod data;
pub mod external;
pub mod majorization;
pub mod params;
pub mod penalty;
pub mod stress;
pub mod ultrafast;
