//! Error type, validation macros and small matrix helpers.

pub mod errors;
pub mod general;
pub mod macros;
