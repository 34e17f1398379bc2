//! Flat column-major boundary for callers that hold plain arrays.

pub mod column_major;
