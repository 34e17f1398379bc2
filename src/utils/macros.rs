///////////////////
// Matrix macros //
///////////////////

/// Returns a `DimensionMismatch` error early if a matrix does not have the
/// expected shape.
#[macro_export]
macro_rules! ensure_dims {
    ($matrix:expr, $nrows:expr, $ncols:expr, $what:expr) => {
        if ($matrix.nrows(), $matrix.ncols()) != ($nrows, $ncols) {
            return Err($crate::utils::errors::MduError::DimensionMismatch {
                what: $what.to_string(),
                expected: ($nrows, $ncols),
                found: ($matrix.nrows(), $matrix.ncols()),
            });
        }
    };
}

/// Returns a `DimensionMismatch` error early if a slice does not have the
/// expected length. The length is reported as a single column.
#[macro_export]
macro_rules! ensure_len {
    ($slice:expr, $len:expr, $what:expr) => {
        if $slice.len() != $len {
            return Err($crate::utils::errors::MduError::DimensionMismatch {
                what: $what.to_string(),
                expected: ($len, 1),
                found: ($slice.len(), 1),
            });
        }
    };
}

/// Returns an `InvalidParameter` error early if the condition does not hold.
#[macro_export]
macro_rules! ensure_param {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::utils::errors::MduError::InvalidParameter(format!($($arg)+)));
        }
    };
}
