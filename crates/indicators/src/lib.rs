//! Pure indicator functions.
//!
//! Every function takes whole input slices and returns an output of the same
//! length. Positions that cannot be computed (not enough history, or a NaN
//! inside the lookback) are `f64::NAN`.

pub mod diff;
pub mod ema;
pub mod macd;
pub mod momentum;
pub mod sma;
pub mod variance;

pub use diff::{mag_diff, percent_change, percent_diff};
pub use ema::{exp_weighted_moving_average, resume_exp_weighted_moving_average};
pub use macd::{macd_histogram, macd_line, macd_signal};
pub use momentum::{momentum, rate_of_change};
pub use sma::moving_average;
pub use variance::{moving_stdev, moving_var};

/// Errors raised by indicator functions on malformed input.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IndicatorError {
    #[error("Period must be at least {min}, got {period}")]
    InvalidPeriod { period: usize, min: usize },
    #[error("Input series lengths differ: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },
    #[error("Input contains no finite values")]
    NoFiniteValues,
}

pub(crate) fn check_period(period: usize, min: usize) -> Result<(), IndicatorError> {
    if period < min {
        return Err(IndicatorError::InvalidPeriod { period, min });
    }
    Ok(())
}

/// An all-NaN (non-empty) slice cannot produce anything.
pub(crate) fn check_finite(values: &[f64]) -> Result<(), IndicatorError> {
    if !values.is_empty() && !values.iter().any(|v| v.is_finite()) {
        return Err(IndicatorError::NoFiniteValues);
    }
    Ok(())
}

pub(crate) fn check_lengths(left: &[f64], right: &[f64]) -> Result<(), IndicatorError> {
    if left.len() != right.len() {
        return Err(IndicatorError::LengthMismatch {
            left: left.len(),
            right: right.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn assert_approx(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}
