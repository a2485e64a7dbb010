use crate::ema::resume_exp_weighted_moving_average;
use crate::{check_finite, check_lengths, IndicatorError};

/// MACD line: fast EMA minus slow EMA.
///
/// The EMAs are inputs rather than recomputed here, so a caller that already
/// stores them (e.g. 12 and 26 period) reuses them.
pub fn macd_line(fast: &[f64], slow: &[f64]) -> Result<Vec<f64>, IndicatorError> {
    check_lengths(fast, slow)?;
    check_finite(fast)?;
    Ok(fast.iter().zip(slow).map(|(f, s)| f - s).collect())
}

/// Signal line: EMA of the MACD line over `period` values (9 by convention).
///
/// `prior` holds already known signal values, as for
/// [`resume_exp_weighted_moving_average`]; pass `&[]` to compute from scratch.
pub fn macd_signal(period: usize, macd: &[f64], prior: &[f64]) -> Result<Vec<f64>, IndicatorError> {
    resume_exp_weighted_moving_average(period, macd, prior)
}

/// Histogram: MACD line minus signal line.
pub fn macd_histogram(macd: &[f64], signal: &[f64]) -> Result<Vec<f64>, IndicatorError> {
    check_lengths(macd, signal)?;
    check_finite(signal)?;
    Ok(macd.iter().zip(signal).map(|(m, s)| m - s).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_approx;

    #[test]
    fn test_macd_components() {
        let fast = [f64::NAN, 11.0, 12.0, 14.0];
        let slow = [f64::NAN, 10.0, 10.0, 11.0];
        let line = macd_line(&fast, &slow).unwrap();
        assert!(line[0].is_nan());
        assert_approx(line[3], 3.0);

        let signal = macd_signal(2, &line, &[]).unwrap();
        // Seed over line[1..3] = (1 + 2) / 2
        assert!(signal[1].is_nan());
        assert_approx(signal[2], 1.5);

        let hist = macd_histogram(&line, &signal).unwrap();
        assert_approx(hist[2], 0.5);
    }
}
