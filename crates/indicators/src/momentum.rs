use crate::{check_finite, check_period, IndicatorError};

/// Change across a window of `period` values: `x[i] - x[i - period + 1]`.
pub fn momentum(period: usize, values: &[f64]) -> Result<Vec<f64>, IndicatorError> {
    check_period(period, 2)?;
    check_finite(values)?;

    let lag = period - 1;
    let mut out = vec![f64::NAN; values.len()];
    for i in lag..values.len() {
        out[i] = values[i] - values[i - lag];
    }
    Ok(out)
}

/// Percent change across a window of `period` values.
///
/// A zero base value yields a non-finite output.
pub fn rate_of_change(period: usize, values: &[f64]) -> Result<Vec<f64>, IndicatorError> {
    check_period(period, 2)?;
    check_finite(values)?;

    let lag = period - 1;
    let mut out = vec![f64::NAN; values.len()];
    for i in lag..values.len() {
        let base = values[i - lag];
        out[i] = (values[i] - base) / base * 100.0;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_approx;

    #[test]
    fn test_momentum() {
        let out = momentum(3, &[10.0, 12.0, 15.0, 11.0]).unwrap();
        assert!(out[1].is_nan());
        assert_approx(out[2], 5.0);
        assert_approx(out[3], -1.0);
    }

    #[test]
    fn test_rate_of_change() {
        let out = rate_of_change(2, &[50.0, 55.0, 44.0]).unwrap();
        assert!(out[0].is_nan());
        assert_approx(out[1], 10.0);
        assert_approx(out[2], -20.0);
    }

    #[test]
    fn test_rate_of_change_zero_base() {
        let out = rate_of_change(2, &[0.0, 1.0]).unwrap();
        assert!(!out[1].is_finite());
    }
}
