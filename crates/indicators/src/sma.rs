use crate::{check_finite, check_period, IndicatorError};

/// Simple moving average over a trailing window of `period` values.
///
/// The first `period - 1` outputs are NaN. A NaN anywhere in a window makes
/// that output NaN.
pub fn moving_average(period: usize, values: &[f64]) -> Result<Vec<f64>, IndicatorError> {
    check_period(period, 1)?;
    check_finite(values)?;

    let mut out = vec![f64::NAN; values.len()];
    let mut sum = 0.0;
    let mut nan_count = 0usize;

    for (i, &value) in values.iter().enumerate() {
        if value.is_nan() {
            nan_count += 1;
        } else {
            sum += value;
        }

        if i >= period {
            let leaving = values[i - period];
            if leaving.is_nan() {
                nan_count -= 1;
            } else {
                sum -= leaving;
            }
        }

        if i + 1 >= period && nan_count == 0 {
            out[i] = sum / period as f64;
        }
    }

    Ok(out)
}
