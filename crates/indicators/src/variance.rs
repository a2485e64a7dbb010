use crate::{check_finite, check_period, IndicatorError};

/// Rolling sample variance (n - 1 denominator) over `period` values.
pub fn moving_var(period: usize, values: &[f64]) -> Result<Vec<f64>, IndicatorError> {
    check_period(period, 2)?;
    check_finite(values)?;

    let mut out = vec![f64::NAN; values.len()];
    if values.len() < period {
        return Ok(out);
    }

    for end in period..=values.len() {
        let window = &values[end - period..end];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        let mean = window.iter().sum::<f64>() / period as f64;
        let sum_sq: f64 = window.iter().map(|v| (v - mean) * (v - mean)).sum();
        out[end - 1] = sum_sq / (period - 1) as f64;
    }

    Ok(out)
}

/// Rolling sample standard deviation over `period` values.
pub fn moving_stdev(period: usize, values: &[f64]) -> Result<Vec<f64>, IndicatorError> {
    Ok(moving_var(period, values)?
        .into_iter()
        .map(f64::sqrt)
        .collect())
}
