use crate::{check_finite, check_lengths, IndicatorError};

/// Element-wise `values - reference`.
pub fn mag_diff(values: &[f64], reference: &[f64]) -> Result<Vec<f64>, IndicatorError> {
    check_lengths(values, reference)?;
    check_finite(values)?;
    Ok(values.iter().zip(reference).map(|(v, r)| v - r).collect())
}

/// Element-wise percent distance of `values` from `reference`.
pub fn percent_diff(values: &[f64], reference: &[f64]) -> Result<Vec<f64>, IndicatorError> {
    check_lengths(values, reference)?;
    check_finite(values)?;
    Ok(values
        .iter()
        .zip(reference)
        .map(|(v, r)| (v - r) / r * 100.0)
        .collect())
}

/// Percent change from the previous value. The first output is NaN.
pub fn percent_change(values: &[f64]) -> Result<Vec<f64>, IndicatorError> {
    check_finite(values)?;
    let mut out = vec![f64::NAN; values.len()];
    for i in 1..values.len() {
        out[i] = (values[i] - values[i - 1]) / values[i - 1] * 100.0;
    }
    Ok(out)
}
