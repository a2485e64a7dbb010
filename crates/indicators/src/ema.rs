use crate::{check_finite, check_lengths, check_period, IndicatorError};

/// Exponentially weighted moving average.
///
/// Seeded with the simple average of the first `period` consecutive finite
/// values, then `ema = (value - prev) * k + prev` with `k = 2 / (period + 1)`.
/// Leading NaNs are skipped, so the first output lands `period - 1` positions
/// after the first finite input. After seeding, a NaN input yields NaN and
/// leaves the running average untouched.
pub fn exp_weighted_moving_average(
    period: usize,
    values: &[f64],
) -> Result<Vec<f64>, IndicatorError> {
    resume_exp_weighted_moving_average(period, values, &[])
}

/// [`exp_weighted_moving_average`] continued from known averages.
///
/// `prior` is empty or aligned with `values`. A finite `prior[i]` is taken as
/// the average at `i`: it is copied to the output and becomes the running
/// state. NaN entries are computed. Resuming from the average stored for the
/// previous row gives the same value as computing from the start of the series.
pub fn resume_exp_weighted_moving_average(
    period: usize,
    values: &[f64],
    prior: &[f64],
) -> Result<Vec<f64>, IndicatorError> {
    check_period(period, 1)?;
    if !prior.is_empty() {
        check_lengths(values, prior)?;
    }
    check_finite(values)?;

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut out = vec![f64::NAN; values.len()];
    let mut current: Option<f64> = None;
    let mut seed_sum = 0.0;
    let mut seed_count = 0usize;

    for (i, &value) in values.iter().enumerate() {
        if let Some(&known) = prior.get(i).filter(|p| p.is_finite()) {
            current = Some(known);
            out[i] = known;
            continue;
        }
        match current {
            None => {
                if value.is_nan() {
                    // Seed must be built from consecutive values
                    seed_sum = 0.0;
                    seed_count = 0;
                    continue;
                }
                seed_sum += value;
                seed_count += 1;
                if seed_count == period {
                    let seed = seed_sum / period as f64;
                    current = Some(seed);
                    out[i] = seed;
                }
            }
            Some(prev) => {
                if value.is_nan() {
                    continue;
                }
                let ema = (value - prev) * multiplier + prev;
                current = Some(ema);
                out[i] = ema;
            }
        }
    }

    Ok(out)
}
