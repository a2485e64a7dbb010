use chrono::{Duration, TimeZone, Utc};
use quotedb_core::{Bar, Observation, SeriesTable};
use rust_decimal::Decimal;

use crate::registry::IndicatorDef;

/// Trailing simple average with warm-up `period - 1`.
pub fn def_ma(name: &str, period: usize) -> IndicatorDef {
    IndicatorDef::new(name, |len, inputs| {
        Ok(quotedb_indicators::moving_average(len.unwrap_or(1), &inputs[0])?)
    })
    .with_length(period)
    .with_warmup(period - 1)
}

/// Daily bars starting 2024-01-01, flat at each close.
pub fn bars(closes: &[i64]) -> Vec<Bar> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| Bar::from_close(start + Duration::days(i as i64), Decimal::from(c)))
        .collect()
}

/// A table with ids 1..=n and empty indicator rows.
pub fn table_of(closes: &[i64]) -> SeriesTable {
    let observations = bars(closes)
        .into_iter()
        .enumerate()
        .map(|(i, bar)| Observation {
            id: i as i64 + 1,
            bar,
        })
        .collect();
    SeriesTable::from_observations("test", observations).unwrap()
}

/// Like [`table_of`] with some cells of `column` pre-filled.
pub fn table_with(closes: &[i64], column: &str, values: &[(usize, f64)]) -> SeriesTable {
    let mut table = table_of(closes);
    for &(position, value) in values {
        table.set_value(position, column, value);
    }
    table
}

pub fn assert_approx(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}
